//! CATIF (Common Access Token If) claim: conditional responses.
//!
//! Maps a trigger claim (e.g. `exp`) to `[code, {header: value}, kid?]`.
//! A header value may be `[url-prefix, claims]`, in which case a fresh token
//! minted from `claims` is appended URL-encoded to the prefix.

use crate::claims::Claims;
use crate::constants::{display_claim_name, resolve_claim_label};
use crate::error::Error;
use crate::header::CborValue;
use serde_json::Value;
use std::collections::BTreeMap;

/// A response header produced by a conditional directive
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderDirective {
    /// Literal header value
    Value(String),
    /// URL prefix followed by a freshly minted token
    Token {
        /// Prefix the token is appended to
        url_prefix: String,
        /// Claims of the minted token; `null` values are placeholders
        claims: Claims,
    },
}

/// Response emitted when the trigger claim fires
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalResponse {
    /// HTTP status code
    pub code: u16,
    /// Response headers
    pub headers: BTreeMap<String, HeaderDirective>,
    /// Key used to seal minted tokens
    pub kid: Option<String>,
}

/// A conditional directive: trigger claim label => response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommonAccessTokenIf {
    triggers: BTreeMap<i32, ConditionalResponse>,
}

impl CommonAccessTokenIf {
    /// Creates an empty directive
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a response for a trigger claim label
    pub fn with_trigger(mut self, claim: i32, response: ConditionalResponse) -> Self {
        self.triggers.insert(claim, response);
        self
    }

    /// Responses keyed by trigger claim label
    pub fn triggers(&self) -> impl Iterator<Item = (&i32, &ConditionalResponse)> {
        self.triggers.iter()
    }

    /// Response for one trigger claim
    pub fn response_for(&self, claim: i32) -> Option<&ConditionalResponse> {
        self.triggers.get(&claim)
    }

    /// Build from the dictionary form
    pub fn from_dict(dict: &Value) -> Result<Self, Error> {
        let object = dict
            .as_object()
            .ok_or_else(|| Error::InvalidCatIf("catif must be an object".to_string()))?;
        let mut catif = Self::new();
        for (trigger, value) in object {
            let label = resolve_claim_label(trigger)
                .ok_or_else(|| Error::InvalidCatIf(format!("unknown trigger claim {trigger}")))?;
            catif.triggers.insert(label, response_from_json(value)?);
        }
        Ok(catif)
    }

    /// Build from the wire form
    pub fn from_map(map: &CborValue) -> Result<Self, Error> {
        let map = match map {
            CborValue::Map(map) => map,
            other => {
                return Err(Error::InvalidCatIf(format!(
                    "expected map, got {}",
                    other.type_name()
                )))
            }
        };
        let mut catif = Self::new();
        for (label, value) in map {
            catif.triggers.insert(*label, response_from_cbor(value)?);
        }
        Ok(catif)
    }

    /// Dictionary form
    pub fn to_dict(&self) -> Result<Value, Error> {
        let mut object = serde_json::Map::new();
        for (label, response) in &self.triggers {
            let mut headers = serde_json::Map::new();
            for (name, directive) in &response.headers {
                let value = match directive {
                    HeaderDirective::Value(value) => Value::from(value.as_str()),
                    HeaderDirective::Token { url_prefix, claims } => Value::Array(vec![
                        Value::from(url_prefix.as_str()),
                        Value::Object(claims.to_json()?),
                    ]),
                };
                headers.insert(name.clone(), value);
            }
            let mut entry = vec![Value::from(response.code), Value::Object(headers)];
            if let Some(kid) = &response.kid {
                entry.push(Value::from(kid.as_str()));
            }
            object.insert(display_claim_name(*label), Value::Array(entry));
        }
        Ok(Value::Object(object))
    }

    /// Wire form
    pub fn payload(&self) -> CborValue {
        CborValue::Map(
            self.triggers
                .iter()
                .map(|(label, response)| {
                    let headers = response
                        .headers
                        .iter()
                        .map(|(name, directive)| {
                            let value = match directive {
                                HeaderDirective::Value(value) => CborValue::Text(value.clone()),
                                HeaderDirective::Token { url_prefix, claims } => {
                                    CborValue::Array(vec![
                                        CborValue::Text(url_prefix.clone()),
                                        CborValue::Map(claims.to_map()),
                                    ])
                                }
                            };
                            (name.clone(), value)
                        })
                        .collect();
                    let mut entry = vec![
                        CborValue::Integer(response.code as i64),
                        CborValue::TextMap(headers),
                    ];
                    if let Some(kid) = &response.kid {
                        entry.push(CborValue::Text(kid.clone()));
                    }
                    (*label, CborValue::Array(entry))
                })
                .collect(),
        )
    }
}

fn status_code(code: Option<i64>) -> Result<u16, Error> {
    code.and_then(|code| u16::try_from(code).ok())
        .filter(|code| (100..600).contains(code))
        .ok_or_else(|| Error::InvalidCatIf("response code must be an HTTP status".to_string()))
}

fn response_from_json(value: &Value) -> Result<ConditionalResponse, Error> {
    let entry = value
        .as_array()
        .filter(|entry| entry.len() == 2 || entry.len() == 3)
        .ok_or_else(|| Error::InvalidCatIf("expected [code, headers, kid?]".to_string()))?;
    let code = status_code(entry[0].as_i64())?;
    let header_object = entry[1]
        .as_object()
        .ok_or_else(|| Error::InvalidCatIf("headers must be an object".to_string()))?;

    let mut headers = BTreeMap::new();
    for (name, value) in header_object {
        let directive = match value {
            Value::String(value) => HeaderDirective::Value(value.clone()),
            Value::Array(pair) if pair.len() == 2 => {
                let url_prefix = pair[0].as_str().ok_or_else(|| {
                    Error::InvalidCatIf(format!("{name}: url prefix must be a string"))
                })?;
                let claims = pair[1].as_object().ok_or_else(|| {
                    Error::InvalidCatIf(format!("{name}: embedded claims must be an object"))
                })?;
                HeaderDirective::Token {
                    url_prefix: url_prefix.to_string(),
                    claims: Claims::from_json(claims)?,
                }
            }
            _ => {
                return Err(Error::InvalidCatIf(format!(
                    "{name}: header value must be a string or [prefix, claims]"
                )))
            }
        };
        headers.insert(name.clone(), directive);
    }

    let kid = match entry.get(2) {
        None | Some(Value::Null) => None,
        Some(Value::String(kid)) => Some(kid.clone()),
        Some(_) => return Err(Error::InvalidCatIf("kid must be a string".to_string())),
    };

    Ok(ConditionalResponse { code, headers, kid })
}

fn response_from_cbor(value: &CborValue) -> Result<ConditionalResponse, Error> {
    let entry = match value {
        CborValue::Array(entry) if entry.len() == 2 || entry.len() == 3 => entry,
        _ => return Err(Error::InvalidCatIf("expected [code, headers, kid?]".to_string())),
    };
    let code = status_code(entry[0].as_i64())?;

    let mut headers = BTreeMap::new();
    match &entry[1] {
        CborValue::TextMap(header_map) => {
            for (name, value) in header_map {
                let directive = match value {
                    CborValue::Text(value) => HeaderDirective::Value(value.clone()),
                    CborValue::Array(pair) if pair.len() == 2 => match (&pair[0], &pair[1]) {
                        (CborValue::Text(url_prefix), CborValue::Map(claims)) => {
                            HeaderDirective::Token {
                                url_prefix: url_prefix.clone(),
                                claims: Claims::from_map(claims.clone()),
                            }
                        }
                        _ => {
                            return Err(Error::InvalidCatIf(format!(
                                "{name}: expected [prefix, claims]"
                            )))
                        }
                    },
                    _ => {
                        return Err(Error::InvalidCatIf(format!(
                            "{name}: header value must be a string or [prefix, claims]"
                        )))
                    }
                };
                headers.insert(name.clone(), directive);
            }
        }
        CborValue::Map(empty) if empty.is_empty() => {}
        _ => return Err(Error::InvalidCatIf("headers must be a map".to_string())),
    }

    let kid = match entry.get(2) {
        None | Some(CborValue::Null) => None,
        Some(CborValue::Text(kid)) => Some(kid.clone()),
        Some(_) => return Err(Error::InvalidCatIf("kid must be a string".to_string())),
    };

    Ok(ConditionalResponse { code, headers, kid })
}
