//! CATH (Common Access Token Header) claim: HTTP header requirements.

use crate::error::Error;
use crate::header::CborValue;
use crate::matching::MatchCondition;
use serde_json::Value;
use std::collections::BTreeMap;

/// A header matcher: header name => match condition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommonAccessTokenHeader {
    headers: BTreeMap<String, MatchCondition>,
}

impl CommonAccessTokenHeader {
    /// Creates an empty matcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the condition for a header
    pub fn with_header<S: Into<String>>(mut self, name: S, condition: MatchCondition) -> Self {
        self.headers.insert(name.into(), condition);
        self
    }

    /// Build from the dictionary form: `{"X-Custom": {"exact-match": "v"}}`
    pub fn from_dict(dict: &Value) -> Result<Self, Error> {
        let object = dict
            .as_object()
            .ok_or_else(|| Error::InvalidClaimValue("cath must be an object".to_string()))?;
        let mut cath = Self::new();
        for (name, condition) in object {
            cath.headers
                .insert(name.clone(), MatchCondition::from_json(condition)?);
        }
        Ok(cath)
    }

    /// Build from the wire form (text-keyed map)
    pub fn from_map(map: &CborValue) -> Result<Self, Error> {
        let mut cath = Self::new();
        match map {
            CborValue::TextMap(map) => {
                for (name, condition) in map {
                    cath.headers
                        .insert(name.clone(), MatchCondition::from_cbor(condition)?);
                }
            }
            CborValue::Map(map) if map.is_empty() => {}
            other => {
                return Err(Error::InvalidClaimValue(format!(
                    "cath must be a map keyed by header name, got {}",
                    other.type_name()
                )))
            }
        }
        Ok(cath)
    }

    /// Dictionary form
    pub fn to_dict(&self) -> Result<Value, Error> {
        let mut object = serde_json::Map::new();
        for (name, condition) in &self.headers {
            object.insert(name.clone(), condition.to_json()?);
        }
        Ok(Value::Object(object))
    }

    /// Wire form
    pub fn payload(&self) -> CborValue {
        CborValue::TextMap(
            self.headers
                .iter()
                .map(|(name, condition)| (name.clone(), condition.to_cbor()))
                .collect(),
        )
    }

    /// Evaluate every header condition against request headers.
    /// A missing header or a value that is not valid text does not match.
    pub fn match_headers(&self, headers: &http::HeaderMap) -> Result<bool, Error> {
        for (name, condition) in &self.headers {
            let value = match headers.get(name.as_str()).and_then(|v| v.to_str().ok()) {
                Some(value) => value,
                None => return Ok(false),
            };
            if !condition.evaluate(value)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
