//! # Claims for Common Access Token
//!
//! This module provides the label-keyed claims map and its translation to and
//! from the human-readable dictionary form.
//!
//! At the dictionary boundary claim names are mapped through the label
//! registry and a few claims get value transforms:
//!
//! - **cti** and **cattpk** are byte strings on the wire and hex text in the dictionary.
//! - **catu**, **cath**, **catnip**, **catr** and **catif** go through their sub-claim codecs.
//!
//! `null` values pass through untouched; they act as placeholders in the
//! claims embedded in a CATIF directive.

use crate::cat_claims::{
    CommonAccessTokenHeader, CommonAccessTokenIf, CommonAccessTokenNetworkIp,
    CommonAccessTokenRenewal, CommonAccessTokenUri,
};
use crate::constants::{cat_keys, cwt_keys, display_claim_name, resolve_claim_label};
use crate::error::Error;
use crate::header::CborValue;
use crate::utils::{hex_decode, hex_encode};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Type alias for claims map
pub type ClaimsMap = BTreeMap<i32, CborValue>;

/// The claims of a token, keyed by integer label.
///
/// # Example
///
/// ```
/// use cat_validator::Claims;
///
/// let claims = Claims::new()
///     .with_issuer("eyevinn")
///     .with_expiration(1_900_000_000);
///
/// let dict = claims.to_json().unwrap();
/// assert_eq!(dict["iss"], "eyevinn");
/// assert_eq!(dict["exp"], 1_900_000_000);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Claims {
    map: ClaimsMap,
}

impl Claims {
    /// Creates an empty claims set
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a decoded label-keyed map
    pub fn from_map(map: ClaimsMap) -> Self {
        Self { map }
    }

    /// Label-keyed map (wire form)
    pub fn to_map(&self) -> ClaimsMap {
        self.map.clone()
    }

    /// Borrow the label-keyed map
    pub fn as_map(&self) -> &ClaimsMap {
        &self.map
    }

    /// Build from the dictionary form, translating names and values
    pub fn from_json(dict: &Map<String, Value>) -> Result<Self, Error> {
        let mut map = ClaimsMap::new();
        for (name, value) in dict {
            let label =
                resolve_claim_label(name).ok_or_else(|| Error::UnknownClaim(name.clone()))?;
            map.insert(label, claim_from_json(label, value)?);
        }
        Ok(Self { map })
    }

    /// Parse a JSON document holding the dictionary form
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let value: Value =
            serde_json::from_str(json).map_err(|err| Error::InvalidJson(err.to_string()))?;
        let dict = value
            .as_object()
            .ok_or_else(|| Error::InvalidJson("claims must be a JSON object".to_string()))?;
        Self::from_json(dict)
    }

    /// Dictionary form, inverse of [`Claims::from_json`]
    pub fn to_json(&self) -> Result<Map<String, Value>, Error> {
        let mut dict = Map::new();
        for (label, value) in &self.map {
            dict.insert(display_claim_name(*label), claim_to_json(*label, value)?);
        }
        Ok(dict)
    }

    /// Check every claim against its expected type
    pub fn validate_types(&self) -> Result<(), Error> {
        for (label, value) in &self.map {
            if !type_matches(*label, value) {
                return Err(Error::InvalidClaimType {
                    claim: display_claim_name(*label),
                    actual: value.type_name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Get a claim by label
    pub fn get(&self, label: i32) -> Option<&CborValue> {
        self.map.get(&label)
    }

    /// Get a claim by name
    pub fn get_by_name(&self, name: &str) -> Option<&CborValue> {
        resolve_claim_label(name).and_then(|label| self.map.get(&label))
    }

    /// Whether a claim is present
    pub fn contains(&self, label: i32) -> bool {
        self.map.contains_key(&label)
    }

    /// Set a claim
    pub fn insert(&mut self, label: i32, value: CborValue) -> Option<CborValue> {
        self.map.insert(label, value)
    }

    /// Remove a claim
    pub fn remove(&mut self, label: i32) -> Option<CborValue> {
        self.map.remove(&label)
    }

    /// Iterate claims in label order
    pub fn iter(&self) -> impl Iterator<Item = (&i32, &CborValue)> {
        self.map.iter()
    }

    /// Set an arbitrary claim
    pub fn with_claim(mut self, label: i32, value: CborValue) -> Self {
        self.map.insert(label, value);
        self
    }

    /// Set the issuer
    pub fn with_issuer<S: Into<String>>(self, iss: S) -> Self {
        self.with_claim(cwt_keys::ISS, CborValue::Text(iss.into()))
    }

    /// Set the subject
    pub fn with_subject<S: Into<String>>(self, sub: S) -> Self {
        self.with_claim(cwt_keys::SUB, CborValue::Text(sub.into()))
    }

    /// Set a single audience
    pub fn with_audience<S: Into<String>>(self, aud: S) -> Self {
        self.with_claim(cwt_keys::AUD, CborValue::Text(aud.into()))
    }

    /// Set the expiration time (seconds since Unix epoch)
    pub fn with_expiration(self, exp: i64) -> Self {
        self.with_claim(cwt_keys::EXP, CborValue::Integer(exp))
    }

    /// Set the not-before time (seconds since Unix epoch)
    pub fn with_not_before(self, nbf: i64) -> Self {
        self.with_claim(cwt_keys::NBF, CborValue::Integer(nbf))
    }

    /// Set the issued-at time (seconds since Unix epoch)
    pub fn with_issued_at(self, iat: i64) -> Self {
        self.with_claim(cwt_keys::IAT, CborValue::Integer(iat))
    }

    /// Set the token identifier
    pub fn with_cti<T: Into<Vec<u8>>>(self, cti: T) -> Self {
        self.with_claim(cwt_keys::CTI, CborValue::Bytes(cti.into()))
    }

    /// Set the URI matcher
    pub fn with_catu(self, catu: &CommonAccessTokenUri) -> Self {
        self.with_claim(cat_keys::CATU, catu.payload())
    }

    /// Set the header matcher
    pub fn with_cath(self, cath: &CommonAccessTokenHeader) -> Self {
        self.with_claim(cat_keys::CATH, cath.payload())
    }

    /// Set the network matcher
    pub fn with_catnip(self, catnip: &CommonAccessTokenNetworkIp) -> Self {
        self.with_claim(cat_keys::CATNIP, catnip.payload())
    }

    /// Set the renewal directive
    pub fn with_catr(self, catr: &CommonAccessTokenRenewal) -> Self {
        self.with_claim(cat_keys::CATR, catr.payload())
    }

    /// Set the conditional directive
    pub fn with_catif(self, catif: &CommonAccessTokenIf) -> Self {
        self.with_claim(cat_keys::CATIF, catif.payload())
    }

    /// Issuer
    pub fn issuer(&self) -> Option<&str> {
        self.get(cwt_keys::ISS).and_then(CborValue::as_text)
    }

    /// Subject
    pub fn subject(&self) -> Option<&str> {
        self.get(cwt_keys::SUB).and_then(CborValue::as_text)
    }

    /// Audience as a list (a single string becomes one entry)
    pub fn audience(&self) -> Option<Vec<String>> {
        match self.get(cwt_keys::AUD)? {
            CborValue::Text(aud) => Some(vec![aud.clone()]),
            CborValue::Array(items) => Some(
                items
                    .iter()
                    .filter_map(CborValue::as_text)
                    .map(str::to_string)
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Expiration time
    pub fn expiration(&self) -> Option<i64> {
        self.get(cwt_keys::EXP).and_then(CborValue::as_i64)
    }

    /// Not-before time
    pub fn not_before(&self) -> Option<i64> {
        self.get(cwt_keys::NBF).and_then(CborValue::as_i64)
    }

    /// Issued-at time
    pub fn issued_at(&self) -> Option<i64> {
        self.get(cwt_keys::IAT).and_then(CborValue::as_i64)
    }

    /// Raw token identifier
    pub fn cti(&self) -> Option<&[u8]> {
        self.get(cwt_keys::CTI).and_then(CborValue::as_bytes)
    }

    /// Replay policy
    pub fn catreplay(&self) -> Option<i64> {
        self.get(cat_keys::CATREPLAY).and_then(CborValue::as_i64)
    }

    /// URI matcher, if present
    pub fn catu(&self) -> Option<Result<CommonAccessTokenUri, Error>> {
        self.get(cat_keys::CATU).map(CommonAccessTokenUri::from_map)
    }

    /// Header matcher, if present
    pub fn cath(&self) -> Option<Result<CommonAccessTokenHeader, Error>> {
        self.get(cat_keys::CATH).map(CommonAccessTokenHeader::from_map)
    }

    /// Network matcher, if present
    pub fn catnip(&self) -> Option<Result<CommonAccessTokenNetworkIp, Error>> {
        self.get(cat_keys::CATNIP)
            .map(CommonAccessTokenNetworkIp::from_array)
    }

    /// Renewal directive, if present
    pub fn catr(&self) -> Option<Result<CommonAccessTokenRenewal, Error>> {
        self.get(cat_keys::CATR).map(CommonAccessTokenRenewal::from_map)
    }

    /// Conditional directive, if present
    pub fn catif(&self) -> Option<Result<CommonAccessTokenIf, Error>> {
        self.get(cat_keys::CATIF).map(CommonAccessTokenIf::from_map)
    }
}

fn type_matches(label: i32, value: &CborValue) -> bool {
    match label {
        cwt_keys::ISS | cwt_keys::SUB => matches!(value, CborValue::Text(_)),
        cwt_keys::AUD => matches!(value, CborValue::Text(_) | CborValue::Array(_)),
        cwt_keys::EXP | cwt_keys::NBF | cwt_keys::IAT => value.is_number(),
        cwt_keys::CTI | cat_keys::CATTPK => matches!(value, CborValue::Bytes(_)),
        cat_keys::CATV => value.as_i64().is_some_and(|version| version >= 1),
        cwt_keys::CNF
        | cat_keys::CATU
        | cat_keys::CATH
        | cat_keys::CATIF
        | cat_keys::CATR => value.is_map(),
        cat_keys::CATNIP
        | cat_keys::CATPOR
        | cat_keys::CATM
        | cat_keys::CATGEOISO3166
        | cat_keys::CATGEOCOORD => matches!(value, CborValue::Array(_)),
        _ => true,
    }
}

fn claim_from_json(label: i32, value: &Value) -> Result<CborValue, Error> {
    if value.is_null() {
        return Ok(CborValue::Null);
    }
    match label {
        cwt_keys::CTI | cat_keys::CATTPK => match value {
            Value::String(hex) => hex_decode(hex).map(CborValue::Bytes).map_err(|_| {
                Error::InvalidJson(format!(
                    "{} must be a hex string",
                    display_claim_name(label)
                ))
            }),
            other => Ok(json_to_cbor(other)),
        },
        cat_keys::CATU if value.is_object() => Ok(CommonAccessTokenUri::from_dict(value)?.payload()),
        cat_keys::CATH if value.is_object() => {
            Ok(CommonAccessTokenHeader::from_dict(value)?.payload())
        }
        cat_keys::CATR if value.is_object() => {
            Ok(CommonAccessTokenRenewal::from_dict(value)?.payload())
        }
        cat_keys::CATIF if value.is_object() => {
            Ok(CommonAccessTokenIf::from_dict(value)?.payload())
        }
        cat_keys::CATNIP => match value {
            Value::Array(items) => Ok(CommonAccessTokenNetworkIp::from_list(items).payload()),
            Value::String(_) | Value::Number(_) => Ok(CommonAccessTokenNetworkIp::from_list(
                std::slice::from_ref(value),
            )
            .payload()),
            other => Ok(json_to_cbor(other)),
        },
        _ => Ok(json_to_cbor(value)),
    }
}

fn claim_to_json(label: i32, value: &CborValue) -> Result<Value, Error> {
    match (label, value) {
        (_, CborValue::Null) => Ok(Value::Null),
        (cwt_keys::CTI | cat_keys::CATTPK, CborValue::Bytes(bytes)) => {
            Ok(Value::String(hex_encode(bytes)?))
        }
        (cat_keys::CATU, CborValue::Map(_)) => CommonAccessTokenUri::from_map(value)?.to_dict(),
        (cat_keys::CATH, CborValue::TextMap(_)) => {
            CommonAccessTokenHeader::from_map(value)?.to_dict()
        }
        (cat_keys::CATR, CborValue::Map(_)) => {
            Ok(CommonAccessTokenRenewal::from_map(value)?.to_dict())
        }
        (cat_keys::CATIF, CborValue::Map(_)) => CommonAccessTokenIf::from_map(value)?.to_dict(),
        (cat_keys::CATNIP, CborValue::Array(_)) => Ok(Value::Array(
            CommonAccessTokenNetworkIp::from_array(value)?.to_list(),
        )),
        _ => cbor_to_json(value),
    }
}

/// Generic dictionary value to CBOR; objects become text-keyed maps
pub(crate) fn json_to_cbor(value: &Value) -> CborValue {
    match value {
        Value::Null => CborValue::Null,
        Value::Bool(b) => CborValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => CborValue::Integer(i),
            None => CborValue::Float(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => CborValue::Text(s.clone()),
        Value::Array(items) => CborValue::Array(items.iter().map(json_to_cbor).collect()),
        Value::Object(object) => CborValue::TextMap(
            object
                .iter()
                .map(|(key, value)| (key.clone(), json_to_cbor(value)))
                .collect(),
        ),
    }
}

/// Generic CBOR to dictionary value; byte strings become hex text
pub(crate) fn cbor_to_json(value: &CborValue) -> Result<Value, Error> {
    Ok(match value {
        CborValue::Null => Value::Null,
        CborValue::Bool(b) => Value::Bool(*b),
        CborValue::Integer(i) => Value::from(*i),
        CborValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        CborValue::Text(s) => Value::String(s.clone()),
        CborValue::Bytes(b) => Value::String(hex_encode(b)?),
        CborValue::Array(items) => {
            Value::Array(items.iter().map(cbor_to_json).collect::<Result<_, _>>()?)
        }
        CborValue::Map(map) => {
            let mut object = Map::new();
            for (key, value) in map {
                object.insert(key.to_string(), cbor_to_json(value)?);
            }
            Value::Object(object)
        }
        CborValue::TextMap(map) => {
            let mut object = Map::new();
            for (key, value) in map {
                object.insert(key.clone(), cbor_to_json(value)?);
            }
            Value::Object(object)
        }
        CborValue::Tag(_, inner) => cbor_to_json(inner)?,
    })
}
