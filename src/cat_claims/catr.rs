//! CATR (Common Access Token Renewal) claim: instructions for token renewal.

use crate::constants::{
    label_for, name_for, renewal_params, RENEWAL_PART_LABELS, RENEWAL_TYPE_LABELS,
};
use crate::error::Error;
use crate::header::CborValue;
use serde_json::Value;
use std::collections::BTreeMap;

/// How a renewed token is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalType {
    /// Same channel the token arrived on
    Automatic,
    /// `Set-Cookie`
    Cookie,
    /// Response header
    Header,
    /// Redirect with the token in the query string
    Redirect,
}

impl RenewalType {
    /// Create a renewal type from its label
    pub fn from_label(label: i64) -> Result<Self, Error> {
        let name = i32::try_from(label)
            .ok()
            .and_then(|label| name_for(RENEWAL_TYPE_LABELS, label))
            .ok_or_else(|| Error::RenewalClaim(format!("Unknown renewal type: {label}")))?;
        Self::from_name(name)
    }

    /// Create a renewal type from its name
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "automatic" => Ok(RenewalType::Automatic),
            "cookie" => Ok(RenewalType::Cookie),
            "header" => Ok(RenewalType::Header),
            "redirect" => Ok(RenewalType::Redirect),
            other => Err(Error::RenewalClaim(format!("Unknown renewal type: {other}"))),
        }
    }

    /// Name of the renewal type
    pub fn name(&self) -> &'static str {
        match self {
            RenewalType::Automatic => "automatic",
            RenewalType::Cookie => "cookie",
            RenewalType::Header => "header",
            RenewalType::Redirect => "redirect",
        }
    }

    /// Label of the renewal type
    pub fn label(&self) -> i64 {
        label_for(RENEWAL_TYPE_LABELS, self.name()).unwrap_or_default() as i64
    }
}

/// A renewal directive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonAccessTokenRenewal {
    /// Delivery type
    pub renewal_type: Option<RenewalType>,
    /// Seconds added to the renewal's issue time to form its expiry
    pub expadd: Option<i64>,
    /// Renewal window before expiry, in seconds
    pub deadline: Option<i64>,
    /// Cookie name for cookie delivery
    pub cookie_name: Option<String>,
    /// Header name for header delivery
    pub header_name: Option<String>,
    /// Additional cookie attributes
    pub cookie_params: Option<Vec<String>>,
    /// Additional header parameters
    pub header_params: Option<Vec<String>>,
    /// Redirect status code
    pub code: Option<u16>,
}

impl CommonAccessTokenRenewal {
    /// Automatic renewal, delivered on the channel the token arrived on
    pub fn automatic(expadd: i64, deadline: Option<i64>) -> Self {
        Self {
            renewal_type: Some(RenewalType::Automatic),
            expadd: Some(expadd),
            deadline,
            ..Default::default()
        }
    }

    /// Cookie renewal
    pub fn cookie(
        expadd: i64,
        deadline: Option<i64>,
        cookie_name: Option<&str>,
        cookie_params: Option<Vec<&str>>,
    ) -> Self {
        Self {
            renewal_type: Some(RenewalType::Cookie),
            expadd: Some(expadd),
            deadline,
            cookie_name: cookie_name.map(str::to_string),
            cookie_params: cookie_params
                .map(|params| params.into_iter().map(str::to_string).collect()),
            ..Default::default()
        }
    }

    /// Header renewal
    pub fn header(
        expadd: i64,
        deadline: Option<i64>,
        header_name: Option<&str>,
        header_params: Option<Vec<&str>>,
    ) -> Self {
        Self {
            renewal_type: Some(RenewalType::Header),
            expadd: Some(expadd),
            deadline,
            header_name: header_name.map(str::to_string),
            header_params: header_params
                .map(|params| params.into_iter().map(str::to_string).collect()),
            ..Default::default()
        }
    }

    /// Redirect renewal
    pub fn redirect(expadd: i64, deadline: Option<i64>, code: Option<u16>) -> Self {
        Self {
            renewal_type: Some(RenewalType::Redirect),
            expadd: Some(expadd),
            deadline,
            code,
            ..Default::default()
        }
    }

    /// A directive is usable only when both `type` and `expadd` are set
    pub fn is_valid(&self) -> bool {
        self.renewal_type.is_some() && self.expadd.is_some()
    }

    /// Build from the dictionary form
    pub fn from_dict(dict: &Value) -> Result<Self, Error> {
        let object = dict
            .as_object()
            .ok_or_else(|| Error::RenewalClaim("catr must be an object".to_string()))?;
        let mut catr = Self::default();
        for (name, value) in object {
            let label = label_for(RENEWAL_PART_LABELS, name)
                .ok_or_else(|| Error::RenewalClaim(format!("Unknown catr part: {name}")))?;
            match label {
                renewal_params::TYPE => {
                    let name = value.as_str().ok_or_else(|| {
                        Error::RenewalClaim("catr type must be a string".to_string())
                    })?;
                    catr.renewal_type = Some(RenewalType::from_name(name)?);
                }
                renewal_params::EXPADD => catr.expadd = Some(json_int(name, value)?),
                renewal_params::DEADLINE => catr.deadline = Some(json_int(name, value)?),
                renewal_params::COOKIE_NAME => catr.cookie_name = Some(json_text(name, value)?),
                renewal_params::HEADER_NAME => catr.header_name = Some(json_text(name, value)?),
                renewal_params::COOKIE_PARAMS => {
                    catr.cookie_params = Some(json_text_list(name, value)?)
                }
                renewal_params::HEADER_PARAMS => {
                    catr.header_params = Some(json_text_list(name, value)?)
                }
                renewal_params::STATUS_CODE => catr.code = Some(status_code(json_int(name, value)?)?),
                _ => return Err(Error::RenewalClaim(format!("Unknown catr part: {name}"))),
            }
        }
        Ok(catr)
    }

    /// Build from the wire form (label-keyed map)
    pub fn from_map(map: &CborValue) -> Result<Self, Error> {
        let map = match map {
            CborValue::Map(map) => map,
            other => {
                return Err(Error::RenewalClaim(format!(
                    "catr must be a map, got {}",
                    other.type_name()
                )))
            }
        };
        let mut catr = Self::default();
        for (label, value) in map {
            let name = name_for(RENEWAL_PART_LABELS, *label)
                .ok_or_else(|| Error::RenewalClaim(format!("Unknown catr part: {label}")))?;
            match *label {
                renewal_params::TYPE => {
                    let label = value.as_i64().ok_or_else(|| {
                        Error::RenewalClaim("catr type must be an integer".to_string())
                    })?;
                    catr.renewal_type = Some(RenewalType::from_label(label)?);
                }
                renewal_params::EXPADD => catr.expadd = Some(cbor_int(name, value)?),
                renewal_params::DEADLINE => catr.deadline = Some(cbor_int(name, value)?),
                renewal_params::COOKIE_NAME => catr.cookie_name = Some(cbor_text(name, value)?),
                renewal_params::HEADER_NAME => catr.header_name = Some(cbor_text(name, value)?),
                renewal_params::COOKIE_PARAMS => {
                    catr.cookie_params = Some(cbor_text_list(name, value)?)
                }
                renewal_params::HEADER_PARAMS => {
                    catr.header_params = Some(cbor_text_list(name, value)?)
                }
                renewal_params::STATUS_CODE => {
                    catr.code = Some(status_code(cbor_int(name, value)?)?)
                }
                _ => return Err(Error::RenewalClaim(format!("Unknown catr part: {name}"))),
            }
        }
        Ok(catr)
    }

    /// Dictionary form
    pub fn to_dict(&self) -> Value {
        let mut object = serde_json::Map::new();
        if let Some(renewal_type) = self.renewal_type {
            object.insert("type".into(), Value::from(renewal_type.name()));
        }
        if let Some(expadd) = self.expadd {
            object.insert("expadd".into(), Value::from(expadd));
        }
        if let Some(deadline) = self.deadline {
            object.insert("deadline".into(), Value::from(deadline));
        }
        if let Some(name) = &self.cookie_name {
            object.insert("cookie-name".into(), Value::from(name.as_str()));
        }
        if let Some(name) = &self.header_name {
            object.insert("header-name".into(), Value::from(name.as_str()));
        }
        if let Some(params) = &self.cookie_params {
            object.insert("cookie-params".into(), Value::from(params.clone()));
        }
        if let Some(params) = &self.header_params {
            object.insert("header-params".into(), Value::from(params.clone()));
        }
        if let Some(code) = self.code {
            object.insert("code".into(), Value::from(code));
        }
        Value::Object(object)
    }

    /// Wire form
    pub fn payload(&self) -> CborValue {
        let mut map = BTreeMap::new();
        if let Some(renewal_type) = self.renewal_type {
            map.insert(renewal_params::TYPE, CborValue::Integer(renewal_type.label()));
        }
        if let Some(expadd) = self.expadd {
            map.insert(renewal_params::EXPADD, CborValue::Integer(expadd));
        }
        if let Some(deadline) = self.deadline {
            map.insert(renewal_params::DEADLINE, CborValue::Integer(deadline));
        }
        if let Some(name) = &self.cookie_name {
            map.insert(renewal_params::COOKIE_NAME, CborValue::Text(name.clone()));
        }
        if let Some(name) = &self.header_name {
            map.insert(renewal_params::HEADER_NAME, CborValue::Text(name.clone()));
        }
        if let Some(params) = &self.cookie_params {
            map.insert(renewal_params::COOKIE_PARAMS, text_array(params));
        }
        if let Some(params) = &self.header_params {
            map.insert(renewal_params::HEADER_PARAMS, text_array(params));
        }
        if let Some(code) = self.code {
            map.insert(renewal_params::STATUS_CODE, CborValue::Integer(code as i64));
        }
        CborValue::Map(map)
    }
}

fn text_array(items: &[String]) -> CborValue {
    CborValue::Array(items.iter().cloned().map(CborValue::Text).collect())
}

fn status_code(code: i64) -> Result<u16, Error> {
    u16::try_from(code)
        .ok()
        .filter(|code| (100..600).contains(code))
        .ok_or_else(|| Error::RenewalClaim(format!("Invalid catr code: {code}")))
}

fn json_int(part: &str, value: &Value) -> Result<i64, Error> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .ok_or_else(|| Error::RenewalClaim(format!("catr {part} must be a number")))
}

fn json_text(part: &str, value: &Value) -> Result<String, Error> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::RenewalClaim(format!("catr {part} must be a string")))
}

/// A single string is accepted as a one-element list
fn json_text_list(part: &str, value: &Value) -> Result<Vec<String>, Error> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items.iter().map(|item| json_text(part, item)).collect(),
        _ => Err(Error::RenewalClaim(format!(
            "catr {part} must be a list of strings"
        ))),
    }
}

fn cbor_int(part: &str, value: &CborValue) -> Result<i64, Error> {
    value
        .as_i64()
        .ok_or_else(|| Error::RenewalClaim(format!("catr {part} must be a number")))
}

fn cbor_text(part: &str, value: &CborValue) -> Result<String, Error> {
    value
        .as_text()
        .map(str::to_string)
        .ok_or_else(|| Error::RenewalClaim(format!("catr {part} must be a string")))
}

fn cbor_text_list(part: &str, value: &CborValue) -> Result<Vec<String>, Error> {
    match value {
        CborValue::Text(s) => Ok(vec![s.clone()]),
        CborValue::Array(items) => items.iter().map(|item| cbor_text(part, item)).collect(),
        _ => Err(Error::RenewalClaim(format!(
            "catr {part} must be a list of strings"
        ))),
    }
}
