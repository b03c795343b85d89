//! CATU (Common Access Token URI) claim: restricts the URI a token grants access to.

use crate::constants::http_defaults::TOKEN_QUERY_PARAM;
use crate::constants::{label_for, name_for, uri_components, URI_PART_LABELS};
use crate::error::Error;
use crate::header::CborValue;
use crate::matching::MatchCondition;
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

/// URI components a CATU claim can restrict
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UriPart {
    /// Scheme without the trailing colon
    Scheme,
    /// Hostname
    Host,
    /// Port, empty when absent or the scheme's default
    Port,
    /// Raw path
    Path,
    /// Query string without the token parameter
    Query,
    /// Path up to the last `/`
    ParentPath,
    /// Path after the last `/`
    Filename,
    /// Filename up to the first `.`
    Stem,
    /// Filename from the first `.`, inclusive
    Extension,
}

impl UriPart {
    /// Create a URI part from its label
    pub fn from_label(label: i32) -> Result<Self, Error> {
        match label {
            uri_components::SCHEME => Ok(UriPart::Scheme),
            uri_components::HOST => Ok(UriPart::Host),
            uri_components::PORT => Ok(UriPart::Port),
            uri_components::PATH => Ok(UriPart::Path),
            uri_components::QUERY => Ok(UriPart::Query),
            uri_components::PARENT_PATH => Ok(UriPart::ParentPath),
            uri_components::FILENAME => Ok(UriPart::Filename),
            uri_components::STEM => Ok(UriPart::Stem),
            uri_components::EXTENSION => Ok(UriPart::Extension),
            other => Err(Error::InvalidCatu(format!("Unsupported URI part: {other}"))),
        }
    }

    /// Create a URI part from its name
    pub fn from_name(name: &str) -> Result<Self, Error> {
        let label = label_for(URI_PART_LABELS, name)
            .ok_or_else(|| Error::InvalidCatu(format!("Unsupported URI part: {name}")))?;
        Self::from_label(label)
    }

    /// Label of the URI part
    pub fn label(&self) -> i32 {
        match self {
            UriPart::Scheme => uri_components::SCHEME,
            UriPart::Host => uri_components::HOST,
            UriPart::Port => uri_components::PORT,
            UriPart::Path => uri_components::PATH,
            UriPart::Query => uri_components::QUERY,
            UriPart::ParentPath => uri_components::PARENT_PATH,
            UriPart::Filename => uri_components::FILENAME,
            UriPart::Stem => uri_components::STEM,
            UriPart::Extension => uri_components::EXTENSION,
        }
    }

    /// Name of the URI part
    pub fn name(&self) -> &'static str {
        name_for(URI_PART_LABELS, self.label()).unwrap_or("unknown")
    }

    /// Extract this part from a URL
    pub fn extract(&self, url: &Url) -> String {
        let path = url.path();
        let filename = path.rsplit('/').next().unwrap_or("");
        let dot = filename.find('.').unwrap_or(filename.len());

        match self {
            UriPart::Scheme => url.scheme().to_string(),
            UriPart::Host => url.host_str().unwrap_or("").to_string(),
            UriPart::Port => url.port().map(|p| p.to_string()).unwrap_or_default(),
            UriPart::Path => path.to_string(),
            UriPart::Query => {
                let mut serializer = url::form_urlencoded::Serializer::new(String::new());
                for (key, value) in url.query_pairs() {
                    if key != TOKEN_QUERY_PARAM {
                        serializer.append_pair(&key, &value);
                    }
                }
                serializer.finish()
            }
            UriPart::ParentPath => path
                .rfind('/')
                .map(|idx| path[..idx].to_string())
                .unwrap_or_default(),
            UriPart::Filename => filename.to_string(),
            UriPart::Stem => filename[..dot].to_string(),
            UriPart::Extension => filename[dot..].to_string(),
        }
    }
}

/// A URI matcher: URI part => match condition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommonAccessTokenUri {
    parts: BTreeMap<UriPart, MatchCondition>,
}

impl CommonAccessTokenUri {
    /// Creates an empty matcher, which matches every URI
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the condition for a URI part
    pub fn with_part(mut self, part: UriPart, condition: MatchCondition) -> Self {
        self.parts.insert(part, condition);
        self
    }

    /// Build from the dictionary form: `{"path": {"prefix-match": "/content"}}`
    pub fn from_dict(dict: &Value) -> Result<Self, Error> {
        let object = dict
            .as_object()
            .ok_or_else(|| Error::InvalidCatu("catu must be an object".to_string()))?;
        let mut catu = Self::new();
        for (name, condition) in object {
            let part = UriPart::from_name(name)?;
            catu.parts
                .insert(part, MatchCondition::from_json(condition)?);
        }
        Ok(catu)
    }

    /// Build from the wire form (label-keyed map)
    pub fn from_map(map: &CborValue) -> Result<Self, Error> {
        let map = match map {
            CborValue::Map(map) => map,
            other => {
                return Err(Error::InvalidCatu(format!(
                    "catu must be a map, got {}",
                    other.type_name()
                )))
            }
        };
        let mut catu = Self::new();
        for (label, condition) in map {
            let part = UriPart::from_label(*label)?;
            catu.parts.insert(part, MatchCondition::from_cbor(condition)?);
        }
        Ok(catu)
    }

    /// Dictionary form
    pub fn to_dict(&self) -> Result<Value, Error> {
        let mut object = serde_json::Map::new();
        for (part, condition) in &self.parts {
            object.insert(part.name().to_string(), condition.to_json()?);
        }
        Ok(Value::Object(object))
    }

    /// Wire form
    pub fn payload(&self) -> CborValue {
        CborValue::Map(
            self.parts
                .iter()
                .map(|(part, condition)| (part.label(), condition.to_cbor()))
                .collect(),
        )
    }

    /// Evaluate the matcher against a URL; stops at the first failing part
    pub fn match_uri(&self, url: &Url) -> Result<bool, Error> {
        for (part, condition) in &self.parts {
            if !condition.evaluate(&part.extract(url))? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Number of restricted parts
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether no part is restricted
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}
