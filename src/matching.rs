//! # Match Engine
//!
//! A single match condition (`{match-kind: pattern}`) as used by the URI and
//! header matchers, together with its evaluation against a candidate string.

use crate::constants::{label_for, name_for, MATCH_TYPE_LABELS};
use crate::error::Error;
use crate::header::CborValue;
use crate::utils::hex_encode;
use regex::RegexBuilder;
use serde_json::Value;
use sha2::{Digest, Sha256, Sha512_256};
use std::collections::BTreeMap;

/// The seven supported match kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Exact text match
    Exact,
    /// Prefix match
    Prefix,
    /// Suffix match
    Suffix,
    /// Contains match
    Contains,
    /// Regular expression match, pattern is `[source, flags]`
    Regex,
    /// SHA-256 digest match
    Sha256,
    /// SHA-512/256 digest match
    Sha512_256,
}

impl MatchKind {
    /// Create a match kind from its label
    pub fn from_label(label: i32) -> Result<Self, Error> {
        let name = name_for(MATCH_TYPE_LABELS, label)
            .ok_or_else(|| Error::MatchType(format!("Unsupported match type: {label}")))?;
        Self::from_name(name)
    }

    /// Create a match kind from its name (`"exact-match"` ...)
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "exact-match" => Ok(MatchKind::Exact),
            "prefix-match" => Ok(MatchKind::Prefix),
            "suffix-match" => Ok(MatchKind::Suffix),
            "contains-match" => Ok(MatchKind::Contains),
            "regex-match" => Ok(MatchKind::Regex),
            "sha256-match" => Ok(MatchKind::Sha256),
            "sha512-256-match" => Ok(MatchKind::Sha512_256),
            other => Err(Error::MatchType(format!("Unsupported match type: {other}"))),
        }
    }

    /// Name of the match kind
    pub fn name(&self) -> &'static str {
        match self {
            MatchKind::Exact => "exact-match",
            MatchKind::Prefix => "prefix-match",
            MatchKind::Suffix => "suffix-match",
            MatchKind::Contains => "contains-match",
            MatchKind::Regex => "regex-match",
            MatchKind::Sha256 => "sha256-match",
            MatchKind::Sha512_256 => "sha512-256-match",
        }
    }

    /// Label of the match kind
    pub fn label(&self) -> i32 {
        label_for(MATCH_TYPE_LABELS, self.name()).unwrap_or_default()
    }
}

/// Pattern side of a match condition
#[derive(Debug, Clone, PartialEq)]
pub enum MatchValue {
    /// Text pattern
    Text(String),
    /// Array pattern (regex source and flags)
    Array(Vec<String>),
    /// Raw digest pattern
    Bytes(Vec<u8>),
}

/// A `{match-kind: pattern}` entry
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCondition {
    /// Match kind
    pub kind: MatchKind,
    /// Pattern
    pub value: MatchValue,
}

impl MatchCondition {
    /// Create a new match condition
    pub fn new(kind: MatchKind, value: MatchValue) -> Self {
        Self { kind, value }
    }

    /// Exact text match
    pub fn exact<S: Into<String>>(pattern: S) -> Self {
        Self::new(MatchKind::Exact, MatchValue::Text(pattern.into()))
    }

    /// Prefix match
    pub fn prefix<S: Into<String>>(pattern: S) -> Self {
        Self::new(MatchKind::Prefix, MatchValue::Text(pattern.into()))
    }

    /// Suffix match
    pub fn suffix<S: Into<String>>(pattern: S) -> Self {
        Self::new(MatchKind::Suffix, MatchValue::Text(pattern.into()))
    }

    /// Contains match
    pub fn contains<S: Into<String>>(pattern: S) -> Self {
        Self::new(MatchKind::Contains, MatchValue::Text(pattern.into()))
    }

    /// Regular expression match with optional flags
    pub fn regex<S: Into<String>>(source: S, flags: Option<&str>) -> Self {
        let mut parts = vec![source.into()];
        if let Some(flags) = flags {
            parts.push(flags.to_string());
        }
        Self::new(MatchKind::Regex, MatchValue::Array(parts))
    }

    /// Decode from the wire form: a map with one `match-label => pattern` entry
    pub fn from_cbor(value: &CborValue) -> Result<Self, Error> {
        let map = match value {
            CborValue::Map(map) if map.len() == 1 => map,
            other => {
                return Err(Error::MatchType(format!(
                    "Match condition must be a single-entry map, got {}",
                    other.type_name()
                )))
            }
        };
        let (label, pattern) = map
            .iter()
            .next()
            .ok_or_else(|| Error::MatchType("Empty match condition".to_string()))?;
        let kind = MatchKind::from_label(*label)?;
        let value = match pattern {
            CborValue::Text(s) => MatchValue::Text(s.clone()),
            CborValue::Bytes(b) => MatchValue::Bytes(b.clone()),
            CborValue::Array(items) => MatchValue::Array(
                items
                    .iter()
                    .map(|item| {
                        item.as_text().map(str::to_string).ok_or_else(|| {
                            Error::MatchType("Match pattern array must hold strings".to_string())
                        })
                    })
                    .collect::<Result<_, _>>()?,
            ),
            other => {
                return Err(Error::MatchType(format!(
                    "Invalid match pattern type: {}",
                    other.type_name()
                )))
            }
        };
        Ok(Self { kind, value })
    }

    /// Encode to the wire form
    pub fn to_cbor(&self) -> CborValue {
        let pattern = match &self.value {
            MatchValue::Text(s) => CborValue::Text(s.clone()),
            MatchValue::Bytes(b) => CborValue::Bytes(b.clone()),
            MatchValue::Array(items) => {
                CborValue::Array(items.iter().cloned().map(CborValue::Text).collect())
            }
        };
        let mut map = BTreeMap::new();
        map.insert(self.kind.label(), pattern);
        CborValue::Map(map)
    }

    /// Decode from the dictionary form: `{"prefix-match": "/content"}`
    pub fn from_json(value: &Value) -> Result<Self, Error> {
        let object = value
            .as_object()
            .filter(|object| object.len() == 1)
            .ok_or_else(|| {
                Error::MatchType("Match condition must be a single-entry object".to_string())
            })?;
        let (name, pattern) = object
            .iter()
            .next()
            .ok_or_else(|| Error::MatchType("Empty match condition".to_string()))?;
        let kind = MatchKind::from_name(name)?;
        let value = match pattern {
            Value::String(s) => MatchValue::Text(s.clone()),
            Value::Array(items) => MatchValue::Array(
                items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_string).ok_or_else(|| {
                            Error::MatchType("Match pattern array must hold strings".to_string())
                        })
                    })
                    .collect::<Result<_, _>>()?,
            ),
            other => {
                return Err(Error::MatchType(format!(
                    "Invalid match pattern: {other}"
                )))
            }
        };
        Ok(Self { kind, value })
    }

    /// Encode to the dictionary form
    pub fn to_json(&self) -> Result<Value, Error> {
        let pattern = match &self.value {
            MatchValue::Text(s) => Value::String(s.clone()),
            MatchValue::Array(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            MatchValue::Bytes(b) => Value::String(hex_encode(b)?),
        };
        let mut object = serde_json::Map::new();
        object.insert(self.kind.name().to_string(), pattern);
        Ok(Value::Object(object))
    }

    /// Evaluate the condition against a candidate string
    pub fn evaluate(&self, candidate: &str) -> Result<bool, Error> {
        evaluate(candidate, self.kind, &self.value)
    }
}

/// Evaluate one match kind against a candidate string.
///
/// Fails with [`Error::MatchType`] when the pattern shape does not fit the kind.
pub fn evaluate(candidate: &str, kind: MatchKind, pattern: &MatchValue) -> Result<bool, Error> {
    match kind {
        MatchKind::Exact => Ok(candidate == text_pattern(pattern, "Exact")?),
        MatchKind::Prefix => Ok(candidate.starts_with(text_pattern(pattern, "Prefix")?)),
        MatchKind::Suffix => Ok(candidate.ends_with(text_pattern(pattern, "Suffix")?)),
        MatchKind::Contains => Ok(candidate.contains(text_pattern(pattern, "Contains")?)),
        MatchKind::Regex => {
            let parts = match pattern {
                MatchValue::Array(parts) if !parts.is_empty() => parts,
                _ => return Err(Error::MatchType("Regex match must be an array".to_string())),
            };
            let flags = parts.get(1).map(String::as_str).unwrap_or("");
            let mut builder = RegexBuilder::new(&parts[0]);
            for flag in flags.chars() {
                match flag {
                    'i' => builder.case_insensitive(true),
                    'm' => builder.multi_line(true),
                    's' => builder.dot_matches_new_line(true),
                    'x' => builder.ignore_whitespace(true),
                    _ => &mut builder,
                };
            }
            let regex = builder
                .build()
                .map_err(|err| Error::MatchType(format!("Invalid regex: {err}")))?;
            Ok(regex.is_match(candidate))
        }
        MatchKind::Sha256 => digest_match(&Sha256::digest(candidate.as_bytes()), pattern, "SHA256"),
        MatchKind::Sha512_256 => digest_match(
            &Sha512_256::digest(candidate.as_bytes()),
            pattern,
            "SHA512-256",
        ),
    }
}

fn text_pattern<'a>(pattern: &'a MatchValue, label: &str) -> Result<&'a str, Error> {
    match pattern {
        MatchValue::Text(s) => Ok(s),
        MatchValue::Array(_) => Err(Error::MatchType(format!("{label} match cannot be an array"))),
        MatchValue::Bytes(_) => Err(Error::MatchType(format!("{label} match must be a string"))),
    }
}

fn digest_match(digest: &[u8], pattern: &MatchValue, label: &str) -> Result<bool, Error> {
    match pattern {
        MatchValue::Text(expected) => Ok(hex_encode(digest)? == *expected),
        MatchValue::Bytes(expected) => {
            Ok(expected.len() == digest.len() && ct_codecs::verify(digest, expected))
        }
        MatchValue::Array(_) => Err(Error::MatchType(format!("{label} match cannot be an array"))),
    }
}
