//! # Header and Value Types for Common Access Token
//!
//! This module provides the COSE header structure, the supported algorithms
//! and the [`CborValue`] enum used for every claim and header value.
//!
//! Headers in Common Access Tokens are divided into two categories:
//!
//! - **Protected Headers**: These headers are integrity-protected and are part of the MAC or signature input.
//! - **Unprotected Headers**: These headers are not integrity-protected. The key identifier lives here.

use crate::constants::{cose_algs, cose_labels};
use crate::error::Error;
use std::collections::BTreeMap;

/// Supported algorithms for token sealing and verification.
///
/// # Example
///
/// ```
/// use cat_validator::Algorithm;
///
/// let alg = Algorithm::from_name("HS256").unwrap();
/// assert_eq!(alg, Algorithm::HmacSha256);
/// assert_eq!(alg.identifier(), 5); // COSE algorithm identifier
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// HMAC with SHA-256 truncated to 64 bits (COSE algorithm identifier: 4)
    HmacSha256_64,
    /// HMAC with SHA-256 (COSE algorithm identifier: 5)
    #[default]
    HmacSha256,
    /// HMAC with SHA-512 (COSE algorithm identifier: 7)
    HmacSha512,
    /// ECDSA P-256 with SHA-256 (COSE algorithm identifier: -7)
    Es256,
}

impl Algorithm {
    /// Get the algorithm identifier as defined in the COSE spec
    pub fn identifier(&self) -> i32 {
        match self {
            Algorithm::HmacSha256_64 => cose_algs::HMAC_SHA_256_64,
            Algorithm::HmacSha256 => cose_algs::HMAC_SHA_256,
            Algorithm::HmacSha512 => cose_algs::HMAC_SHA_512,
            Algorithm::Es256 => cose_algs::ES256,
        }
    }

    /// Create an Algorithm from an identifier
    pub fn from_identifier(id: i32) -> Option<Self> {
        match id {
            cose_algs::HMAC_SHA_256_64 => Some(Algorithm::HmacSha256_64),
            cose_algs::HMAC_SHA_256 => Some(Algorithm::HmacSha256),
            cose_algs::HMAC_SHA_512 => Some(Algorithm::HmacSha512),
            cose_algs::ES256 => Some(Algorithm::Es256),
            _ => None,
        }
    }

    /// Create an Algorithm from its JOSE-style name ("HS256", "HS256/64", "HS512", "ES256")
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "HS256/64" => Ok(Algorithm::HmacSha256_64),
            "HS256" => Ok(Algorithm::HmacSha256),
            "HS512" => Ok(Algorithm::HmacSha512),
            "ES256" => Ok(Algorithm::Es256),
            other => Err(Error::InvalidAlgorithm(other.to_string())),
        }
    }

    /// JOSE-style name of the algorithm
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::HmacSha256_64 => "HS256/64",
            Algorithm::HmacSha256 => "HS256",
            Algorithm::HmacSha512 => "HS512",
            Algorithm::Es256 => "ES256",
        }
    }

    /// Whether this algorithm produces a COSE_Mac0 envelope
    pub fn is_mac(&self) -> bool {
        !matches!(self, Algorithm::Es256)
    }
}

/// Key identifier that can be either a binary or string value.
///
/// Tokens minted by this crate carry the kid as a byte string; tokens from
/// other issuers may use a text string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyId {
    /// Binary key identifier
    Binary(Vec<u8>),
    /// String key identifier
    String(String),
}

impl KeyId {
    /// Create a new binary key identifier
    pub fn binary<T: Into<Vec<u8>>>(data: T) -> Self {
        KeyId::Binary(data.into())
    }

    /// Create a new string key identifier
    pub fn string<T: Into<String>>(data: T) -> Self {
        KeyId::String(data.into())
    }

    /// Get the key identifier as bytes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            KeyId::Binary(data) => data,
            KeyId::String(data) => data.as_bytes(),
        }
    }

    /// Lossy text rendering of the key identifier
    pub fn to_text(&self) -> String {
        match self {
            KeyId::Binary(data) => String::from_utf8_lossy(data).into_owned(),
            KeyId::String(data) => data.clone(),
        }
    }
}

/// CBOR value type for header and claim values.
///
/// This is the explicit tagged union every claim value is decoded into.
/// Maps keyed by integer labels (the claims map, catu, catr) use [`CborValue::Map`];
/// maps keyed by text (cath, catif) use [`CborValue::TextMap`].
///
/// # Examples
///
/// ```
/// use cat_validator::CborValue;
/// use std::collections::BTreeMap;
///
/// let int_value = CborValue::Integer(42);
/// let text_value = CborValue::Text("Hello, world!".to_string());
///
/// let mut map = BTreeMap::new();
/// map.insert(1, CborValue::Text("nested value".to_string()));
/// let map_value = CborValue::Map(map);
/// assert_eq!(map_value.type_name(), "map");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum CborValue {
    /// Integer value (signed 64-bit integer)
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// Byte string value (binary data)
    Bytes(Vec<u8>),
    /// Text string value (UTF-8 encoded string)
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Map value with integer keys
    Map(BTreeMap<i32, CborValue>),
    /// Map value with text keys
    TextMap(BTreeMap<String, CborValue>),
    /// Array value (list of CBOR values)
    Array(Vec<CborValue>),
    /// Tagged value
    Tag(u64, Box<CborValue>),
    /// Null value
    Null,
}

impl CborValue {
    /// Short name of the value's type, used in claim type errors
    pub fn type_name(&self) -> &'static str {
        match self {
            CborValue::Integer(_) | CborValue::Float(_) => "number",
            CborValue::Bytes(_) => "bytes",
            CborValue::Text(_) => "string",
            CborValue::Bool(_) => "boolean",
            CborValue::Map(_) | CborValue::TextMap(_) => "map",
            CborValue::Array(_) => "array",
            CborValue::Tag(_, _) => "tag",
            CborValue::Null => "null",
        }
    }

    /// Text content, if this is a text string
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CborValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content; floats are truncated
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CborValue::Integer(i) => Some(*i),
            CborValue::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    /// Byte string content
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            CborValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Whether the value is numeric
    pub fn is_number(&self) -> bool {
        matches!(self, CborValue::Integer(_) | CborValue::Float(_))
    }

    /// Whether the value is map-shaped
    pub fn is_map(&self) -> bool {
        matches!(self, CborValue::Map(_) | CborValue::TextMap(_))
    }
}

/// Type alias for header maps
pub type HeaderMap = BTreeMap<i32, CborValue>;

/// Header for a Common Access Token.
///
/// The protected part carries the algorithm and is integrity-protected.
/// The unprotected part carries the key identifier.
///
/// # Examples
///
/// ```
/// use cat_validator::{Algorithm, Header, KeyId};
///
/// let header = Header::new()
///     .with_algorithm(Algorithm::HmacSha256)
///     .with_unprotected_key_id(KeyId::binary("key-1"));
///
/// assert_eq!(header.algorithm(), Some(Algorithm::HmacSha256));
/// assert_eq!(header.key_id(), Some(KeyId::binary("key-1")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Header {
    /// Protected header parameters (must be integrity protected)
    pub protected: HeaderMap,
    /// Unprotected header parameters
    pub unprotected: HeaderMap,
}

impl Header {
    /// Creates a new empty header with no parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the algorithm in the protected header
    pub fn with_algorithm(mut self, alg: Algorithm) -> Self {
        self.protected.insert(
            cose_labels::ALG,
            CborValue::Integer(alg.identifier() as i64),
        );
        self
    }

    /// Set the key identifier in the protected header
    pub fn with_protected_key_id(mut self, kid: KeyId) -> Self {
        self.protected.insert(cose_labels::KID, key_id_value(kid));
        self
    }

    /// Set the key identifier in the unprotected header
    pub fn with_unprotected_key_id(mut self, kid: KeyId) -> Self {
        self.unprotected.insert(cose_labels::KID, key_id_value(kid));
        self
    }

    /// Get the algorithm from the protected header
    pub fn algorithm(&self) -> Option<Algorithm> {
        match self.protected.get(&cose_labels::ALG) {
            Some(CborValue::Integer(alg)) => Algorithm::from_identifier(*alg as i32),
            _ => None,
        }
    }

    /// Get the key identifier, looking first at the unprotected header
    pub fn key_id(&self) -> Option<KeyId> {
        let kid = self
            .unprotected
            .get(&cose_labels::KID)
            .or_else(|| self.protected.get(&cose_labels::KID))?;

        match kid {
            CborValue::Bytes(data) => Some(KeyId::Binary(data.clone())),
            CborValue::Text(data) => Some(KeyId::String(data.clone())),
            _ => None,
        }
    }
}

fn key_id_value(kid: KeyId) -> CborValue {
    match kid {
        KeyId::Binary(data) => CborValue::Bytes(data),
        KeyId::String(data) => CborValue::Text(data),
    }
}
