//! Key material supplied by the caller.
//!
//! Keys are owned by the caller and never persisted. Secret parts are
//! redacted from `Debug` output.

use crate::error::Error;
use crate::utils::hex_decode;

/// Symmetric MAC key
#[derive(Clone)]
pub struct MacKey {
    /// Key identifier carried in the token header
    pub kid: String,
    /// Raw key bytes
    pub k: Vec<u8>,
}

impl MacKey {
    /// Create a MAC key from raw bytes
    pub fn new<S: Into<String>, K: Into<Vec<u8>>>(kid: S, k: K) -> Self {
        Self {
            kid: kid.into(),
            k: k.into(),
        }
    }

    /// Create a MAC key from hex-encoded bytes
    pub fn from_hex<S: Into<String>>(kid: S, hex: &str) -> Result<Self, Error> {
        let k = hex_decode(hex).map_err(|_| Error::InvalidKey("key is not valid hex".into()))?;
        Ok(Self::new(kid, k))
    }
}

impl std::fmt::Debug for MacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacKey")
            .field("kid", &self.kid)
            .field("k", &"***SECRET***")
            .finish()
    }
}

/// ES256 private key
#[derive(Clone)]
pub struct SigningKey {
    /// Key identifier carried in the token header
    pub kid: String,
    /// Private scalar (32 bytes, big-endian)
    pub d: Vec<u8>,
}

impl SigningKey {
    /// Create a signing key from the raw private scalar
    pub fn new<S: Into<String>, D: Into<Vec<u8>>>(kid: S, d: D) -> Self {
        Self {
            kid: kid.into(),
            d: d.into(),
        }
    }

    pub(crate) fn to_p256(&self) -> Result<p256::ecdsa::SigningKey, Error> {
        p256::ecdsa::SigningKey::from_slice(&self.d)
            .map_err(|_| Error::InvalidKey(format!("invalid P-256 private key: {}", self.kid)))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("d", &"***SECRET***")
            .finish()
    }
}

/// ES256 public key given by its affine coordinates
#[derive(Debug, Clone)]
pub struct VerifierKey {
    /// Key identifier
    pub kid: String,
    /// X coordinate (32 bytes)
    pub x: Vec<u8>,
    /// Y coordinate (32 bytes)
    pub y: Vec<u8>,
}

impl VerifierKey {
    /// Create a verifier key from its coordinates
    pub fn new<S: Into<String>, X: Into<Vec<u8>>, Y: Into<Vec<u8>>>(kid: S, x: X, y: Y) -> Self {
        Self {
            kid: kid.into(),
            x: x.into(),
            y: y.into(),
        }
    }

    pub(crate) fn to_p256(&self) -> Result<p256::ecdsa::VerifyingKey, Error> {
        if self.x.len() != 32 || self.y.len() != 32 {
            return Err(Error::InvalidKey(format!(
                "P-256 coordinates must be 32 bytes: {}",
                self.kid
            )));
        }
        let point = p256::EncodedPoint::from_affine_coordinates(
            p256::FieldBytes::from_slice(&self.x),
            p256::FieldBytes::from_slice(&self.y),
            false,
        );
        p256::ecdsa::VerifyingKey::from_encoded_point(&point)
            .map_err(|_| Error::InvalidKey(format!("invalid P-256 public key: {}", self.kid)))
    }
}
