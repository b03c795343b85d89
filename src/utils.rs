//! Utility functions for Common Access Token

use crate::error::Error;
use crate::header::Algorithm;
use ct_codecs::{Base64UrlSafeNoPadding, Decoder, Encoder, Hex};

/// Truncated tag length for HMAC 256/64
const HMAC_256_64_LEN: usize = 8;

/// Compute an HMAC tag for a MAC algorithm
pub fn compute_hmac(alg: Algorithm, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    match alg {
        Algorithm::HmacSha256 => Ok(hmac_sha256::HMAC::mac(data, key).to_vec()),
        Algorithm::HmacSha256_64 => {
            Ok(hmac_sha256::HMAC::mac(data, key)[..HMAC_256_64_LEN].to_vec())
        }
        Algorithm::HmacSha512 => Ok(hmac_sha512::HMAC::mac(data, key).to_vec()),
        Algorithm::Es256 => Err(Error::InvalidAlgorithm(
            "ES256 is not a MAC algorithm".to_string(),
        )),
    }
}

/// Verify an HMAC tag in constant time
pub fn verify_hmac(alg: Algorithm, key: &[u8], data: &[u8], tag: &[u8]) -> Result<(), Error> {
    let computed_mac = compute_hmac(alg, key, data)?;

    if computed_mac.len() == tag.len() && ct_codecs::verify(&computed_mac, tag) {
        Ok(())
    } else {
        Err(Error::MacMismatch)
    }
}

/// Get current timestamp in seconds since Unix epoch
pub fn current_timestamp() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Encode bytes as unpadded base64url
pub fn base64_encode(bytes: &[u8]) -> Result<String, Error> {
    Ok(Base64UrlSafeNoPadding::encode_to_string(bytes)?)
}

/// Decode base64 text, accepting the standard or URL-safe alphabet, padded or not
pub fn base64_decode(text: &str) -> Result<Vec<u8>, Error> {
    let normalized: String = text
        .trim()
        .chars()
        .filter(|c| *c != '=')
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect();
    Ok(Base64UrlSafeNoPadding::decode_to_vec(normalized, None)?)
}

/// Lowercase hex encoding
pub fn hex_encode(bytes: &[u8]) -> Result<String, Error> {
    Ok(Hex::encode_to_string(bytes)?)
}

/// Hex decoding
pub fn hex_decode(text: &str) -> Result<Vec<u8>, Error> {
    Ok(Hex::decode_to_vec(text, None)?)
}
