//! COSE_Mac0 and COSE_Sign1 envelopes with optional CWT tag wrapping.

use crate::cbor::{decode_cbor_value, decode_map, encode_map, encode_map_direct};
use crate::constants::cbor_tags;
use crate::error::Error;
use crate::header::{Algorithm, CborValue, Header, HeaderMap, KeyId};
use crate::keys::{SigningKey, VerifierKey};
use crate::utils::{compute_hmac, verify_hmac};
use minicbor::data::{Tag, Type};
use minicbor::{Decoder, Encoder};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::Signature;

/// Envelope flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoseKind {
    /// COSE_Mac0 (tag 17)
    Mac0,
    /// COSE_Sign1 (tag 18)
    Sign1,
}

impl CoseKind {
    fn tag(&self) -> u64 {
        match self {
            CoseKind::Mac0 => cbor_tags::COSE_MAC0,
            CoseKind::Sign1 => cbor_tags::COSE_SIGN1,
        }
    }

    fn context(&self) -> &'static str {
        match self {
            CoseKind::Mac0 => "MAC0",
            CoseKind::Sign1 => "Signature1",
        }
    }
}

/// A decoded COSE envelope, keeping the bytes the MAC or signature covers
#[derive(Debug, Clone)]
pub struct CoseMessage {
    /// Envelope flavour
    pub kind: CoseKind,
    /// Decoded headers
    pub header: Header,
    /// Serialized protected header as received
    pub protected_bytes: Vec<u8>,
    /// Serialized claim set as received
    pub payload: Vec<u8>,
    /// MAC tag or signature
    pub tag: Vec<u8>,
    /// Whether the envelope was wrapped in the CWT tag
    pub cwt_tagged: bool,
}

impl CoseMessage {
    /// Key identifier from the headers, rendered as text
    pub fn kid(&self) -> Option<String> {
        self.header.key_id().map(|kid| kid.to_text())
    }

    fn algorithm(&self) -> Result<Algorithm, Error> {
        self.header
            .algorithm()
            .ok_or_else(|| Error::InvalidAlgorithm("missing or unknown alg header".to_string()))
    }
}

/// Build the header used when sealing: algorithm protected, kid unprotected
pub fn seal_header(alg: Algorithm, kid: &str) -> Header {
    Header::new()
        .with_algorithm(alg)
        .with_unprotected_key_id(KeyId::binary(kid.as_bytes()))
}

/// Create a COSE_Mac0 envelope over `payload`
pub fn mac_create(
    alg: Algorithm,
    kid: &str,
    key: &[u8],
    payload: &[u8],
    cwt_tag: bool,
) -> Result<Vec<u8>, Error> {
    if !alg.is_mac() {
        return Err(Error::InvalidAlgorithm(alg.name().to_string()));
    }
    let header = seal_header(alg, kid);
    let protected_bytes = encode_map(&header.protected)?;
    let input = structure_input(CoseKind::Mac0, &protected_bytes, payload)?;
    let tag = compute_hmac(alg, key, &input)?;
    encode_envelope(
        CoseKind::Mac0,
        &protected_bytes,
        &header.unprotected,
        payload,
        &tag,
        cwt_tag,
    )
}

/// Decode a COSE_Mac0 envelope and verify its tag with `key`.
///
/// A wrong key surfaces as [`Error::MacMismatch`], distinct from structural errors.
pub fn mac_read(bytes: &[u8], key: &[u8], expect_cwt_tag: bool) -> Result<CoseMessage, Error> {
    let message = decode_envelope(bytes, CoseKind::Mac0, expect_cwt_tag)?;
    if message.kind != CoseKind::Mac0 {
        return Err(Error::InvalidFormat("expected COSE_Mac0".to_string()));
    }
    let alg = message.algorithm()?;
    let input = structure_input(CoseKind::Mac0, &message.protected_bytes, &message.payload)?;
    verify_hmac(alg, key, &input, &message.tag)?;
    Ok(message)
}

/// Create a COSE_Sign1 envelope over `payload` with ES256
pub fn sign_create(key: &SigningKey, payload: &[u8], cwt_tag: bool) -> Result<Vec<u8>, Error> {
    let header = seal_header(Algorithm::Es256, &key.kid);
    let protected_bytes = encode_map(&header.protected)?;
    let input = structure_input(CoseKind::Sign1, &protected_bytes, payload)?;
    let signature: Signature = key.to_p256()?.sign(&input);
    encode_envelope(
        CoseKind::Sign1,
        &protected_bytes,
        &header.unprotected,
        payload,
        &signature.to_bytes(),
        cwt_tag,
    )
}

/// Decode a COSE_Sign1 envelope and verify its signature with `key`
pub fn sign_verify(
    bytes: &[u8],
    key: &VerifierKey,
    expect_cwt_tag: bool,
) -> Result<CoseMessage, Error> {
    let message = decode_envelope(bytes, CoseKind::Sign1, expect_cwt_tag)?;
    if message.kind != CoseKind::Sign1 {
        return Err(Error::InvalidFormat("expected COSE_Sign1".to_string()));
    }
    if message.algorithm()? != Algorithm::Es256 {
        return Err(Error::InvalidAlgorithm(message.algorithm()?.name().to_string()));
    }
    let input = structure_input(CoseKind::Sign1, &message.protected_bytes, &message.payload)?;
    let signature =
        Signature::from_slice(&message.tag).map_err(|_| Error::SignatureVerification)?;
    key.to_p256()?
        .verify(&input, &signature)
        .map_err(|_| Error::SignatureVerification)?;
    Ok(message)
}

/// MAC_structure / Sig_structure:
/// `[context, protected : bstr, external_aad : bstr, payload : bstr]`
fn structure_input(kind: CoseKind, protected: &[u8], payload: &[u8]) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    let mut enc = Encoder::new(&mut buf);

    enc.array(4)?;
    enc.str(kind.context())?;
    enc.bytes(protected)?;
    // External AAD (empty)
    enc.bytes(&[])?;
    enc.bytes(payload)?;

    Ok(buf)
}

fn encode_envelope(
    kind: CoseKind,
    protected_bytes: &[u8],
    unprotected: &HeaderMap,
    payload: &[u8],
    tag: &[u8],
    cwt_tag: bool,
) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    let mut enc = Encoder::new(&mut buf);

    if cwt_tag {
        enc.tag(Tag::new(cbor_tags::CWT))?;
    }
    enc.tag(Tag::new(kind.tag()))?;

    enc.array(4)?;
    enc.bytes(protected_bytes)?;
    encode_map_direct(unprotected, &mut enc)?;
    enc.bytes(payload)?;
    enc.bytes(tag)?;

    Ok(buf)
}

/// Decode the outer envelope. An untagged array is taken as `default_kind`.
fn decode_envelope(
    bytes: &[u8],
    default_kind: CoseKind,
    expect_cwt_tag: bool,
) -> Result<CoseMessage, Error> {
    let mut dec = Decoder::new(bytes);
    let mut cwt_tagged = false;
    let mut kind = default_kind;

    if dec.datatype()? == Type::Tag {
        let mut tag = dec.tag()?.as_u64();
        if tag == cbor_tags::CWT {
            cwt_tagged = true;
            tag = if dec.datatype()? == Type::Tag {
                dec.tag()?.as_u64()
            } else {
                default_kind.tag()
            };
        }
        kind = match tag {
            cbor_tags::COSE_MAC0 => CoseKind::Mac0,
            cbor_tags::COSE_SIGN1 => CoseKind::Sign1,
            other => {
                return Err(Error::InvalidFormat(format!(
                    "Unexpected CBOR tag: {other}"
                )))
            }
        };
    }

    if expect_cwt_tag && !cwt_tagged {
        return Err(Error::MissingCwtTag);
    }

    let array_len = dec.array()?.unwrap_or(0);
    if array_len != 4 {
        return Err(Error::InvalidFormat(format!(
            "Expected array of length 4, got {array_len}"
        )));
    }

    let protected_bytes = dec.bytes()?.to_vec();
    let protected = if protected_bytes.is_empty() {
        HeaderMap::new()
    } else {
        decode_map(&protected_bytes)?
    };

    let unprotected = match decode_cbor_value(&mut dec)? {
        CborValue::Map(map) => map,
        other => {
            return Err(Error::InvalidFormat(format!(
                "Unprotected header must be a map, got {}",
                other.type_name()
            )))
        }
    };

    let payload = dec.bytes()?.to_vec();
    let tag = dec.bytes()?.to_vec();

    Ok(CoseMessage {
        kind,
        header: Header {
            protected,
            unprotected,
        },
        protected_bytes,
        payload,
        tag,
        cwt_tagged,
    })
}
