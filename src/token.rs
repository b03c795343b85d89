//! Token implementation for Common Access Token
//!
//! A [`CommonAccessToken`] is either built from claims (unsealed), sealed with
//! [`CommonAccessToken::mac`] / [`CommonAccessToken::sign`], or parsed from
//! wire bytes with a key. After sealing or parsing it is read-only.

use crate::cbor::{decode_map, encode_map};
use crate::cat_claims::catv;
use crate::claims::Claims;
use crate::constants::{cat_keys, http_defaults};
use crate::cose::{self, CoseMessage};
use crate::error::Error;
use crate::header::Algorithm;
use crate::keys::{MacKey, SigningKey, VerifierKey};
use crate::utils::{base64_decode, base64_encode, current_timestamp, hex_encode};
use serde_json::{Map, Value};
use url::Url;

/// Options for sealing a token
#[derive(Debug, Clone, Copy)]
pub struct SealOptions {
    /// Wrap the COSE structure in the CWT tag (61)
    pub cwt_tag: bool,
}

impl Default for SealOptions {
    fn default() -> Self {
        Self { cwt_tag: true }
    }
}

impl SealOptions {
    /// Default options: CWT tag on
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not wrap in the CWT tag
    pub fn no_cwt_tag(mut self) -> Self {
        self.cwt_tag = false;
        self
    }
}

/// Common Access Token
#[derive(Debug, Clone)]
pub struct CommonAccessToken {
    claims: Claims,
    data: Option<Vec<u8>>,
    kid: Option<String>,
}

impl CommonAccessToken {
    /// Create an unsealed token from claims.
    ///
    /// Injects `catv = 1` when absent and validates claim types.
    pub fn new(mut claims: Claims) -> Result<Self, Error> {
        if !claims.contains(cat_keys::CATV) {
            claims.insert(cat_keys::CATV, catv::create());
        }
        claims.validate_types()?;
        Ok(Self {
            claims,
            data: None,
            kid: None,
        })
    }

    /// Create an unsealed token from the dictionary form
    pub fn from_json(dict: &Map<String, Value>) -> Result<Self, Error> {
        Self::new(Claims::from_json(dict)?)
    }

    /// Seal with a MAC key as COSE_Mac0
    pub fn mac(&mut self, key: &MacKey, alg: Algorithm, options: SealOptions) -> Result<(), Error> {
        let payload = encode_map(self.claims.as_map())?;
        let data = cose::mac_create(alg, &key.kid, &key.k, &payload, options.cwt_tag)?;
        self.data = Some(data);
        self.kid = Some(key.kid.clone());
        Ok(())
    }

    /// Parse and verify COSE_Mac0 bytes with `key`.
    ///
    /// With `expect_cwt_tag` set, bytes lacking the CWT tag are rejected.
    /// A wrong key surfaces as [`Error::MacMismatch`].
    pub fn parse(bytes: &[u8], key: &MacKey, expect_cwt_tag: bool) -> Result<Self, Error> {
        let message = cose::mac_read(bytes, &key.k, expect_cwt_tag)?;
        Self::from_message(bytes, message, &key.kid)
    }

    /// Seal with an ES256 signing key as COSE_Sign1
    pub fn sign(&mut self, key: &SigningKey, options: SealOptions) -> Result<(), Error> {
        let payload = encode_map(self.claims.as_map())?;
        let data = cose::sign_create(key, &payload, options.cwt_tag)?;
        self.data = Some(data);
        self.kid = Some(key.kid.clone());
        Ok(())
    }

    /// Parse and verify COSE_Sign1 bytes with `key`
    pub fn verify(bytes: &[u8], key: &VerifierKey, expect_cwt_tag: bool) -> Result<Self, Error> {
        let message = cose::sign_verify(bytes, key, expect_cwt_tag)?;
        Self::from_message(bytes, message, &key.kid)
    }

    /// Parse a base64 MAC token
    pub fn from_maced_token(
        token: &str,
        key: &MacKey,
        expect_cwt_tag: bool,
    ) -> Result<Self, Error> {
        Self::parse(&base64_decode(token)?, key, expect_cwt_tag)
    }

    /// Parse a base64 signed token
    pub fn from_signed_token(
        token: &str,
        key: &VerifierKey,
        expect_cwt_tag: bool,
    ) -> Result<Self, Error> {
        Self::verify(&base64_decode(token)?, key, expect_cwt_tag)
    }

    /// The kid recorded is the one of the key that verified the envelope,
    /// not the unauthenticated header value
    fn from_message(bytes: &[u8], message: CoseMessage, kid: &str) -> Result<Self, Error> {
        let claims = Claims::from_map(decode_map(&message.payload)?);
        Ok(Self {
            claims,
            data: Some(bytes.to_vec()),
            kid: Some(kid.to_string()),
        })
    }

    /// Run the acceptance checks against the current time
    pub fn is_acceptable(&self, options: &CatValidationOptions) -> Result<(), Error> {
        self.is_acceptable_at(options, current_timestamp())
    }

    /// Run the acceptance checks, stopping at the first failure:
    /// issuer, expiry, audience, not-before, catu, catr, catnip.
    pub fn is_acceptable_at(&self, options: &CatValidationOptions, now: i64) -> Result<(), Error> {
        self.claims.validate_types()?;

        if let Some(iss) = self.claims.issuer() {
            if iss != options.issuer {
                return Err(Error::InvalidIssuer(Some(iss.to_string())));
            }
        }

        if let Some(exp) = self.claims.expiration() {
            if exp < now {
                return Err(Error::TokenExpired);
            }
        }

        if let (Some(expected), Some(audience)) = (&options.audience, self.claims.audience()) {
            if !audience.iter().any(|aud| expected.contains(aud)) {
                return Err(Error::InvalidAudience(audience));
            }
        }

        if let Some(nbf) = self.claims.not_before() {
            if nbf > now {
                return Err(Error::TokenNotActive);
            }
        }

        if let Some(catu) = self.claims.catu() {
            let catu = catu?;
            let url = options.url.as_ref().ok_or_else(|| {
                Error::UriNotAllowed("A URL is required to validate the catu claim".to_string())
            })?;
            if !catu.match_uri(url)? {
                return Err(Error::UriNotAllowed(format!("URI not allowed: {url}")));
            }
        }

        if let Some(catr) = self.claims.catr() {
            if !catr?.is_valid() {
                return Err(Error::RenewalClaim(
                    "Invalid catr claim: type and expadd are required".to_string(),
                ));
            }
        }

        if let Some(catnip) = self.claims.catnip() {
            let catnip = catnip?;
            match &options.ip {
                Some(ip) if catnip.ip_match(ip) => {}
                Some(ip) => return Err(Error::IpNotAllowed(ip.clone())),
                None => return Err(Error::IpNotAllowed("undefined".to_string())),
            }
            if let Some(asn) = options.asn {
                if !catnip.asn_match(asn) {
                    return Err(Error::AsnNotAllowed(asn));
                }
            }
        }

        Ok(())
    }

    /// Whether the token is inside its renewal window
    pub fn should_renew(&self) -> bool {
        self.should_renew_at(current_timestamp())
    }

    /// Whether `now` lies in `[exp - deadline, exp)`, deadline defaulting to 60 seconds
    pub fn should_renew_at(&self, now: i64) -> bool {
        let exp = match self.claims.expiration() {
            Some(exp) => exp,
            None => return false,
        };
        let catr = match self.claims.catr() {
            Some(Ok(catr)) => catr,
            _ => return false,
        };
        let deadline = catr
            .deadline
            .unwrap_or(http_defaults::RENEWAL_DEADLINE_SECS);
        let Some(low_threshold) = exp.checked_sub(deadline) else {
            return false;
        };
        now >= low_threshold && now < exp
    }

    /// Decoded claims
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// Claims in dictionary form
    pub fn claims_json(&self) -> Result<Map<String, Value>, Error> {
        self.claims.to_json()
    }

    /// Token identifier as hex
    pub fn cti(&self) -> Option<String> {
        self.claims.cti().and_then(|cti| hex_encode(cti).ok())
    }

    /// Key identifier used to seal or parse the token
    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    /// Sealed bytes
    pub fn raw(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Sealed bytes as unpadded base64url
    pub fn base64(&self) -> Result<String, Error> {
        let data = self
            .data
            .as_deref()
            .ok_or_else(|| Error::InvalidFormat("Token has not been sealed".to_string()))?;
        base64_encode(data)
    }
}

/// Options for the acceptance checks
#[derive(Debug, Clone, Default)]
pub struct CatValidationOptions {
    /// Expected issuer
    pub issuer: String,
    /// Accepted audiences
    pub audience: Option<Vec<String>>,
    /// Request URL, required when the token carries catu
    pub url: Option<Url>,
    /// Client IP, required when the token carries catnip
    pub ip: Option<String>,
    /// Client ASN
    pub asn: Option<u64>,
}

impl CatValidationOptions {
    /// Create options for an expected issuer
    pub fn new<S: Into<String>>(issuer: S) -> Self {
        Self {
            issuer: issuer.into(),
            ..Default::default()
        }
    }

    /// Set the accepted audiences
    pub fn audience<S: Into<String>>(mut self, audience: Vec<S>) -> Self {
        self.audience = Some(audience.into_iter().map(Into::into).collect());
        self
    }

    /// Set the request URL
    pub fn url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Set the client IP
    pub fn ip<S: Into<String>>(mut self, ip: S) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Set the client ASN
    pub fn asn(mut self, asn: u64) -> Self {
        self.asn = Some(asn);
        self
    }
}
