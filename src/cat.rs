//! Token generation, multi-key validation and renewal.

use crate::claims::Claims;
use crate::constants::cwt_keys;
use crate::error::Error;
use crate::header::{Algorithm, CborValue};
use crate::keys::{MacKey, SigningKey, VerifierKey};
use crate::token::{CatValidationOptions, CommonAccessToken, SealOptions};
use crate::utils::{base64_decode, current_timestamp};
use serde_json::{Map, Value};
use tracing::debug;

/// Envelope type of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenType {
    /// COSE_Mac0 with a symmetric key
    #[default]
    Mac,
    /// COSE_Sign1 with an ES256 key pair
    Sign,
}

impl TokenType {
    /// Parse `"mac"` or `"sign"`
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "mac" => Ok(TokenType::Mac),
            "sign" => Ok(TokenType::Sign),
            other => Err(Error::UnsupportedValidationType(other.to_string())),
        }
    }
}

/// Key configuration for [`Cat`]
#[derive(Debug, Clone, Default)]
pub struct CatOptions {
    /// MAC keys, tried in this order during validation
    pub keys: Vec<MacKey>,
    /// ES256 signing keys
    pub signing_keys: Vec<SigningKey>,
    /// ES256 verifier keys, tried in this order during validation
    pub verifier_keys: Vec<VerifierKey>,
    /// Reject tokens without the CWT tag
    pub expect_cwt_tag: bool,
}

impl CatOptions {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a MAC key
    pub fn key(mut self, key: MacKey) -> Self {
        self.keys.push(key);
        self
    }

    /// Add several MAC keys
    pub fn keys(mut self, keys: Vec<MacKey>) -> Self {
        self.keys.extend(keys);
        self
    }

    /// Add an ES256 signing key
    pub fn signing_key(mut self, key: SigningKey) -> Self {
        self.signing_keys.push(key);
        self
    }

    /// Add an ES256 verifier key
    pub fn verifier_key(mut self, key: VerifierKey) -> Self {
        self.verifier_keys.push(key);
        self
    }

    /// Reject tokens without the CWT tag
    pub fn expect_cwt_tag(mut self, expect: bool) -> Self {
        self.expect_cwt_tag = expect;
        self
    }
}

/// Options for [`Cat::generate`]
#[derive(Debug, Clone)]
pub struct CatGenerateOptions {
    /// Envelope type
    pub token_type: TokenType,
    /// Algorithm
    pub alg: Algorithm,
    /// Key to seal with
    pub kid: String,
    /// Set a fresh random `cti`, replacing any supplied one
    pub generate_cwt_id: bool,
    /// Wrap in the CWT tag
    pub cwt_tag: bool,
}

impl CatGenerateOptions {
    /// MAC with HS256 and the given key
    pub fn new<S: Into<String>>(kid: S) -> Self {
        Self {
            token_type: TokenType::Mac,
            alg: Algorithm::HmacSha256,
            kid: kid.into(),
            generate_cwt_id: false,
            cwt_tag: true,
        }
    }

    /// Set the envelope type
    pub fn token_type(mut self, token_type: TokenType) -> Self {
        self.token_type = token_type;
        self
    }

    /// Set the algorithm
    pub fn alg(mut self, alg: Algorithm) -> Self {
        self.alg = alg;
        self
    }

    /// Set a fresh random `cti`; off keeps the caller's `cti`
    pub fn generate_cwt_id(mut self, generate: bool) -> Self {
        self.generate_cwt_id = generate;
        self
    }

    /// Wrap in the CWT tag
    pub fn cwt_tag(mut self, cwt_tag: bool) -> Self {
        self.cwt_tag = cwt_tag;
        self
    }
}

/// Options for [`Cat::renew_token`]
#[derive(Debug, Clone)]
pub struct CatRenewOptions {
    /// Issuer of the renewed token
    pub issuer: String,
    /// Key to seal with
    pub kid: String,
    /// Algorithm
    pub alg: Algorithm,
    /// Envelope type
    pub token_type: TokenType,
}

impl CatRenewOptions {
    /// MAC renewal with HS256
    pub fn new<S: Into<String>, K: Into<String>>(issuer: S, kid: K) -> Self {
        Self {
            issuer: issuer.into(),
            kid: kid.into(),
            alg: Algorithm::HmacSha256,
            token_type: TokenType::Mac,
        }
    }

    /// Set the algorithm
    pub fn alg(mut self, alg: Algorithm) -> Self {
        self.alg = alg;
        self
    }

    /// Set the envelope type
    pub fn token_type(mut self, token_type: TokenType) -> Self {
        self.token_type = token_type;
        self
    }
}

/// Outcome of [`Cat::validate`] for a structurally valid token.
///
/// `error` holds the acceptance failure, if any, while `cat` stays readable.
#[derive(Debug)]
pub struct CatValidationResult {
    /// The parsed token
    pub cat: CommonAccessToken,
    /// First acceptance failure
    pub error: Option<Error>,
}

/// Token generator and validator holding the configured keys
#[derive(Debug, Clone, Default)]
pub struct Cat {
    options: CatOptions,
}

impl Cat {
    /// Create a generator/validator
    pub fn new(options: CatOptions) -> Self {
        Self { options }
    }

    /// Configured options
    pub fn options(&self) -> &CatOptions {
        &self.options
    }

    fn mac_key(&self, kid: &str) -> Result<&MacKey, Error> {
        self.options
            .keys
            .iter()
            .find(|key| key.kid == kid)
            .ok_or(Error::KeyNotFound)
    }

    fn signing_key(&self, kid: &str) -> Result<&SigningKey, Error> {
        self.options
            .signing_keys
            .iter()
            .find(|key| key.kid == kid)
            .ok_or(Error::KeyNotFound)
    }

    /// Seal claims with a configured key and return the base64 token
    pub(crate) fn seal(
        &self,
        claims: Claims,
        token_type: TokenType,
        alg: Algorithm,
        kid: &str,
        options: SealOptions,
    ) -> Result<String, Error> {
        let mut token = CommonAccessToken::new(claims)?;
        match token_type {
            TokenType::Mac => token.mac(self.mac_key(kid)?, alg, options)?,
            TokenType::Sign => token.sign(self.signing_key(kid)?, options)?,
        }
        token.base64()
    }

    /// Mint a token from claims
    pub fn generate(&self, mut claims: Claims, options: &CatGenerateOptions) -> Result<String, Error> {
        if options.generate_cwt_id {
            claims.insert(cwt_keys::CTI, random_cti());
        }
        let seal_options = SealOptions {
            cwt_tag: options.cwt_tag,
        };
        self.seal(
            claims,
            options.token_type,
            options.alg,
            &options.kid,
            seal_options,
        )
    }

    /// Mint a token from the dictionary form
    pub fn generate_from_json(
        &self,
        dict: &Map<String, Value>,
        options: &CatGenerateOptions,
    ) -> Result<String, Error> {
        self.generate(Claims::from_json(dict)?, options)
    }

    /// Validate a base64 token.
    ///
    /// Keys are tried sequentially in configuration order; the first key that
    /// verifies wins. When every key fails on the MAC or signature the result
    /// is [`Error::KeyNotFound`]; other structural errors propagate at once.
    /// Acceptance failures are reported in [`CatValidationResult::error`].
    pub fn validate(
        &self,
        token: &str,
        token_type: TokenType,
        options: &CatValidationOptions,
    ) -> Result<CatValidationResult, Error> {
        let bytes = base64_decode(token.trim())?;
        let cat = match token_type {
            TokenType::Mac => self.find_mac_key(&bytes)?,
            TokenType::Sign => self.find_verifier_key(&bytes)?,
        };
        let error = cat.is_acceptable(options).err();
        Ok(CatValidationResult { cat, error })
    }

    fn find_mac_key(&self, bytes: &[u8]) -> Result<CommonAccessToken, Error> {
        for key in &self.options.keys {
            match CommonAccessToken::parse(bytes, key, self.options.expect_cwt_tag) {
                Ok(cat) => return Ok(cat),
                Err(Error::MacMismatch) => {
                    debug!(kid = %key.kid, "MAC mismatch, trying next key");
                }
                Err(err) => return Err(err),
            }
        }
        Err(Error::KeyNotFound)
    }

    fn find_verifier_key(&self, bytes: &[u8]) -> Result<CommonAccessToken, Error> {
        for key in &self.options.verifier_keys {
            match CommonAccessToken::verify(bytes, key, self.options.expect_cwt_tag) {
                Ok(cat) => return Ok(cat),
                Err(Error::SignatureVerification) => {
                    debug!(kid = %key.kid, "signature mismatch, trying next key");
                }
                Err(err) => return Err(err),
            }
        }
        Err(Error::KeyNotFound)
    }

    /// Remint a token: fresh `cti`, `iat = now`, new issuer and
    /// `exp = iat + catr.expadd`
    pub fn renew_token(
        &self,
        token: &CommonAccessToken,
        options: &CatRenewOptions,
    ) -> Result<String, Error> {
        match options.token_type {
            TokenType::Mac => self.mac_key(&options.kid).map(|_| ())?,
            TokenType::Sign => self.signing_key(&options.kid).map(|_| ())?,
        }

        let expadd = match token.claims().catr() {
            Some(catr) => catr?.expadd.ok_or_else(|| {
                Error::RenewalClaim("Cannot renew a token without catr expadd".to_string())
            })?,
            None => {
                return Err(Error::RenewalClaim(
                    "Cannot renew a token without a catr claim".to_string(),
                ))
            }
        };

        let now = current_timestamp();
        let exp = now.checked_add(expadd).ok_or_else(|| {
            Error::RenewalClaim(format!("catr expadd {expadd} overflows the expiry"))
        })?;
        let mut claims = token.claims().clone();
        claims.insert(cwt_keys::CTI, random_cti());
        claims.insert(cwt_keys::IAT, CborValue::Integer(now));
        claims.insert(cwt_keys::ISS, CborValue::Text(options.issuer.clone()));
        claims.insert(cwt_keys::EXP, CborValue::Integer(exp));

        self.seal(
            claims,
            options.token_type,
            options.alg,
            &options.kid,
            SealOptions::default(),
        )
    }
}

pub(crate) fn random_cti() -> CborValue {
    let bytes: [u8; 16] = rand::random();
    CborValue::Bytes(bytes.to_vec())
}
