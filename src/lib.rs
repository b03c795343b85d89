//! # Common Access Token (CAT)
//!
//! Issue and validate Common Access Tokens: CBOR Web Tokens carried in a
//! COSE_Mac0 or COSE_Sign1 envelope, with the CTA-5007 claims that bind a token
//! to URIs, networks, methods and headers.
//!
//! ## Overview
//!
//! - Claims codec between a name-keyed JSON dictionary and the label-keyed CBOR map
//! - HS256, HS256/64, HS512 (MAC) and ES256 (signature) envelopes, with or without the CWT tag
//! - Multi-key validation: keys are tried in configuration order
//! - Acceptance checks for `iss`, `exp`, `aud`, `nbf`, CATU, CATR and CATNIP
//! - Token renewal from the CATR claim
//! - An HTTP validator with replay tracking, method and header locks,
//!   auto-renewal and CATIF conditional responses
//!
//! ## Basic Example
//!
//! ```rust
//! use cat_validator::{
//!     current_timestamp, Cat, CatGenerateOptions, CatOptions, CatValidationOptions, Claims,
//!     MacKey, TokenType,
//! };
//!
//! let key = MacKey::from_hex(
//!     "Symmetric256",
//!     "403697de87af64611c1d32a05dab0fe1fcb715a86ab435f1ec99192d79569388",
//! )
//! .expect("Failed to parse key");
//! let cat = Cat::new(CatOptions::new().key(key));
//!
//! let now = current_timestamp();
//! let claims = Claims::new()
//!     .with_issuer("eyevinn")
//!     .with_subject("jonas")
//!     .with_expiration(now + 120);
//!
//! let token = cat
//!     .generate(claims, &CatGenerateOptions::new("Symmetric256").generate_cwt_id(true))
//!     .expect("Failed to generate token");
//!
//! let result = cat
//!     .validate(&token, TokenType::Mac, &CatValidationOptions::new("eyevinn"))
//!     .expect("Failed to validate token");
//! assert!(result.error.is_none());
//! assert_eq!(result.cat.claims().subject(), Some("jonas"));
//! ```
//!
//! ## Dictionary Claims
//!
//! ```rust
//! use cat_validator::{Cat, CatGenerateOptions, CatOptions, MacKey};
//! use serde_json::json;
//!
//! let cat = Cat::new(CatOptions::new().key(MacKey::new("k1", vec![7u8; 32])));
//! let claims = json!({
//!     "iss": "eyevinn",
//!     "catu": { "scheme": { "exact-match": "https" } },
//!     "catm": ["GET", "HEAD"],
//!     "catreplay": 0,
//! });
//!
//! let token = cat
//!     .generate_from_json(claims.as_object().unwrap(), &CatGenerateOptions::new("k1"))
//!     .expect("Failed to generate token");
//! assert!(!token.is_empty());
//! ```

pub mod cat;
pub mod cat_claims;
pub mod cbor;
pub mod claims;
pub mod constants;
pub mod cose;
pub mod error;
pub mod header;
pub mod keys;
pub mod loggers;
pub mod matching;
pub mod stores;
pub mod token;
pub mod utils;
pub mod validators;

pub use cat::{
    Cat, CatGenerateOptions, CatOptions, CatRenewOptions, CatValidationResult, TokenType,
};
pub use cat_claims::{
    catm, catreplay, catv, CommonAccessTokenHeader, CommonAccessTokenIf,
    CommonAccessTokenNetworkIp, CommonAccessTokenRenewal, CommonAccessTokenUri,
    ConditionalResponse, HeaderDirective, NetworkEntry, RenewalType, UriPart,
};
pub use claims::Claims;
pub use constants::{
    cat_keys, cbor_tags, cose_algs, cose_labels, cwt_keys, http_defaults, match_types,
    renewal_params, renewal_types, replay_values, uri_components,
};
pub use error::Error;
pub use header::{Algorithm, CborValue, Header, HeaderMap, KeyId};
pub use keys::{MacKey, SigningKey, VerifierKey};
pub use loggers::{TokenLogger, TracingTokenLogger};
pub use matching::{MatchCondition, MatchKind, MatchValue};
pub use stores::{CtiStore, MemoryCtiStore};
#[cfg(feature = "redis-store")]
pub use stores::RedisCtiStore;
pub use token::{CatValidationOptions, CommonAccessToken, SealOptions};
pub use utils::current_timestamp;
pub use validators::{
    ClientAsn, HttpResponse, HttpValidator, HttpValidatorOptions, RequestContext, ReuseDetector,
    TokenSource,
};

/// Re-export minicbor for users of this crate
pub use minicbor;

#[cfg(test)]
mod tests;
