//! Error types for the Common Access Token library

use thiserror::Error;

/// Errors that can occur when working with Common Access Tokens
#[derive(Error, Debug)]
pub enum Error {
    /// Error during CBOR encoding
    #[error("CBOR encoding error: {0}")]
    CborEncode(#[from] minicbor::encode::Error<std::convert::Infallible>),

    /// Error during CBOR decoding
    #[error("CBOR decode error: {0}")]
    CborDecode(#[from] minicbor::decode::Error),

    /// Invalid token format
    #[error("Invalid token format: {0}")]
    InvalidFormat(String),

    /// The token was expected to carry the CWT tag (61) but did not
    #[error("Expected CWT tag")]
    MissingCwtTag,

    /// Invalid or unsupported algorithm
    #[error("Invalid algorithm: {0}")]
    InvalidAlgorithm(String),

    /// Key material could not be used
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The COSE_Mac0 tag does not match the payload for the given key
    #[error("Tag mismatch")]
    MacMismatch,

    /// Signature verification failed
    #[error("Signature verification failed. The token's signature does not match the expected signature")]
    SignatureVerification,

    /// No configured key could validate the token, or the requested key id is not configured
    #[error("Failed to validate token signature with any of the available keys")]
    KeyNotFound,

    /// Unsupported validation type (mac / sign / none)
    #[error("Unsupported validation type: {0}")]
    UnsupportedValidationType(String),

    /// The input claims dictionary is malformed
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// A claim name has no registered label and is not numeric
    #[error("Unknown claim: {0}")]
    UnknownClaim(String),

    /// A claim value has the wrong type
    #[error("Invalid claim type for {claim}: {actual}")]
    InvalidClaimType {
        /// Claim name
        claim: String,
        /// Type of the offending value
        actual: String,
    },

    /// Invalid claim value
    #[error("Invalid claim value: {0}")]
    InvalidClaimValue(String),

    /// Match condition shape does not fit the match type
    #[error("{0}")]
    MatchType(String),

    /// Invalid CATU claim
    #[error("{0}")]
    InvalidCatu(String),

    /// Invalid CATIF claim
    #[error("Invalid catif claim: {0}")]
    InvalidCatIf(String),

    /// Invalid issuer
    #[error("Invalid issuer: {}", .0.as_deref().unwrap_or("undefined"))]
    InvalidIssuer(Option<String>),

    /// Token expired
    #[error("Token has expired")]
    TokenExpired,

    /// Token not yet valid
    #[error("Token is not yet active")]
    TokenNotActive,

    /// Invalid audience
    #[error("Invalid audience: {}", .0.join(", "))]
    InvalidAudience(Vec<String>),

    /// The request URI is not allowed by the CATU claim
    #[error("{0}")]
    UriNotAllowed(String),

    /// The client IP is not allowed by the CATNIP claim
    #[error("IP not allowed: {0}")]
    IpNotAllowed(String),

    /// The client ASN is not allowed by the CATNIP claim
    #[error("ASN not allowed: {0}")]
    AsnNotAllowed(u64),

    /// Invalid renewal claim
    #[error("{0}")]
    RenewalClaim(String),

    /// The request headers do not satisfy the CATH claim
    #[error("Header not allowed: {0}")]
    HeaderNotAllowed(String),

    /// No token present in the request
    #[error("No CTA token could be found")]
    NoTokenFound,

    /// HTTP method not allowed by the CATM claim
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Token replay violation
    #[error("Replay not allowed: {0}")]
    ReplayNotAllowed(u64),

    /// The reuse detector flagged the token
    #[error("Invalid reuse detected")]
    InvalidReuseDetected,

    /// CTI store failure
    #[error("Token store error: {0}")]
    Store(String),

    /// A response header could not be built
    #[error("Invalid HTTP header: {0}")]
    InvalidHttpHeader(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Whether this error is a rejection caused by the token or the request
    /// (mapped to HTTP 401) rather than an internal failure (HTTP 500).
    pub fn is_unauthorized(&self) -> bool {
        !matches!(
            self,
            Error::CborEncode(_)
                | Error::InvalidKey(_)
                | Error::Store(_)
                | Error::InvalidHttpHeader(_)
                | Error::Other(_)
        )
    }
}

impl From<ct_codecs::Error> for Error {
    fn from(err: ct_codecs::Error) -> Self {
        Error::InvalidFormat(format!("invalid encoding: {err:?}"))
    }
}
