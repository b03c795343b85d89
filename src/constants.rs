//! # Constants for Common Access Token
//!
//! Label registry for the claim codec. Every table here is immutable static
//! data: integer labels used on the wire plus the name tables used at the
//! dictionary boundary, with lookups in both directions.

/// CWT claim keys as defined in RFC 8392
pub mod cwt_keys {
    /// Issuer claim key
    pub const ISS: i32 = 1;
    /// Subject claim key
    pub const SUB: i32 = 2;
    /// Audience claim key
    pub const AUD: i32 = 3;
    /// Expiration time claim key
    pub const EXP: i32 = 4;
    /// Not before claim key
    pub const NBF: i32 = 5;
    /// Issued at claim key
    pub const IAT: i32 = 6;
    /// CWT ID claim key
    pub const CTI: i32 = 7;
    /// Confirmation claim key (RFC 8747)
    pub const CNF: i32 = 8;
}

/// CAT-specific claim keys
pub mod cat_keys {
    /// Geohash claim key
    pub const GEOHASH: i32 = 282;
    /// Common Access Token Replay (catreplay) claim key
    pub const CATREPLAY: i32 = 308;
    /// Common Access Token Probability of Rejection (catpor) claim key
    pub const CATPOR: i32 = 309;
    /// Common Access Token Version (catv) claim key
    pub const CATV: i32 = 310;
    /// Common Access Token Network IP (catnip) claim key
    pub const CATNIP: i32 = 311;
    /// Common Access Token URI (catu) claim key
    pub const CATU: i32 = 312;
    /// Common Access Token Methods (catm) claim key
    pub const CATM: i32 = 313;
    /// Common Access Token ALPN (catalpn) claim key
    pub const CATALPN: i32 = 314;
    /// Common Access Token Header (cath) claim key
    pub const CATH: i32 = 315;
    /// Common Access Token Geographic ISO3166 (catgeoiso3166) claim key
    pub const CATGEOISO3166: i32 = 316;
    /// Common Access Token Geographic Coordinate (catgeocoord) claim key
    pub const CATGEOCOORD: i32 = 317;
    /// Common Access Token Altitude (catgeoalt) claim key
    pub const CATGEOALT: i32 = 318;
    /// Common Access Token TLS Public Key (cattpk) claim key
    pub const CATTPK: i32 = 319;
    /// Common Access Token If Data (catifdata) claim key
    pub const CATIFDATA: i32 = 320;
    /// Common Access Token DPoP Settings (catdpop) claim key
    pub const CATDPOP: i32 = 321;
    /// Common Access Token If (catif) claim key
    pub const CATIF: i32 = 322;
    /// Common Access Token Renewal (catr) claim key
    pub const CATR: i32 = 323;
    /// Common Access Token TLS Fingerprint (cattprint) claim key
    pub const CATTPRINT: i32 = 324;
}

/// URI component identifiers for CATU claim
pub mod uri_components {
    /// Scheme (RFC 3986 Section 3.1)
    pub const SCHEME: i32 = 0;
    /// Host (RFC 3986 Section 3.2.2)
    pub const HOST: i32 = 1;
    /// Port (RFC 3986 Section 3.2.3)
    pub const PORT: i32 = 2;
    /// Path (RFC 3986 Section 3.3)
    pub const PATH: i32 = 3;
    /// Query (RFC 3986 Section 3.4)
    pub const QUERY: i32 = 4;
    /// Parent path
    pub const PARENT_PATH: i32 = 5;
    /// Filename
    pub const FILENAME: i32 = 6;
    /// Stem
    pub const STEM: i32 = 7;
    /// Extension
    pub const EXTENSION: i32 = 8;
}

/// Match types for CATU and CATH claims
pub mod match_types {
    /// Exact text match
    pub const EXACT: i32 = 0;
    /// Prefix match
    pub const PREFIX: i32 = 1;
    /// Suffix match
    pub const SUFFIX: i32 = 2;
    /// Contains match
    pub const CONTAINS: i32 = 3;
    /// Regular expression match
    pub const REGEX: i32 = 4;
    /// SHA-256 match
    pub const SHA256: i32 = -1;
    /// SHA-512/256 match
    pub const SHA512_256: i32 = -2;
}

/// Renewal types for CATR claim
pub mod renewal_types {
    /// Automatic renewal
    pub const AUTOMATIC: i32 = 0;
    /// Cookie renewal
    pub const COOKIE: i32 = 1;
    /// Header renewal
    pub const HEADER: i32 = 2;
    /// Redirect renewal
    pub const REDIRECT: i32 = 3;
}

/// Renewal parameter labels for CATR claim
pub mod renewal_params {
    /// Renewal type
    pub const TYPE: i32 = 0;
    /// Expiration extension
    pub const EXPADD: i32 = 1;
    /// Renewal deadline
    pub const DEADLINE: i32 = 2;
    /// Name for cookie
    pub const COOKIE_NAME: i32 = 3;
    /// Name for header
    pub const HEADER_NAME: i32 = 4;
    /// Additional cookie parameters
    pub const COOKIE_PARAMS: i32 = 5;
    /// Additional header parameters
    pub const HEADER_PARAMS: i32 = 6;
    /// Status code for redirects
    pub const STATUS_CODE: i32 = 7;
}

/// CATREPLAY values
pub mod replay_values {
    /// Replay is permitted
    pub const PERMITTED: i64 = 0;
    /// Replay is prohibited
    pub const PROHIBITED: i64 = 1;
    /// Reuse-detection
    pub const REUSE_DETECTION: i64 = 2;
}

/// CBOR tags used by the token envelope and the CATNIP claim
pub mod cbor_tags {
    /// CBOR Web Token (RFC 8392)
    pub const CWT: u64 = 61;
    /// COSE_Mac0
    pub const COSE_MAC0: u64 = 17;
    /// COSE_Sign1
    pub const COSE_SIGN1: u64 = 18;
    /// IPv4 address or prefix (RFC 9164)
    pub const IPV4: u64 = 52;
    /// IPv6 address or prefix (RFC 9164)
    pub const IPV6: u64 = 54;
}

/// COSE header parameter labels
pub mod cose_labels {
    /// Algorithm (used in protected header)
    pub const ALG: i32 = 1;
    /// Key identifier (used in protected or unprotected header)
    pub const KID: i32 = 4;
}

/// COSE algorithm identifiers
pub mod cose_algs {
    /// HMAC with SHA-256 truncated to 64 bits
    pub const HMAC_SHA_256_64: i32 = 4;
    /// HMAC with SHA-256
    pub const HMAC_SHA_256: i32 = 5;
    /// HMAC with SHA-512
    pub const HMAC_SHA_512: i32 = 7;
    /// ECDSA with P-256 and SHA-256
    pub const ES256: i32 = -7;
}

/// HTTP conventions
pub mod http_defaults {
    /// Request/response header carrying the token
    pub const TOKEN_HEADER: &str = "CTA-Common-Access-Token";
    /// Cookie carrying the token
    pub const TOKEN_COOKIE: &str = "CTA-Common-Access-Token";
    /// Query parameter carrying the token
    pub const TOKEN_QUERY_PARAM: &str = "cat";
    /// Renewal window used when the CATR claim has no deadline
    pub const RENEWAL_DEADLINE_SECS: i64 = 60;
    /// Redirect status used when the CATR claim has no code
    pub const REDIRECT_STATUS: u16 = 302;
}

pub(crate) const CLAIM_LABELS: &[(&str, i32)] = &[
    ("iss", cwt_keys::ISS),
    ("sub", cwt_keys::SUB),
    ("aud", cwt_keys::AUD),
    ("exp", cwt_keys::EXP),
    ("nbf", cwt_keys::NBF),
    ("iat", cwt_keys::IAT),
    ("cti", cwt_keys::CTI),
    ("cnf", cwt_keys::CNF),
    ("geohash", cat_keys::GEOHASH),
    ("catreplay", cat_keys::CATREPLAY),
    ("catpor", cat_keys::CATPOR),
    ("catv", cat_keys::CATV),
    ("catnip", cat_keys::CATNIP),
    ("catu", cat_keys::CATU),
    ("catm", cat_keys::CATM),
    ("catalpn", cat_keys::CATALPN),
    ("cath", cat_keys::CATH),
    ("catgeoiso3166", cat_keys::CATGEOISO3166),
    ("catgeocoord", cat_keys::CATGEOCOORD),
    ("catgeoalt", cat_keys::CATGEOALT),
    ("cattpk", cat_keys::CATTPK),
    ("catifdata", cat_keys::CATIFDATA),
    ("catdpop", cat_keys::CATDPOP),
    ("catif", cat_keys::CATIF),
    ("catr", cat_keys::CATR),
    ("cattprint", cat_keys::CATTPRINT),
];

pub(crate) const URI_PART_LABELS: &[(&str, i32)] = &[
    ("scheme", uri_components::SCHEME),
    ("host", uri_components::HOST),
    ("port", uri_components::PORT),
    ("path", uri_components::PATH),
    ("query", uri_components::QUERY),
    ("parent-path", uri_components::PARENT_PATH),
    ("filename", uri_components::FILENAME),
    ("stem", uri_components::STEM),
    ("extension", uri_components::EXTENSION),
];

pub(crate) const MATCH_TYPE_LABELS: &[(&str, i32)] = &[
    ("exact-match", match_types::EXACT),
    ("prefix-match", match_types::PREFIX),
    ("suffix-match", match_types::SUFFIX),
    ("contains-match", match_types::CONTAINS),
    ("regex-match", match_types::REGEX),
    ("sha256-match", match_types::SHA256),
    ("sha512-256-match", match_types::SHA512_256),
];

pub(crate) const RENEWAL_PART_LABELS: &[(&str, i32)] = &[
    ("type", renewal_params::TYPE),
    ("expadd", renewal_params::EXPADD),
    ("deadline", renewal_params::DEADLINE),
    ("cookie-name", renewal_params::COOKIE_NAME),
    ("header-name", renewal_params::HEADER_NAME),
    ("cookie-params", renewal_params::COOKIE_PARAMS),
    ("header-params", renewal_params::HEADER_PARAMS),
    ("code", renewal_params::STATUS_CODE),
];

pub(crate) const RENEWAL_TYPE_LABELS: &[(&str, i32)] = &[
    ("automatic", renewal_types::AUTOMATIC),
    ("cookie", renewal_types::COOKIE),
    ("header", renewal_types::HEADER),
    ("redirect", renewal_types::REDIRECT),
];

/// Look up the label registered for `name` in a label table
pub fn label_for(table: &[(&str, i32)], name: &str) -> Option<i32> {
    table
        .iter()
        .find(|(entry, _)| *entry == name)
        .map(|(_, label)| *label)
}

/// Look up the name registered for `label` in a label table
pub fn name_for(table: &[(&'static str, i32)], label: i32) -> Option<&'static str> {
    table
        .iter()
        .find(|(_, entry)| *entry == label)
        .map(|(name, _)| *name)
}

/// Label of a registered claim name
pub fn claim_label(name: &str) -> Option<i32> {
    label_for(CLAIM_LABELS, name)
}

/// Registered name of a claim label
pub fn claim_name(label: i32) -> Option<&'static str> {
    name_for(CLAIM_LABELS, label)
}

/// Resolve a claim name to its label.
///
/// Registered names map through the registry; a purely numeric name
/// (`^\d+$`) passes through as its integer label.
pub fn resolve_claim_label(name: &str) -> Option<i32> {
    if let Some(label) = claim_label(name) {
        return Some(label);
    }
    if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
        return name.parse().ok();
    }
    None
}

/// Dictionary name of a claim label: the registered name, or the label itself
pub fn display_claim_name(label: i32) -> String {
    claim_name(label)
        .map(str::to_string)
        .unwrap_or_else(|| label.to_string())
}
