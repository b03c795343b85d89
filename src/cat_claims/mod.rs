//! # CAT-specific Claims
//!
//! Codecs for the structured Common Access Token claims. Each one translates
//! between a human-friendly dictionary (`from_dict` / `to_dict`) and its
//! compact label-keyed wire form (`from_map` / `payload`).
//!
//! - **CATU** (URI) - limits the URI to which the token can provide access
//! - **CATH** (Header) - HTTP header requirements
//! - **CATNIP** (Network IP) - IP address, prefix and ASN restrictions
//! - **CATR** (Renewal) - instructions for token renewal
//! - **CATIF** (If) - conditional responses, e.g. a redirect when the token expires
//!
//! The simpler claims (CATM, CATREPLAY, CATV) have plain helper functions.
//!
//! ## CATU Claim (URI Validation)
//!
//! ```rust
//! use cat_validator::{CommonAccessTokenUri, MatchCondition, UriPart};
//! use url::Url;
//!
//! let catu = CommonAccessTokenUri::new()
//!     .with_part(UriPart::Scheme, MatchCondition::exact("https"))
//!     .with_part(UriPart::Path, MatchCondition::prefix("/content"))
//!     .with_part(UriPart::Extension, MatchCondition::exact(".m3u8"));
//!
//! let url = Url::parse("https://example.com/content/path/file.m3u8").unwrap();
//! assert!(catu.match_uri(&url).unwrap());
//! ```
//!
//! ## CATR Claim (Token Renewal)
//!
//! ```rust
//! use cat_validator::CommonAccessTokenRenewal;
//!
//! let catr = CommonAccessTokenRenewal::header(120, Some(60), Some("cta-common-access-token"), None);
//! assert!(catr.is_valid());
//! ```

pub mod catif;
pub mod catnip;
pub mod catr;
pub mod cath;
pub mod catu;

pub use catif::{CommonAccessTokenIf, ConditionalResponse, HeaderDirective};
pub use catnip::{CommonAccessTokenNetworkIp, NetworkEntry};
pub use catr::{CommonAccessTokenRenewal, RenewalType};
pub use cath::CommonAccessTokenHeader;
pub use catu::{CommonAccessTokenUri, UriPart};

/// Helper functions for CATM (Common Access Token Methods) claims
pub mod catm {
    use crate::header::CborValue;

    /// Creates a CATM claim with the specified allowed methods
    pub fn create(methods: Vec<&str>) -> CborValue {
        CborValue::Array(
            methods
                .into_iter()
                .map(|method| CborValue::Text(method.to_string()))
                .collect(),
        )
    }

    /// Whether `method` is listed (case-insensitive)
    pub fn allows(claim: &CborValue, method: &str) -> bool {
        match claim {
            CborValue::Array(methods) => methods
                .iter()
                .filter_map(CborValue::as_text)
                .any(|allowed| allowed.eq_ignore_ascii_case(method)),
            _ => false,
        }
    }
}

/// Helper functions for CATREPLAY (Common Access Token Replay) claims
pub mod catreplay {
    use crate::constants::replay_values;
    use crate::header::CborValue;

    /// Replay is permitted
    pub fn permitted() -> CborValue {
        CborValue::Integer(replay_values::PERMITTED)
    }

    /// Replay is prohibited
    pub fn prohibited() -> CborValue {
        CborValue::Integer(replay_values::PROHIBITED)
    }

    /// Reuse detection
    pub fn reuse_detection() -> CborValue {
        CborValue::Integer(replay_values::REUSE_DETECTION)
    }
}

/// Helper functions for CATV (Common Access Token Version) claims
pub mod catv {
    use crate::header::CborValue;

    /// Default version
    pub const DEFAULT_VERSION: i64 = 1;

    /// Creates a CATV claim with the default version
    pub fn create() -> CborValue {
        CborValue::Integer(DEFAULT_VERSION)
    }
}
