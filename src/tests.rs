//! Tests for Common Access Token

use crate::{
    cat_keys, catm, catreplay, current_timestamp, cwt_keys, Algorithm, Cat, CatGenerateOptions,
    CatOptions, CatRenewOptions, CatValidationOptions, CborValue, Claims, CommonAccessToken,
    CommonAccessTokenHeader, CommonAccessTokenNetworkIp, CommonAccessTokenRenewal,
    CommonAccessTokenUri, CtiStore, HttpValidator, HttpValidatorOptions, MacKey, MatchCondition,
    MatchKind, MatchValue, MemoryCtiStore, ReuseDetector, SealOptions, SigningKey, TokenLogger,
    TokenType, UriPart, VerifierKey,
};
use http::Request;
use serde_json::json;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

const TEST_KEY: &[u8] = b"test-key-for-hmac-sha256-algorithm";
const INTEROP_KEY_HEX: &str = "403697de87af64611c1d32a05dab0fe1fcb715a86ab435f1ec99192d79569388";

const INTEROP_VALID: &str = "2D3RhEOhAQWhBFBha2FtYWlfa2V5X2hzMjU2U6MEGnUCOrsGGmfXRKwFGmfXRKxYIOM6yRx830uqAamWFv1amFYRa5vaV2z5lIQTqFEvFh8z";
const INTEROP_WITH_ISSUER: &str = "2D3RhEOhAQWhBFBha2FtYWlfa2V5X2hzMjU2WCijAXgYY29hcDovL2pvbmFzLmV4YW1wbGUuY29tBhpn1JipBRpn1JipWCCX4nQb8SYQoa0SFLxE2Rh35DdTjoA9TzOSy1IP9O1BGQ";
const INTEROP_EXPIRED: &str = "2D3RhEOhAQWhBFBha2FtYWlfa2V5X2hzMjU2U6MEGmfXP_YGGmfXQAsFGmfXQAtYINTT_KlOyhaV6NaSxFXkqJWfBagSkPkem10dysoA-C0w";
const RFC8392_TOKEN: &str = "2D3RhEOhAQShBExTeW1tZXRyaWMyNTZYUKcBdWNvYXA6Ly9hcy5leGFtcGxlLmNvbQJlZXJpa3cDeBhjb2FwOi8vbGlnaHQuZXhhbXBsZS5jb20EGlYSrrAFGlYQ2fAGGlYQ2fAHQgtxSAkxAe9teJIA";

const ES256_D: &str = "6c1382765aec5358f117733d281c1c7bdc39884d04a45a1e6c67c858bc206c19";
const ES256_X: &str = "143329cce7868e416927599cf65a34f3ce2ffda55a7eca69ed8919a394d42f0f";
const ES256_Y: &str = "60f7f1a780d8a783bfb7a2dd6b2796e8128dbbcef9d3d168db9529971a36e7b9";

fn test_cat() -> Cat {
    Cat::new(CatOptions::new().key(MacKey::new("k1", TEST_KEY.to_vec())))
}

fn mint(claims: Claims) -> String {
    test_cat()
        .generate(claims, &CatGenerateOptions::new("k1").generate_cwt_id(true))
        .expect("Failed to generate token")
}

fn json_claims(value: serde_json::Value) -> Claims {
    Claims::from_json(value.as_object().expect("Claims must be an object"))
        .expect("Failed to parse claims")
}

fn validate(token: &str, options: &CatValidationOptions) -> crate::CatValidationResult {
    test_cat()
        .validate(token, TokenType::Mac, options)
        .expect("Failed to validate token")
}

#[test]
fn test_generate_and_validate_roundtrip() {
    let now = current_timestamp();
    let claims = Claims::new()
        .with_issuer("eyevinn")
        .with_subject("jonas")
        .with_audience("one")
        .with_expiration(now + 120)
        .with_issued_at(now)
        .with_claim(cat_keys::CATM, catm::create(vec!["GET", "HEAD"]));

    let token = mint(claims);
    let result = validate(
        &token,
        &CatValidationOptions::new("eyevinn").audience(vec!["one", "two"]),
    );

    assert!(result.error.is_none(), "unexpected error: {:?}", result.error);
    let decoded = result.cat.claims();
    assert_eq!(decoded.issuer(), Some("eyevinn"));
    assert_eq!(decoded.subject(), Some("jonas"));
    assert_eq!(decoded.expiration(), Some(now + 120));
    assert_eq!(decoded.get(cat_keys::CATV), Some(&CborValue::Integer(1)));
    assert_eq!(decoded.cti().map(<[u8]>::len), Some(16));
    assert_eq!(result.cat.kid(), Some("k1"));
}

#[test]
fn test_generate_cwt_id_replaces_cti() {
    let token = mint(Claims::new().with_issuer("eyevinn").with_cti(vec![0x0b, 0x71]));
    let result = validate(&token, &CatValidationOptions::new("eyevinn"));
    let cti = result.cat.cti().expect("cti present");
    assert_ne!(cti, "0b71");
    assert_eq!(cti.len(), 32);

    let token = test_cat()
        .generate(
            Claims::new().with_issuer("eyevinn").with_cti(vec![0x0b, 0x71]),
            &CatGenerateOptions::new("k1"),
        )
        .expect("Failed to generate token");
    let result = validate(&token, &CatValidationOptions::new("eyevinn"));
    assert_eq!(result.cat.cti().as_deref(), Some("0b71"));
}

#[test]
fn test_algorithms_roundtrip() {
    for alg in [
        Algorithm::HmacSha256_64,
        Algorithm::HmacSha256,
        Algorithm::HmacSha512,
    ] {
        let cat = test_cat();
        let token = cat
            .generate(
                Claims::new().with_issuer("eyevinn"),
                &CatGenerateOptions::new("k1").alg(alg),
            )
            .expect("Failed to generate token");
        let result = cat
            .validate(&token, TokenType::Mac, &CatValidationOptions::new("eyevinn"))
            .expect("Failed to validate token");
        assert!(result.error.is_none(), "{} failed", alg.name());
    }
}

#[test]
fn test_interop_token_validates() {
    let key = MacKey::from_hex("akamai_key_hs256", INTEROP_KEY_HEX).expect("Failed to parse key");
    let cat = Cat::new(CatOptions::new().key(key));

    let result = cat
        .validate(
            INTEROP_VALID,
            TokenType::Mac,
            &CatValidationOptions::new("eyevinn"),
        )
        .expect("Failed to validate token");

    assert!(result.error.is_none(), "unexpected error: {:?}", result.error);
    assert_eq!(result.cat.kid(), Some("akamai_key_hs256"));
    assert_eq!(result.cat.claims().expiration(), Some(1_963_080_379));
}

#[test]
fn test_interop_token_issuer() {
    let key = MacKey::from_hex("akamai_key_hs256", INTEROP_KEY_HEX).expect("Failed to parse key");
    let cat = Cat::new(CatOptions::new().key(key));

    let result = cat
        .validate(
            INTEROP_WITH_ISSUER,
            TokenType::Mac,
            &CatValidationOptions::new("coap://jonas.example.com"),
        )
        .expect("Failed to validate token");
    assert!(result.error.is_none());

    let result = cat
        .validate(
            INTEROP_WITH_ISSUER,
            TokenType::Mac,
            &CatValidationOptions::new("eyevinn"),
        )
        .expect("Failed to validate token");
    match result.error {
        Some(crate::Error::InvalidIssuer(Some(iss))) => {
            assert_eq!(iss, "coap://jonas.example.com");
        }
        other => panic!("Expected InvalidIssuer, got {other:?}"),
    }
}

#[test]
fn test_interop_expired_token() {
    let key = MacKey::from_hex("akamai_key_hs256", INTEROP_KEY_HEX).expect("Failed to parse key");
    let cat = Cat::new(CatOptions::new().key(key));

    let result = cat
        .validate(
            INTEROP_EXPIRED,
            TokenType::Mac,
            &CatValidationOptions::new("eyevinn"),
        )
        .expect("Failed to validate token");
    match &result.error {
        Some(crate::Error::TokenExpired) => {}
        other => panic!("Expected TokenExpired, got {other:?}"),
    }
    assert_eq!(
        result.error.map(|err| err.to_string()).as_deref(),
        Some("Token has expired")
    );
}

#[test]
fn test_rfc8392_mac_token() {
    let key = MacKey::from_hex("Symmetric256", INTEROP_KEY_HEX).expect("Failed to parse key");
    let token =
        CommonAccessToken::from_maced_token(RFC8392_TOKEN, &key, true).expect("Failed to parse");

    let claims = token.claims();
    assert_eq!(claims.issuer(), Some("coap://as.example.com"));
    assert_eq!(claims.subject(), Some("erikw"));
    assert_eq!(
        claims.audience(),
        Some(vec!["coap://light.example.com".to_string()])
    );
    assert_eq!(claims.expiration(), Some(1_444_064_944));
    assert_eq!(claims.not_before(), Some(1_443_944_944));
    assert_eq!(claims.issued_at(), Some(1_443_944_944));
    assert_eq!(token.cti().as_deref(), Some("0b71"));
    assert_eq!(token.kid(), Some("Symmetric256"));

    let options = CatValidationOptions::new("coap://as.example.com")
        .audience(vec!["coap://light.example.com"]);
    token
        .is_acceptable_at(&options, 1_444_000_000)
        .expect("Token should be acceptable inside its lifetime");

    match token.is_acceptable(&options) {
        Err(crate::Error::TokenExpired) => {}
        other => panic!("Expected TokenExpired, got {other:?}"),
    }
}

#[test]
fn test_rfc8392_wrong_key() {
    let key = MacKey::from_hex("Symmetric256", &"00".repeat(32)).expect("Failed to parse key");
    match CommonAccessToken::from_maced_token(RFC8392_TOKEN, &key, true) {
        Err(crate::Error::MacMismatch) => {}
        other => panic!("Expected MacMismatch, got {other:?}"),
    }
}

#[test]
fn test_cwt_tag_discipline() {
    let cat = test_cat();
    let untagged = cat
        .generate(
            Claims::new().with_issuer("eyevinn"),
            &CatGenerateOptions::new("k1").cwt_tag(false),
        )
        .expect("Failed to generate token");
    let tagged = cat
        .generate(
            Claims::new().with_issuer("eyevinn"),
            &CatGenerateOptions::new("k1"),
        )
        .expect("Failed to generate token");

    let lenient = cat
        .validate(&untagged, TokenType::Mac, &CatValidationOptions::new("eyevinn"))
        .expect("Untagged token should validate without expectation");
    assert!(lenient.error.is_none());

    let strict = Cat::new(
        CatOptions::new()
            .key(MacKey::new("k1", TEST_KEY.to_vec()))
            .expect_cwt_tag(true),
    );
    match strict.validate(&untagged, TokenType::Mac, &CatValidationOptions::new("eyevinn")) {
        Err(crate::Error::MissingCwtTag) => {}
        other => panic!("Expected MissingCwtTag, got {other:?}"),
    }
    strict
        .validate(&tagged, TokenType::Mac, &CatValidationOptions::new("eyevinn"))
        .expect("Tagged token should validate");
}

#[test]
fn test_multi_key_fallback() {
    let signer = Cat::new(CatOptions::new().key(MacKey::new("k2", b"second-key".to_vec())));
    let token = signer
        .generate(
            Claims::new().with_issuer("eyevinn"),
            &CatGenerateOptions::new("k2"),
        )
        .expect("Failed to generate token");

    let validator = Cat::new(
        CatOptions::new()
            .key(MacKey::new("k1", TEST_KEY.to_vec()))
            .key(MacKey::new("k2", b"second-key".to_vec())),
    );
    let result = validator
        .validate(&token, TokenType::Mac, &CatValidationOptions::new("eyevinn"))
        .expect("Second key should validate the token");
    assert!(result.error.is_none());
    assert_eq!(result.cat.kid(), Some("k2"));

    match test_cat().validate(&token, TokenType::Mac, &CatValidationOptions::new("eyevinn")) {
        Err(crate::Error::KeyNotFound) => {}
        other => panic!("Expected KeyNotFound, got {other:?}"),
    }
}

#[test]
fn test_generate_with_unknown_kid() {
    match test_cat().generate(Claims::new(), &CatGenerateOptions::new("missing")) {
        Err(crate::Error::KeyNotFound) => {}
        other => panic!("Expected KeyNotFound, got {other:?}"),
    }
}

#[test]
fn test_acceptance_order() {
    let now = current_timestamp();

    // Issuer is checked before expiry
    let token = mint(
        Claims::new()
            .with_issuer("someone-else")
            .with_expiration(now - 10),
    );
    match validate(&token, &CatValidationOptions::new("eyevinn")).error {
        Some(crate::Error::InvalidIssuer(_)) => {}
        other => panic!("Expected InvalidIssuer, got {other:?}"),
    }

    // Expiry is checked before audience
    let token = mint(
        Claims::new()
            .with_issuer("eyevinn")
            .with_audience("wrong")
            .with_expiration(now - 10),
    );
    let options = CatValidationOptions::new("eyevinn").audience(vec!["right"]);
    match validate(&token, &options).error {
        Some(crate::Error::TokenExpired) => {}
        other => panic!("Expected TokenExpired, got {other:?}"),
    }

    let token = mint(Claims::new().with_issuer("eyevinn").with_audience("wrong"));
    match validate(&token, &options).error {
        Some(crate::Error::InvalidAudience(aud)) => assert_eq!(aud, vec!["wrong".to_string()]),
        other => panic!("Expected InvalidAudience, got {other:?}"),
    }

    let token = mint(Claims::new().with_issuer("eyevinn").with_not_before(now + 600));
    match validate(&token, &CatValidationOptions::new("eyevinn")).error {
        Some(crate::Error::TokenNotActive) => {}
        other => panic!("Expected TokenNotActive, got {other:?}"),
    }
}

#[test]
fn test_audience_array() {
    let claims = json_claims(json!({ "iss": "eyevinn", "aud": ["a", "b"] }));
    let token = mint(claims);
    let result = validate(
        &token,
        &CatValidationOptions::new("eyevinn").audience(vec!["b"]),
    );
    assert!(result.error.is_none());
}

#[test]
fn test_catu_example() {
    let claims = json_claims(json!({
        "iss": "eyevinn",
        "catu": {
            "scheme": { "exact-match": "https" },
            "path": { "prefix-match": "/content" },
            "extension": { "exact-match": ".m3u8" },
        },
    }));
    let token = mint(claims);

    let allowed = Url::parse("https://example.com/content/path/file.m3u8").expect("valid url");
    let result = validate(&token, &CatValidationOptions::new("eyevinn").url(allowed));
    assert!(result.error.is_none(), "unexpected error: {:?}", result.error);

    let wrong_scheme = Url::parse("http://example.com/content/path/file.m3u8").expect("valid url");
    match validate(&token, &CatValidationOptions::new("eyevinn").url(wrong_scheme)).error {
        Some(crate::Error::UriNotAllowed(_)) => {}
        other => panic!("Expected UriNotAllowed, got {other:?}"),
    }

    match validate(&token, &CatValidationOptions::new("eyevinn")).error {
        Some(crate::Error::UriNotAllowed(_)) => {}
        other => panic!("Expected UriNotAllowed without url, got {other:?}"),
    }
}

#[test]
fn test_catu_uri_parts() {
    let url = Url::parse("https://example.com:8443/a/b/file.tar.gz?x=1&cat=abc&y=2")
        .expect("valid url");
    assert_eq!(UriPart::Scheme.extract(&url), "https");
    assert_eq!(UriPart::Host.extract(&url), "example.com");
    assert_eq!(UriPart::Port.extract(&url), "8443");
    assert_eq!(UriPart::Path.extract(&url), "/a/b/file.tar.gz");
    assert_eq!(UriPart::Query.extract(&url), "x=1&y=2");
    assert_eq!(UriPart::ParentPath.extract(&url), "/a/b");
    assert_eq!(UriPart::Filename.extract(&url), "file.tar.gz");
    assert_eq!(UriPart::Stem.extract(&url), "file");
    assert_eq!(UriPart::Extension.extract(&url), ".tar.gz");

    let default_port = Url::parse("https://example.com/").expect("valid url");
    assert_eq!(UriPart::Port.extract(&default_port), "");
}

#[test]
fn test_catu_wire_form() {
    let catu = CommonAccessTokenUri::new()
        .with_part(UriPart::Host, MatchCondition::suffix(".example.com"))
        .with_part(UriPart::Path, MatchCondition::regex("^/live/[a-z]+$", Some("i")));
    let decoded = CommonAccessTokenUri::from_map(&catu.payload()).expect("Failed to decode catu");
    assert_eq!(decoded, catu);

    let url = Url::parse("https://cdn.example.com/LIVE/news").expect("valid url");
    assert!(decoded.match_uri(&url).expect("Failed to match"));
}

#[test]
fn test_match_engine() {
    assert!(MatchCondition::exact("abc").evaluate("abc").unwrap());
    assert!(!MatchCondition::exact("abc").evaluate("abcd").unwrap());
    assert!(MatchCondition::prefix("/a").evaluate("/a/b").unwrap());
    assert!(MatchCondition::suffix(".ts").evaluate("seg1.ts").unwrap());
    assert!(MatchCondition::contains("mid").evaluate("a-mid-b").unwrap());
    assert!(MatchCondition::regex("^A", Some("i")).evaluate("abc").unwrap());
    assert!(!MatchCondition::regex("^A", None).evaluate("abc").unwrap());

    // sha256("abc")
    let digest = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
    let sha = MatchCondition::new(MatchKind::Sha256, MatchValue::Text(digest.to_string()));
    assert!(sha.evaluate("abc").unwrap());
    assert!(!sha.evaluate("abd").unwrap());

    let bad = MatchCondition::new(MatchKind::Exact, MatchValue::Array(vec!["x".into()]));
    match bad.evaluate("x") {
        Err(crate::Error::MatchType(message)) => {
            assert_eq!(message, "Exact match cannot be an array")
        }
        other => panic!("Expected MatchType, got {other:?}"),
    }
    let bad_regex = MatchCondition::new(MatchKind::Regex, MatchValue::Text("x".into()));
    assert!(matches!(
        bad_regex.evaluate("x"),
        Err(crate::Error::MatchType(_))
    ));
}

#[test]
fn test_catnip_example() {
    let claims = json_claims(json!({
        "iss": "eyevinn",
        "catnip": ["192.168.1.0/24", 64512, "not-an-address"],
    }));
    let catnip = claims
        .catnip()
        .expect("catnip present")
        .expect("Failed to decode catnip");
    assert_eq!(catnip.entries().len(), 2);
    assert_eq!(catnip.to_list(), vec![json!("192.168.1.0/24"), json!(64512)]);

    let token = mint(claims);
    let result = validate(
        &token,
        &CatValidationOptions::new("eyevinn")
            .ip("192.168.1.55")
            .asn(64512),
    );
    assert!(result.error.is_none(), "unexpected error: {:?}", result.error);

    match validate(&token, &CatValidationOptions::new("eyevinn").ip("10.0.0.1")).error {
        Some(crate::Error::IpNotAllowed(ip)) => assert_eq!(ip, "10.0.0.1"),
        other => panic!("Expected IpNotAllowed, got {other:?}"),
    }

    match validate(
        &token,
        &CatValidationOptions::new("eyevinn")
            .ip("192.168.1.55")
            .asn(1),
    )
    .error
    {
        Some(crate::Error::AsnNotAllowed(1)) => {}
        other => panic!("Expected AsnNotAllowed, got {other:?}"),
    }
}

#[test]
fn test_catnip_ipv6() {
    let catnip = CommonAccessTokenNetworkIp::from_strs(&["2001:db8::/32", "::1"]);
    assert!(catnip.ip_match("2001:db8:0:0:0:0:0:1"));
    assert!(catnip.ip_match("::1"));
    assert!(!catnip.ip_match("192.168.1.1"));
    assert!(!catnip.ip_match("garbage"));

    let decoded =
        CommonAccessTokenNetworkIp::from_array(&catnip.payload()).expect("Failed to decode");
    assert_eq!(decoded.to_list(), vec![json!("2001:db8::/32"), json!("::1")]);
}

#[test]
fn test_claims_dictionary_roundtrip() {
    let dict = json!({
        "iss": "eyevinn",
        "exp": 1_900_000_000,
        "cti": "0b71",
        "catm": ["GET"],
        "catreplay": 1,
        "catr": { "type": "header", "expadd": 120, "deadline": 60, "header-name": "x-cat" },
        "cath": { "X-Client": { "exact-match": "player" } },
        "catu": { "host": { "suffix-match": ".example.com" } },
        "catnip": ["10.0.0.0/8"],
    });
    let claims = json_claims(dict.clone());

    assert_eq!(claims.get(cwt_keys::CTI), Some(&CborValue::Bytes(vec![0x0b, 0x71])));
    assert_eq!(claims.catreplay(), Some(1));

    let back = claims.to_json().expect("Failed to convert claims");
    assert_eq!(serde_json::Value::Object(back), dict);
}

#[test]
fn test_claims_numeric_label_passthrough() {
    let claims = json_claims(json!({ "900": "custom" }));
    assert_eq!(claims.get(900), Some(&CborValue::Text("custom".to_string())));
    let back = claims.to_json().expect("Failed to convert claims");
    assert_eq!(back["900"], "custom");
}

#[test]
fn test_claims_unknown_and_invalid() {
    match Claims::from_json(json!({ "nope": 1 }).as_object().unwrap()) {
        Err(crate::Error::UnknownClaim(name)) => assert_eq!(name, "nope"),
        other => panic!("Expected UnknownClaim, got {other:?}"),
    }

    match CommonAccessToken::from_json(json!({ "iss": 5 }).as_object().unwrap()) {
        Err(crate::Error::InvalidClaimType { claim, actual }) => {
            assert_eq!(claim, "iss");
            assert_eq!(actual, "number");
        }
        other => panic!("Expected InvalidClaimType, got {other:?}"),
    }
}

#[test]
fn test_renewal_window() {
    let now = current_timestamp();
    let catr = CommonAccessTokenRenewal::automatic(120, Some(60));

    let near_expiry = CommonAccessToken::new(
        Claims::new()
            .with_expiration(now + 30)
            .with_catr(&catr),
    )
    .expect("Failed to build token");
    assert!(near_expiry.should_renew_at(now));
    assert!(!near_expiry.should_renew_at(now + 30));

    let fresh = CommonAccessToken::new(
        Claims::new()
            .with_expiration(now + 600)
            .with_catr(&catr),
    )
    .expect("Failed to build token");
    assert!(!fresh.should_renew_at(now));

    let without_catr = CommonAccessToken::new(Claims::new().with_expiration(now + 30))
        .expect("Failed to build token");
    assert!(!without_catr.should_renew_at(now));
}

#[test]
fn test_renewal_window_deadlines() {
    let now = current_timestamp();
    let window = |exp: i64, deadline: Option<i64>| {
        CommonAccessToken::new(
            Claims::new()
                .with_expiration(exp)
                .with_catr(&CommonAccessTokenRenewal::automatic(120, deadline)),
        )
        .expect("Failed to build token")
        .should_renew_at(now)
    };

    // Default deadline of 60 seconds
    assert!(window(now + 30, None));
    assert!(!window(now + 100, None));

    assert!(window(now + 100, Some(105)));
    assert!(!window(now + 100, Some(99)));

    // Out of range deadlines never open the window
    assert!(!window(now + 100, Some(i64::MIN)));
}

#[test]
fn test_renew_token_expadd_overflow() {
    let token = CommonAccessToken::new(
        Claims::new()
            .with_issuer("eyevinn")
            .with_catr(&CommonAccessTokenRenewal::automatic(i64::MAX, None)),
    )
    .expect("Failed to build token");
    match test_cat().renew_token(&token, &CatRenewOptions::new("eyevinn", "k1")) {
        Err(crate::Error::RenewalClaim(_)) => {}
        other => panic!("Expected RenewalClaim, got {other:?}"),
    }
}

#[test]
fn test_renew_token() {
    let now = current_timestamp();
    let cat = test_cat();
    let original = cat
        .generate(
            Claims::new()
                .with_issuer("eyevinn")
                .with_subject("jonas")
                .with_expiration(now + 30)
                .with_catr(&CommonAccessTokenRenewal::header(120, Some(60), None, None)),
            &CatGenerateOptions::new("k1").generate_cwt_id(true),
        )
        .expect("Failed to generate token");
    let original = cat
        .validate(&original, TokenType::Mac, &CatValidationOptions::new("eyevinn"))
        .expect("Failed to validate token")
        .cat;

    let renewed = cat
        .renew_token(&original, &CatRenewOptions::new("renewer", "k1"))
        .expect("Failed to renew token");
    let renewed = cat
        .validate(&renewed, TokenType::Mac, &CatValidationOptions::new("renewer"))
        .expect("Failed to validate renewed token");
    assert!(renewed.error.is_none());

    let claims = renewed.cat.claims();
    assert_eq!(claims.subject(), Some("jonas"));
    assert_ne!(renewed.cat.cti(), original.cti());
    let iat = claims.issued_at().expect("iat present");
    assert_eq!(claims.expiration(), Some(iat + 120));
}

#[test]
fn test_renew_requires_catr() {
    let token = CommonAccessToken::new(Claims::new().with_issuer("eyevinn"))
        .expect("Failed to build token");
    match test_cat().renew_token(&token, &CatRenewOptions::new("eyevinn", "k1")) {
        Err(crate::Error::RenewalClaim(_)) => {}
        other => panic!("Expected RenewalClaim, got {other:?}"),
    }
}

#[test]
fn test_invalid_catr_rejected() {
    let incomplete = CommonAccessTokenRenewal {
        expadd: Some(60),
        ..Default::default()
    };
    let token = mint(Claims::new().with_issuer("eyevinn").with_catr(&incomplete));
    match validate(&token, &CatValidationOptions::new("eyevinn")).error {
        Some(crate::Error::RenewalClaim(_)) => {}
        other => panic!("Expected RenewalClaim, got {other:?}"),
    }
}

#[test]
fn test_es256_sign_and_verify() {
    let signing = SigningKey::new(
        "es",
        crate::utils::hex_decode(ES256_D).expect("Failed to decode d"),
    );
    let verifier = VerifierKey::new(
        "es",
        crate::utils::hex_decode(ES256_X).expect("Failed to decode x"),
        crate::utils::hex_decode(ES256_Y).expect("Failed to decode y"),
    );
    let cat = Cat::new(
        CatOptions::new()
            .signing_key(signing)
            .verifier_key(verifier),
    );

    let token = cat
        .generate(
            Claims::new().with_issuer("eyevinn").with_subject("signed"),
            &CatGenerateOptions::new("es").token_type(TokenType::Sign),
        )
        .expect("Failed to sign token");
    let result = cat
        .validate(&token, TokenType::Sign, &CatValidationOptions::new("eyevinn"))
        .expect("Failed to verify token");
    assert!(result.error.is_none());
    assert_eq!(result.cat.claims().subject(), Some("signed"));
    assert_eq!(result.cat.kid(), Some("es"));

    // A signed token is not a MAC token
    assert!(cat
        .validate(&token, TokenType::Mac, &CatValidationOptions::new("eyevinn"))
        .is_err());
}

#[test]
fn test_unsealed_token_has_no_base64() {
    let token =
        CommonAccessToken::new(Claims::new().with_issuer("eyevinn")).expect("Failed to build");
    assert!(token.raw().is_none());
    assert!(matches!(token.base64(), Err(crate::Error::InvalidFormat(_))));

    let mut token = token;
    token
        .mac(
            &MacKey::new("k1", TEST_KEY.to_vec()),
            Algorithm::HmacSha256,
            SealOptions::new().no_cwt_tag(),
        )
        .expect("Failed to seal");
    assert!(token.base64().is_ok());
}

#[test]
fn test_malformed_token() {
    match test_cat().validate("%%%", TokenType::Mac, &CatValidationOptions::new("eyevinn")) {
        Err(crate::Error::InvalidFormat(_)) => {}
        other => panic!("Expected InvalidFormat, got {other:?}"),
    }
    assert!(test_cat()
        .validate("AAAA", TokenType::Mac, &CatValidationOptions::new("eyevinn"))
        .is_err());
}

#[test]
fn test_deeply_nested_token_rejected() {
    let mut bytes = vec![0xd8, 0x3d, 0xd1, 0x84, 0x40];
    bytes.extend(std::iter::repeat(0x81).take(8000));
    bytes.push(0x00);
    let token = crate::utils::base64_encode(&bytes).expect("Failed to encode token");

    match test_cat().validate(&token, TokenType::Mac, &CatValidationOptions::new("eyevinn")) {
        Err(crate::Error::InvalidFormat(_)) => {}
        other => panic!("Expected InvalidFormat, got {other:?}"),
    }
}

/// Replace the first occurrence of `from` in the decoded token with `to`
fn rewrite_token(token: &str, from: &[u8], to: &[u8]) -> String {
    let mut bytes = crate::utils::base64_decode(token).expect("Failed to decode token");
    let at = bytes
        .windows(from.len())
        .position(|window| window == from)
        .expect("pattern present in token");
    bytes.splice(at..at + from.len(), to.iter().copied());
    crate::utils::base64_encode(&bytes).expect("Failed to encode token")
}

const UNPROTECTED_KID_K1: &[u8] = &[0xa1, 0x04, 0x42, b'k', b'1'];

#[test]
fn test_kid_comes_from_verifying_key() {
    let token = mint(Claims::new().with_issuer("eyevinn"));

    let stripped = rewrite_token(&token, UNPROTECTED_KID_K1, &[0xa0]);
    let result = validate(&stripped, &CatValidationOptions::new("eyevinn"));
    assert!(result.error.is_none());
    assert_eq!(result.cat.kid(), Some("k1"));

    let swapped = rewrite_token(&token, UNPROTECTED_KID_K1, &[0xa1, 0x04, 0x42, b'k', b'2']);
    let cat = Cat::new(
        CatOptions::new()
            .key(MacKey::new("k2", b"another-key-for-hmac-sha256".to_vec()))
            .key(MacKey::new("k1", TEST_KEY.to_vec())),
    );
    let result = cat
        .validate(&swapped, TokenType::Mac, &CatValidationOptions::new("eyevinn"))
        .expect("Failed to validate token");
    assert!(result.error.is_none());
    assert_eq!(result.cat.kid(), Some("k1"));
}

#[test]
fn test_cath_matching() {
    let cath = CommonAccessTokenHeader::new()
        .with_header("X-Client", MatchCondition::prefix("player/"));
    let mut headers = http::HeaderMap::new();
    assert!(!cath.match_headers(&headers).unwrap());
    headers.insert("x-client", "player/1.0".parse().unwrap());
    assert!(cath.match_headers(&headers).unwrap());
    headers.insert("x-client", "curl/8".parse().unwrap());
    assert!(!cath.match_headers(&headers).unwrap());
}

// HTTP validator

fn http_options() -> HttpValidatorOptions {
    HttpValidatorOptions::new("eyevinn").key(MacKey::new("k1", TEST_KEY.to_vec()))
}

fn header_request(uri: &str, token: &str) -> Request<()> {
    Request::builder()
        .uri(uri)
        .header("CTA-Common-Access-Token", token)
        .body(())
        .expect("Failed to build request")
}

fn fresh_claims() -> Claims {
    Claims::new()
        .with_issuer("eyevinn")
        .with_expiration(current_timestamp() + 600)
}

#[tokio::test]
async fn test_http_missing_token() {
    let request = Request::builder()
        .uri("https://example.com/")
        .body(())
        .expect("Failed to build request");

    let response = HttpValidator::new(http_options())
        .validate_http_request(&request)
        .await;
    assert_eq!(response.status, 401);
    assert_eq!(response.message.as_deref(), Some("No CTA token could be found"));

    let response = HttpValidator::new(http_options().token_mandatory(false))
        .validate_http_request(&request)
        .await;
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_http_valid_header_token() {
    let token = mint(fresh_claims().with_subject("viewer"));
    let response = HttpValidator::new(http_options())
        .validate_http_request(&header_request("https://example.com/", &token))
        .await;
    assert_eq!(response.status, 200);
    let claims = response.claims.expect("claims returned");
    assert_eq!(claims["sub"], "viewer");
    assert!(response.headers.is_empty());
}

#[tokio::test]
async fn test_http_rejects_bad_token() {
    let other = Cat::new(CatOptions::new().key(MacKey::new("k1", b"other-key".to_vec())));
    let token = other
        .generate(fresh_claims(), &CatGenerateOptions::new("k1"))
        .expect("Failed to generate token");
    let response = HttpValidator::new(http_options())
        .validate_http_request(&header_request("https://example.com/", &token))
        .await;
    assert_eq!(response.status, 401);
    assert_eq!(
        response.message.as_deref(),
        Some("Failed to validate token signature with any of the available keys")
    );
}

#[tokio::test]
async fn test_http_token_from_relative_uri_and_query() {
    let claims = json_claims(json!({
        "iss": "eyevinn",
        "catu": { "host": { "exact-match": "example.com" }, "path": { "exact-match": "/live" } },
    }));
    let token = mint(claims);
    let request = Request::builder()
        .uri(format!("/live?cat={token}"))
        .header("host", "example.com")
        .body(())
        .expect("Failed to build request");

    let response = HttpValidator::new(http_options())
        .validate_http_request(&request)
        .await;
    assert_eq!(response.status, 200, "{:?}", response.message);
}

#[tokio::test]
async fn test_http_catnip_uses_client_ip() {
    let claims = json_claims(json!({ "iss": "eyevinn", "catnip": ["192.168.1.0/24"] }));
    let token = mint(claims);
    let validator = HttpValidator::new(http_options());

    let mut request = header_request("https://example.com/", &token);
    request
        .extensions_mut()
        .insert("192.168.1.20".parse::<IpAddr>().unwrap());
    assert_eq!(validator.validate_http_request(&request).await.status, 200);

    let mut request = header_request("https://example.com/", &token);
    request
        .extensions_mut()
        .insert("10.1.1.1".parse::<IpAddr>().unwrap());
    let response = validator.validate_http_request(&request).await;
    assert_eq!(response.status, 401);
    assert_eq!(response.message.as_deref(), Some("IP not allowed: 10.1.1.1"));
}

#[tokio::test]
async fn test_http_replay_prohibited() {
    let store = Arc::new(MemoryCtiStore::new());
    let validator = HttpValidator::new(http_options().store(store.clone()));
    let token = mint(fresh_claims().with_claim(cat_keys::CATREPLAY, catreplay::prohibited()));
    let request = header_request("https://example.com/", &token);

    let first = validator.validate_http_request(&request).await;
    assert_eq!(first.status, 200);
    assert_eq!(first.count, Some(1));

    let second = validator.validate_http_request(&request).await;
    assert_eq!(second.status, 401);
    assert_eq!(second.message.as_deref(), Some("Replay not allowed: 2"));
}

#[tokio::test]
async fn test_http_replay_permitted() {
    let store = Arc::new(MemoryCtiStore::new());
    let validator = HttpValidator::new(http_options().store(store.clone()));
    let token = mint(fresh_claims().with_claim(cat_keys::CATREPLAY, catreplay::permitted()));
    let request = header_request("https://example.com/", &token);

    assert_eq!(validator.validate_http_request(&request).await.count, Some(1));
    let second = validator.validate_http_request(&request).await;
    assert_eq!(second.status, 200);
    assert_eq!(second.count, Some(2));

    let cat = test_cat()
        .validate(&token, TokenType::Mac, &CatValidationOptions::new("eyevinn"))
        .expect("Failed to validate token")
        .cat;
    assert_eq!(store.get_token_count(&cat).await.expect("count"), 2);
}

struct AlwaysReused;

#[async_trait::async_trait]
impl ReuseDetector for AlwaysReused {
    async fn is_reused(
        &self,
        _token: &CommonAccessToken,
        _store: Option<&dyn CtiStore>,
        _logger: Option<&dyn TokenLogger>,
    ) -> bool {
        true
    }
}

#[tokio::test]
async fn test_http_reuse_detection() {
    let token = mint(fresh_claims().with_claim(cat_keys::CATREPLAY, catreplay::reuse_detection()));
    let request = header_request("https://example.com/", &token);

    let response = HttpValidator::new(http_options().reuse_detector(Arc::new(AlwaysReused)))
        .validate_http_request(&request)
        .await;
    assert_eq!(response.status, 401);
    assert_eq!(response.message.as_deref(), Some("Invalid reuse detected"));

    let response = HttpValidator::new(http_options())
        .validate_http_request(&request)
        .await;
    assert_eq!(response.status, 200);
}

#[derive(Default)]
struct CountingLogger {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl TokenLogger for CountingLogger {
    async fn log_token(&self, _token: &CommonAccessToken) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_http_logger_called() {
    let logger = Arc::new(CountingLogger::default());
    let validator = HttpValidator::new(http_options().logger(logger.clone()));
    let token = mint(fresh_claims());

    validator
        .validate_http_request(&header_request("https://example.com/", &token))
        .await;
    validator
        .validate_http_request(&header_request("https://example.com/", &token))
        .await;
    assert_eq!(logger.calls.load(Ordering::SeqCst), 2);
}

struct BrokenStore;

#[async_trait::async_trait]
impl CtiStore for BrokenStore {
    async fn store_token(&self, _token: &CommonAccessToken) -> Result<u64, crate::Error> {
        Err(crate::Error::Store("unavailable".to_string()))
    }

    async fn get_token_count(&self, _token: &CommonAccessToken) -> Result<u64, crate::Error> {
        Err(crate::Error::Store("unavailable".to_string()))
    }
}

#[tokio::test]
async fn test_http_store_failure_is_internal_error() {
    let token = mint(fresh_claims());
    let response = HttpValidator::new(http_options().store(Arc::new(BrokenStore)))
        .validate_http_request(&header_request("https://example.com/", &token))
        .await;
    assert_eq!(response.status, 500);
}

#[tokio::test]
async fn test_http_method_lock() {
    let token = mint(fresh_claims().with_claim(cat_keys::CATM, catm::create(vec!["GET"])));
    let validator = HttpValidator::new(http_options());

    let get = header_request("https://example.com/", &token);
    assert_eq!(validator.validate_http_request(&get).await.status, 200);

    let post = Request::builder()
        .method("POST")
        .uri("https://example.com/")
        .header("CTA-Common-Access-Token", &token)
        .body(())
        .expect("Failed to build request");
    let response = validator.validate_http_request(&post).await;
    assert_eq!(response.status, 401);
    assert_eq!(response.message.as_deref(), Some("Method not allowed: POST"));
}

#[tokio::test]
async fn test_http_header_lock() {
    let cath = CommonAccessTokenHeader::new()
        .with_header("X-Client", MatchCondition::exact("player"));
    let token = mint(fresh_claims().with_cath(&cath));
    let validator = HttpValidator::new(http_options());

    let response = validator
        .validate_http_request(&header_request("https://example.com/", &token))
        .await;
    assert_eq!(response.status, 401);

    let request = Request::builder()
        .uri("https://example.com/")
        .header("CTA-Common-Access-Token", &token)
        .header("X-Client", "player")
        .body(())
        .expect("Failed to build request");
    assert_eq!(validator.validate_http_request(&request).await.status, 200);
}

#[tokio::test]
async fn test_http_header_renewal() {
    let now = current_timestamp();
    let token = mint(
        Claims::new()
            .with_issuer("eyevinn")
            .with_expiration(now + 30)
            .with_catr(&CommonAccessTokenRenewal::header(
                120,
                Some(60),
                None,
                Some(vec!["max-age=120"]),
            )),
    );

    let response = HttpValidator::new(http_options())
        .validate_http_request(&header_request("https://example.com/", &token))
        .await;
    assert_eq!(response.status, 200);

    let value = response
        .headers
        .get("cta-common-access-token")
        .expect("renewed token header")
        .to_str()
        .expect("ascii header");
    let (renewed, params) = value.split_once("; ").expect("header params");
    assert_eq!(params, "max-age=120");
    assert_ne!(renewed, token);

    let result = test_cat()
        .validate(renewed, TokenType::Mac, &CatValidationOptions::new("eyevinn"))
        .expect("Failed to validate renewed token");
    assert!(result.error.is_none());
    let claims = result.cat.claims();
    let iat = claims.issued_at().expect("iat present");
    assert!(iat >= now);
    assert_eq!(claims.expiration(), Some(iat + 120));

    let original = validate(&token, &CatValidationOptions::new("eyevinn"));
    assert!(original.cat.cti().is_some());
    assert_ne!(result.cat.cti(), original.cat.cti());
}

#[tokio::test]
async fn test_http_renewal_without_header_kid() {
    let token = mint(
        Claims::new()
            .with_issuer("eyevinn")
            .with_expiration(current_timestamp() + 30)
            .with_catr(&CommonAccessTokenRenewal::header(120, Some(60), None, None)),
    );
    let stripped = rewrite_token(&token, UNPROTECTED_KID_K1, &[0xa0]);

    let response = HttpValidator::new(http_options())
        .validate_http_request(&header_request("https://example.com/", &stripped))
        .await;
    assert_eq!(response.status, 200);

    let renewed = response
        .headers
        .get("cta-common-access-token")
        .expect("renewed token header")
        .to_str()
        .expect("ascii header");
    let result = test_cat()
        .validate(renewed, TokenType::Mac, &CatValidationOptions::new("eyevinn"))
        .expect("Failed to validate renewed token");
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_http_verifier_key_keeps_mac_tokens() {
    let verifier = VerifierKey::new(
        "es",
        crate::utils::hex_decode(ES256_X).expect("Failed to decode x"),
        crate::utils::hex_decode(ES256_Y).expect("Failed to decode y"),
    );
    let options = http_options().verifier_key(verifier);
    assert_eq!(options.token_type, TokenType::Mac);

    let token = mint(fresh_claims());
    let response = HttpValidator::new(options)
        .validate_http_request(&header_request("https://example.com/", &token))
        .await;
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_http_signed_tokens() {
    let signing = SigningKey::new(
        "es",
        crate::utils::hex_decode(ES256_D).expect("Failed to decode d"),
    );
    let verifier = VerifierKey::new(
        "es",
        crate::utils::hex_decode(ES256_X).expect("Failed to decode x"),
        crate::utils::hex_decode(ES256_Y).expect("Failed to decode y"),
    );
    let token = Cat::new(CatOptions::new().signing_key(signing))
        .generate(
            fresh_claims(),
            &CatGenerateOptions::new("es").token_type(TokenType::Sign),
        )
        .expect("Failed to sign token");

    let options = HttpValidatorOptions::new("eyevinn")
        .verifier_key(verifier)
        .token_type(TokenType::Sign);
    let response = HttpValidator::new(options)
        .validate_http_request(&header_request("https://example.com/", &token))
        .await;
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_http_cookie_renewal() {
    let token = mint(
        Claims::new()
            .with_issuer("eyevinn")
            .with_expiration(current_timestamp() + 30)
            .with_catr(&CommonAccessTokenRenewal::automatic(120, Some(60))),
    );
    let request = Request::builder()
        .uri("https://example.com/")
        .header("cookie", format!("session=abc; CTA-Common-Access-Token={token}"))
        .body(())
        .expect("Failed to build request");

    let response = HttpValidator::new(http_options())
        .validate_http_request(&request)
        .await;
    assert_eq!(response.status, 200);
    let cookie = response
        .headers
        .get("set-cookie")
        .expect("renewed cookie")
        .to_str()
        .expect("ascii header");
    assert!(cookie.starts_with("CTA-Common-Access-Token="));
}

#[tokio::test]
async fn test_http_redirect_renewal() {
    let token = mint(
        Claims::new()
            .with_issuer("eyevinn")
            .with_expiration(current_timestamp() + 30)
            .with_catr(&CommonAccessTokenRenewal::automatic(120, Some(60))),
    );
    let request = Request::builder()
        .uri(format!("https://example.com/video.m3u8?x=1&cat={token}"))
        .body(())
        .expect("Failed to build request");

    let response = HttpValidator::new(http_options())
        .validate_http_request(&request)
        .await;
    assert_eq!(response.status, 302);
    let location = Url::parse(
        response
            .headers
            .get("location")
            .expect("redirect location")
            .to_str()
            .expect("ascii header"),
    )
    .expect("valid location");
    assert_eq!(location.path(), "/video.m3u8");
    let pairs: Vec<(String, String)> = location.query_pairs().into_owned().collect();
    assert_eq!(pairs[0], ("x".to_string(), "1".to_string()));
    assert_eq!(pairs[1].0, "cat");
    assert_ne!(pairs[1].1, token);
}

#[tokio::test]
async fn test_http_no_renewal_when_disabled() {
    let token = mint(
        Claims::new()
            .with_issuer("eyevinn")
            .with_expiration(current_timestamp() + 30)
            .with_catr(&CommonAccessTokenRenewal::header(120, Some(60), None, None)),
    );
    let response = HttpValidator::new(http_options().auto_renew_enabled(false))
        .validate_http_request(&header_request("https://example.com/", &token))
        .await;
    assert_eq!(response.status, 200);
    assert!(response.headers.is_empty());
}

#[tokio::test]
async fn test_http_conditional_response_on_expiry() {
    let claims = json_claims(json!({
        "iss": "eyevinn",
        "sub": "viewer",
        "exp": current_timestamp() - 10,
        "catif": {
            "exp": [307, {
                "Location": ["https://auth.example.com/renew?cat=", {
                    "iss": null,
                    "sub": null,
                    "iat": null,
                    "exp": 1_900_000_000,
                }],
                "Cache-Control": "no-store",
            }],
        },
    }));
    let token = mint(claims);

    let response = HttpValidator::new(http_options())
        .validate_http_request(&header_request("https://example.com/", &token))
        .await;
    assert_eq!(response.status, 307);
    assert_eq!(
        response.headers.get("cache-control").map(|v| v.as_bytes()),
        Some(&b"no-store"[..])
    );

    let location = response
        .headers
        .get("location")
        .expect("conditional location")
        .to_str()
        .expect("ascii header");
    let minted = location
        .strip_prefix("https://auth.example.com/renew?cat=")
        .expect("url prefix");

    let result = test_cat()
        .validate(minted, TokenType::Mac, &CatValidationOptions::new("eyevinn"))
        .expect("Failed to validate minted token");
    assert!(result.error.is_none());
    let claims = result.cat.claims();
    assert_eq!(claims.subject(), Some("viewer"));
    assert_eq!(claims.expiration(), Some(1_900_000_000));
    assert!(claims.issued_at().is_some());
    assert!(claims.cti().is_some());
}

#[tokio::test]
async fn test_http_expired_without_catif() {
    let token = mint(
        Claims::new()
            .with_issuer("eyevinn")
            .with_expiration(current_timestamp() - 10),
    );
    let response = HttpValidator::new(http_options())
        .validate_http_request(&header_request("https://example.com/", &token))
        .await;
    assert_eq!(response.status, 401);
    assert_eq!(response.message.as_deref(), Some("Token has expired"));
}

#[tokio::test]
async fn test_memory_store_counts() {
    let store = MemoryCtiStore::new();
    let token = CommonAccessToken::new(Claims::new().with_cti(vec![1, 2, 3]))
        .expect("Failed to build token");
    assert_eq!(store.get_token_count(&token).await.unwrap(), 0);
    assert_eq!(store.store_token(&token).await.unwrap(), 1);
    assert_eq!(store.store_token(&token).await.unwrap(), 2);
    assert_eq!(store.get_token_count(&token).await.unwrap(), 2);

    let anonymous = CommonAccessToken::new(Claims::new()).expect("Failed to build token");
    assert_eq!(store.store_token(&anonymous).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_store_concurrent_counts() {
    const TASKS: u64 = 64;
    let store = Arc::new(MemoryCtiStore::new());
    let token = CommonAccessToken::new(Claims::new().with_cti(vec![9, 9, 9]))
        .expect("Failed to build token");

    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let store = Arc::clone(&store);
            let token = token.clone();
            tokio::spawn(async move { store.store_token(&token).await })
        })
        .collect();

    let mut counts = Vec::new();
    for handle in handles {
        counts.push(
            handle
                .await
                .expect("Failed to join task")
                .expect("Failed to store token"),
        );
    }
    counts.sort_unstable();
    assert_eq!(counts, (1..=TASKS).collect::<Vec<_>>());
    assert_eq!(store.get_token_count(&token).await.unwrap(), TASKS);
}
