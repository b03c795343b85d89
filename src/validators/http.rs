//! HTTP request validation.
//!
//! Locates the token in a request (header, then cookie, then query
//! parameter), validates it and applies the replay policy, the method lock,
//! auto-renewal and, for expired tokens, the CATIF conditional response.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use http::header::{HeaderName, HeaderValue, COOKIE, HOST, LOCATION, SET_COOKIE};
use http::{HeaderMap, Request};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};
use url::Url;

use crate::cat::{Cat, CatOptions, CatRenewOptions, TokenType};
use crate::cat_claims::{catm, CommonAccessTokenIf, HeaderDirective, RenewalType};
use crate::claims::Claims;
use crate::constants::{cat_keys, cwt_keys, http_defaults, replay_values};
use crate::error::Error;
use crate::header::{Algorithm, CborValue};
use crate::keys::{MacKey, SigningKey, VerifierKey};
use crate::loggers::TokenLogger;
use crate::stores::CtiStore;
use crate::token::{CatValidationOptions, CommonAccessToken, SealOptions};
use crate::utils::current_timestamp;

/// Where the token was found in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// Request header
    Header,
    /// Cookie
    Cookie,
    /// Query parameter
    Query,
}

/// Client ASN, read from request extensions when present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAsn(pub u64);

/// Decides whether a token is being reused, for `catreplay = 2`.
/// Returning `true` rejects the request.
#[async_trait::async_trait]
pub trait ReuseDetector: Send + Sync {
    /// Inspect a validated token
    async fn is_reused(
        &self,
        token: &CommonAccessToken,
        store: Option<&dyn CtiStore>,
        logger: Option<&dyn TokenLogger>,
    ) -> bool;
}

/// Configuration for [`HttpValidator`]
#[derive(Clone)]
pub struct HttpValidatorOptions {
    /// MAC keys, tried in order
    pub keys: Vec<MacKey>,
    /// ES256 verifier keys, tried in order
    pub verifier_keys: Vec<VerifierKey>,
    /// ES256 signing keys for renewed and conditional tokens
    pub signing_keys: Vec<SigningKey>,
    /// Envelope type of accepted tokens
    pub token_type: TokenType,
    /// Expected issuer; also the issuer of renewed tokens
    pub issuer: String,
    /// Accepted audiences
    pub audience: Option<Vec<String>>,
    /// Reject requests without a token
    pub token_mandatory: bool,
    /// Renew tokens inside their renewal window
    pub auto_renew_enabled: bool,
    /// Algorithm for renewed and conditional tokens
    pub alg: Algorithm,
    /// Key for renewed tokens; defaults to the key that validated the token
    pub renew_kid: Option<String>,
    /// Token header name
    pub header_name: String,
    /// Token cookie name
    pub cookie_name: String,
    /// Token query parameter
    pub query_param: String,
    /// Reject tokens without the CWT tag
    pub expect_cwt_tag: bool,
    /// Usage counter
    pub store: Option<Arc<dyn CtiStore>>,
    /// Usage logger
    pub logger: Option<Arc<dyn TokenLogger>>,
    /// Reuse detection for `catreplay = 2`
    pub reuse_detector: Option<Arc<dyn ReuseDetector>>,
}

impl std::fmt::Debug for HttpValidatorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpValidatorOptions")
            .field("keys", &self.keys)
            .field("verifier_keys", &self.verifier_keys)
            .field("signing_keys", &self.signing_keys)
            .field("token_type", &self.token_type)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("token_mandatory", &self.token_mandatory)
            .field("auto_renew_enabled", &self.auto_renew_enabled)
            .field("alg", &self.alg)
            .field("header_name", &self.header_name)
            .field("cookie_name", &self.cookie_name)
            .field("query_param", &self.query_param)
            .field("store", &self.store.is_some())
            .field("logger", &self.logger.is_some())
            .field("reuse_detector", &self.reuse_detector.is_some())
            .finish()
    }
}

impl HttpValidatorOptions {
    /// Options for an issuer with the default conventions
    pub fn new<S: Into<String>>(issuer: S) -> Self {
        Self {
            keys: Vec::new(),
            verifier_keys: Vec::new(),
            signing_keys: Vec::new(),
            token_type: TokenType::Mac,
            issuer: issuer.into(),
            audience: None,
            token_mandatory: true,
            auto_renew_enabled: true,
            alg: Algorithm::HmacSha256,
            renew_kid: None,
            header_name: http_defaults::TOKEN_HEADER.to_string(),
            cookie_name: http_defaults::TOKEN_COOKIE.to_string(),
            query_param: http_defaults::TOKEN_QUERY_PARAM.to_string(),
            expect_cwt_tag: false,
            store: None,
            logger: None,
            reuse_detector: None,
        }
    }

    /// Add a MAC key
    pub fn key(mut self, key: MacKey) -> Self {
        self.keys.push(key);
        self
    }

    /// Add an ES256 verifier key
    pub fn verifier_key(mut self, key: VerifierKey) -> Self {
        self.verifier_keys.push(key);
        self
    }

    /// Set the envelope type requests are validated against
    pub fn token_type(mut self, token_type: TokenType) -> Self {
        self.token_type = token_type;
        self
    }

    /// Add an ES256 signing key used to mint renewed tokens
    pub fn signing_key(mut self, key: SigningKey) -> Self {
        self.signing_keys.push(key);
        self
    }

    /// Set the accepted audiences
    pub fn audience<S: Into<String>>(mut self, audience: Vec<S>) -> Self {
        self.audience = Some(audience.into_iter().map(Into::into).collect());
        self
    }

    /// Require a token on every request
    pub fn token_mandatory(mut self, mandatory: bool) -> Self {
        self.token_mandatory = mandatory;
        self
    }

    /// Enable or disable auto-renewal
    pub fn auto_renew_enabled(mut self, enabled: bool) -> Self {
        self.auto_renew_enabled = enabled;
        self
    }

    /// Set the algorithm for minted tokens
    pub fn alg(mut self, alg: Algorithm) -> Self {
        self.alg = alg;
        self
    }

    /// Seal renewed tokens with this key
    pub fn renew_kid<S: Into<String>>(mut self, kid: S) -> Self {
        self.renew_kid = Some(kid.into());
        self
    }

    /// Set the token header name
    pub fn header_name<S: Into<String>>(mut self, name: S) -> Self {
        self.header_name = name.into();
        self
    }

    /// Set the token cookie name
    pub fn cookie_name<S: Into<String>>(mut self, name: S) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Set the token query parameter
    pub fn query_param<S: Into<String>>(mut self, name: S) -> Self {
        self.query_param = name.into();
        self
    }

    /// Reject tokens without the CWT tag
    pub fn expect_cwt_tag(mut self, expect: bool) -> Self {
        self.expect_cwt_tag = expect;
        self
    }

    /// Track token usage in a store
    pub fn store(mut self, store: Arc<dyn CtiStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Log token usage
    pub fn logger(mut self, logger: Arc<dyn TokenLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Reuse detection for `catreplay = 2`
    pub fn reuse_detector(mut self, detector: Arc<dyn ReuseDetector>) -> Self {
        self.reuse_detector = Some(detector);
        self
    }
}

/// Request data the validation pipeline works on
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Candidate token
    pub token: Option<String>,
    /// Where the token was found
    pub source: Option<TokenSource>,
    /// Full request URL
    pub url: Option<Url>,
    /// HTTP method
    pub method: String,
    /// Client IP
    pub ip: Option<String>,
    /// Client ASN
    pub asn: Option<u64>,
    /// Request headers
    pub headers: HeaderMap,
}

impl RequestContext {
    /// Extract the context from a request.
    ///
    /// Relative request URIs are resolved against the `Host` header with the
    /// `https` scheme. The client address is read from a [`SocketAddr`] or
    /// [`IpAddr`] request extension.
    pub fn from_request<B>(request: &Request<B>, options: &HttpValidatorOptions) -> Self {
        let url = request_url(request);

        let from_header = request
            .headers()
            .get(options.header_name.as_str())
            .and_then(|value| value.to_str().ok())
            .map(|value| (value.to_string(), TokenSource::Header));
        let from_cookie = || {
            cookie_value(request.headers(), &options.cookie_name)
                .map(|value| (value, TokenSource::Cookie))
        };
        let from_query = || {
            url.as_ref()
                .and_then(|url| {
                    url.query_pairs()
                        .find(|(key, _)| key == options.query_param.as_str())
                        .map(|(_, value)| value.into_owned())
                })
                .map(|value| (value, TokenSource::Query))
        };
        let located = from_header.or_else(from_cookie).or_else(from_query);

        let ip = request
            .extensions()
            .get::<SocketAddr>()
            .map(|addr| addr.ip())
            .or_else(|| request.extensions().get::<IpAddr>().copied())
            .map(|ip| ip.to_string());

        Self {
            token: located.as_ref().map(|(token, _)| token.clone()),
            source: located.map(|(_, source)| source),
            url,
            method: request.method().as_str().to_string(),
            ip,
            asn: request.extensions().get::<ClientAsn>().map(|asn| asn.0),
            headers: request.headers().clone(),
        }
    }
}

fn request_url<B>(request: &Request<B>) -> Option<Url> {
    let uri = request.uri();
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Url::parse(&uri.to_string()).ok();
    }
    let host = request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| uri.authority().map(|authority| authority.as_str()))?;
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    Url::parse(&format!("https://{host}{path}")).ok()
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Outcome of validating a request
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status
    pub status: u16,
    /// Error message for rejected requests
    pub message: Option<String>,
    /// Decoded claims of the presented token
    pub claims: Option<Map<String, Value>>,
    /// Usage count, when a store is configured
    pub count: Option<u64>,
    /// Headers to add to the response (renewed token, redirect location)
    pub headers: HeaderMap,
}

impl HttpResponse {
    fn ok() -> Self {
        Self {
            status: 200,
            message: None,
            claims: None,
            count: None,
            headers: HeaderMap::new(),
        }
    }

    fn rejected(status: u16, message: String) -> Self {
        Self {
            status,
            message: Some(message),
            ..Self::ok()
        }
    }
}

/// Validates HTTP requests carrying a Common Access Token
#[derive(Debug, Clone)]
pub struct HttpValidator {
    cat: Cat,
    options: HttpValidatorOptions,
}

impl HttpValidator {
    /// Create a validator
    pub fn new(options: HttpValidatorOptions) -> Self {
        let mut cat_options = CatOptions::new()
            .keys(options.keys.clone())
            .expect_cwt_tag(options.expect_cwt_tag);
        for key in &options.verifier_keys {
            cat_options = cat_options.verifier_key(key.clone());
        }
        for key in &options.signing_keys {
            cat_options = cat_options.signing_key(key.clone());
        }
        Self {
            cat: Cat::new(cat_options),
            options,
        }
    }

    /// Configured options
    pub fn options(&self) -> &HttpValidatorOptions {
        &self.options
    }

    /// Validate a request.
    ///
    /// Token and request rejections map to 401; unexpected failures map to 500
    /// and are logged.
    pub async fn validate_http_request<B>(&self, request: &Request<B>) -> HttpResponse {
        let ctx = RequestContext::from_request(request, &self.options);
        self.validate_context(&ctx).await
    }

    /// Validate an already extracted request context
    pub async fn validate_context(&self, ctx: &RequestContext) -> HttpResponse {
        match self.process(ctx).await {
            Ok(response) => response,
            Err(err) if err.is_unauthorized() => {
                warn!(error = %err, "token rejected");
                HttpResponse::rejected(401, err.to_string())
            }
            Err(err) => {
                error!(error = %err, "unexpected error while validating request");
                HttpResponse::rejected(500, err.to_string())
            }
        }
    }

    async fn process(&self, ctx: &RequestContext) -> Result<HttpResponse, Error> {
        let token = match &ctx.token {
            Some(token) => token,
            None if self.options.token_mandatory => return Err(Error::NoTokenFound),
            None => return Ok(HttpResponse::ok()),
        };

        let validation = CatValidationOptions {
            issuer: self.options.issuer.clone(),
            audience: self.options.audience.clone(),
            url: ctx.url.clone(),
            ip: ctx.ip.clone(),
            asn: ctx.asn,
        };
        let result = self
            .cat
            .validate(token, self.options.token_type, &validation)?;
        let cat = result.cat;

        if let Some(err) = result.error {
            if matches!(err, Error::TokenExpired) {
                if let Some(catif) = cat.claims().catif() {
                    return self.conditional_response(&cat, &catif?, err);
                }
            }
            return Err(err);
        }

        let store = self.options.store.as_deref();
        let logger = self.options.logger.as_deref();

        let count = match store {
            Some(store) => Some(store.store_token(&cat).await?),
            None => None,
        };
        if let Some(logger) = logger {
            logger.log_token(&cat).await;
        }

        self.check_replay(&cat, count, store, logger).await?;

        if let Some(methods) = cat.claims().get(cat_keys::CATM) {
            if !catm::allows(methods, &ctx.method) {
                return Err(Error::MethodNotAllowed(ctx.method.clone()));
            }
        }

        if let Some(cath) = cat.claims().cath() {
            if !cath?.match_headers(&ctx.headers)? {
                return Err(Error::HeaderNotAllowed(
                    "request headers do not satisfy the cath claim".to_string(),
                ));
            }
        }

        let mut response = HttpResponse::ok();
        if self.options.auto_renew_enabled && cat.should_renew() {
            self.renew(&cat, ctx, &mut response)?;
        }

        response.claims = Some(cat.claims_json()?);
        response.count = count;
        Ok(response)
    }

    async fn check_replay(
        &self,
        cat: &CommonAccessToken,
        count: Option<u64>,
        store: Option<&dyn CtiStore>,
        logger: Option<&dyn TokenLogger>,
    ) -> Result<(), Error> {
        match cat.claims().catreplay() {
            None | Some(replay_values::PERMITTED) => Ok(()),
            Some(replay_values::PROHIBITED) => match count {
                Some(count) if count > 1 => Err(Error::ReplayNotAllowed(count)),
                Some(_) => Ok(()),
                None => {
                    warn!("catreplay prohibits replay but no token store is configured");
                    Ok(())
                }
            },
            Some(replay_values::REUSE_DETECTION) => match &self.options.reuse_detector {
                Some(detector) => {
                    if detector.is_reused(cat, store, logger).await {
                        Err(Error::InvalidReuseDetected)
                    } else {
                        Ok(())
                    }
                }
                None => {
                    warn!("catreplay requests reuse detection but no detector is configured");
                    Ok(())
                }
            },
            Some(other) => Err(Error::InvalidClaimValue(format!(
                "Unsupported catreplay value: {other}"
            ))),
        }
    }

    fn renew(
        &self,
        cat: &CommonAccessToken,
        ctx: &RequestContext,
        response: &mut HttpResponse,
    ) -> Result<(), Error> {
        let catr = match cat.claims().catr() {
            Some(catr) => catr?,
            None => return Ok(()),
        };
        let kid = self
            .options
            .renew_kid
            .as_deref()
            .or(cat.kid())
            .ok_or(Error::KeyNotFound)?;
        let renew_options = CatRenewOptions::new(self.options.issuer.clone(), kid)
            .alg(self.options.alg)
            .token_type(self.options.token_type);
        let renewed = self.cat.renew_token(cat, &renew_options)?;
        debug!(kid, "token renewed");

        let delivery = match catr.renewal_type {
            Some(RenewalType::Automatic) | None => match ctx.source {
                Some(TokenSource::Cookie) => RenewalType::Cookie,
                Some(TokenSource::Query) => RenewalType::Redirect,
                Some(TokenSource::Header) | None => RenewalType::Header,
            },
            Some(explicit) => explicit,
        };

        match delivery {
            RenewalType::Cookie => {
                let name = catr
                    .cookie_name
                    .as_deref()
                    .unwrap_or(&self.options.cookie_name);
                let value = with_params(format!("{name}={renewed}"), &catr.cookie_params);
                response.headers.append(SET_COOKIE, header_value(&value)?);
            }
            RenewalType::Redirect => {
                let mut url = ctx.url.clone().ok_or_else(|| {
                    Error::Other("cannot redirect without a request URL".to_string())
                })?;
                let pairs: Vec<(String, String)> = url
                    .query_pairs()
                    .filter(|(key, _)| key != self.options.query_param.as_str())
                    .map(|(key, value)| (key.into_owned(), value.into_owned()))
                    .collect();
                url.query_pairs_mut()
                    .clear()
                    .extend_pairs(pairs)
                    .append_pair(&self.options.query_param, &renewed);
                response
                    .headers
                    .insert(LOCATION, header_value(url.as_str())?);
                response.status = catr.code.unwrap_or(http_defaults::REDIRECT_STATUS);
            }
            RenewalType::Header | RenewalType::Automatic => {
                let name = catr
                    .header_name
                    .as_deref()
                    .unwrap_or(&self.options.header_name);
                let value = with_params(renewed, &catr.header_params);
                response.headers.insert(header_name(name)?, header_value(&value)?);
            }
        }
        Ok(())
    }

    /// Build the CATIF response for an expired token
    fn conditional_response(
        &self,
        cat: &CommonAccessToken,
        catif: &CommonAccessTokenIf,
        cause: Error,
    ) -> Result<HttpResponse, Error> {
        let mut response = HttpResponse::rejected(401, cause.to_string());
        let mut triggered = false;

        for (trigger, directive) in catif.triggers() {
            if !cat.claims().contains(*trigger) {
                continue;
            }
            triggered = true;
            response.status = directive.code;
            for (name, header) in &directive.headers {
                let value = match header {
                    HeaderDirective::Value(value) => value.clone(),
                    HeaderDirective::Token { url_prefix, claims } => {
                        let kid = directive
                            .kid
                            .as_deref()
                            .or(cat.kid())
                            .ok_or(Error::KeyNotFound)?;
                        let minted = self.cat.seal(
                            fill_placeholders(claims, cat),
                            self.options.token_type,
                            self.options.alg,
                            kid,
                            SealOptions::default(),
                        )?;
                        let encoded: String =
                            url::form_urlencoded::byte_serialize(minted.as_bytes()).collect();
                        format!("{url_prefix}{encoded}")
                    }
                };
                response.headers.insert(header_name(name)?, header_value(&value)?);
            }
        }

        if !triggered {
            return Err(cause);
        }
        response.claims = Some(cat.claims_json()?);
        Ok(response)
    }
}

/// Replace `null` placeholders with the presented token's values (`iat`
/// becomes now) and give the minted token a fresh `cti`
fn fill_placeholders(template: &Claims, cat: &CommonAccessToken) -> Claims {
    let now = current_timestamp();
    let mut claims = Claims::new();
    for (label, value) in template.iter() {
        let filled = match value {
            CborValue::Null if *label == cwt_keys::IAT => Some(CborValue::Integer(now)),
            CborValue::Null => cat.claims().get(*label).cloned(),
            other => Some(other.clone()),
        };
        if let Some(filled) = filled {
            claims.insert(*label, filled);
        }
    }
    claims.insert(cwt_keys::CTI, crate::cat::random_cti());
    claims
}

fn with_params(value: String, params: &Option<Vec<String>>) -> String {
    match params {
        Some(params) if !params.is_empty() => format!("{value}; {}", params.join("; ")),
        _ => value,
    }
}

fn header_name(name: &str) -> Result<HeaderName, Error> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| Error::InvalidHttpHeader(name.to_string()))
}

fn header_value(value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|_| Error::InvalidHttpHeader(value.to_string()))
}
