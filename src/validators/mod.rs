//! Request-level validators.

pub mod http;

pub use self::http::{
    ClientAsn, HttpResponse, HttpValidator, HttpValidatorOptions, RequestContext, ReuseDetector,
    TokenSource,
};
