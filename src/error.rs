use http::HeaderName;
use thiserror::Error;

/// Errors that can occur while interacting with a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("invalid cache configuration: {0}")]
    Config(String),
}

/// Non-fatal failures raised while reading cache-related headers.
///
/// Freshness rules treat every variant as "signal not available" and either
/// fall through to the next rule or settle on the safer classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("cache-control directive `{0}` not present")]
    MissingDirective(&'static str),

    #[error("cache-control directive `{name}` has non-numeric value `{value}`")]
    InvalidDirective { name: &'static str, value: String },

    #[error("header `{0}` not present")]
    MissingHeader(HeaderName),

    #[error("header `{0}` is not a valid integer")]
    InvalidHeader(HeaderName),

    #[error("header `{0}` is not a valid HTTP date")]
    InvalidDate(HeaderName),
}
