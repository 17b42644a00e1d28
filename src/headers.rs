//! Typed accessors for the response headers that feed freshness decisions.

use std::time::SystemTime;

use http::header::{AGE, DATE, ETAG, EXPIRES, LAST_MODIFIED};
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::error::HeaderError;

/// The `Age` header in seconds.
pub fn age(headers: &HeaderMap) -> Result<i64, HeaderError> {
    let value = text(headers, &AGE)?;
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| HeaderError::InvalidHeader(AGE))
}

/// The `Date` header.
pub fn date(headers: &HeaderMap) -> Result<SystemTime, HeaderError> {
    http_date(headers, &DATE)
}

/// The `Expires` header.
pub fn expires(headers: &HeaderMap) -> Result<SystemTime, HeaderError> {
    http_date(headers, &EXPIRES)
}

/// The `ETag` validator, when present.
pub fn etag(headers: &HeaderMap) -> Option<&HeaderValue> {
    headers.get(ETAG)
}

/// The `Last-Modified` validator, when present.
pub fn last_modified(headers: &HeaderMap) -> Option<&HeaderValue> {
    headers.get(LAST_MODIFIED)
}

/// Parses an IMF-fixdate, RFC 850 or asctime timestamp.
fn http_date(headers: &HeaderMap, name: &HeaderName) -> Result<SystemTime, HeaderError> {
    let value = text(headers, name)?;
    httpdate::parse_http_date(value.trim()).map_err(|_| HeaderError::InvalidDate(name.clone()))
}

fn text<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Result<&'a str, HeaderError> {
    headers
        .get(name)
        .ok_or_else(|| HeaderError::MissingHeader(name.clone()))?
        .to_str()
        .map_err(|_| HeaderError::InvalidHeader(name.clone()))
}
