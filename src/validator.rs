//! Conditional revalidation of stale entries.
//!
//! A stale entry is revalidated with exactly one request to the wrapped
//! service. Conditional headers sent by the caller are dropped and the stored
//! validators are attached instead, as `If-None-Match` (from `ETag`) and
//! `If-Modified-Since` (from `Last-Modified`). A `304 Not
//! Modified` answer keeps the stored body; anything else replaces it. Errors
//! are returned untouched and the stored entry is never modified here.

use bytes::Bytes;
use http::header::{
    CONTENT_LENGTH, IF_MATCH, IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_RANGE, IF_UNMODIFIED_SINCE,
    TRANSFER_ENCODING,
};
use http::response::Parts;
use http::{HeaderMap, Request, Response, StatusCode};
use http_body::Body;
use http_body_util::{BodyExt, Full};
use tower::{Service, ServiceExt};

use crate::backend::CacheEntry;
use crate::headers;
use crate::layer::BoxError;

/// A response from the wrapped service with its body collected.
#[derive(Debug)]
pub struct Fetched {
    pub parts: Parts,
    pub body: Bytes,
}

impl Fetched {
    pub fn to_entry(&self) -> CacheEntry {
        CacheEntry::from_parts(&self.parts, self.body.clone())
    }

    pub fn into_response(self) -> Response<Full<Bytes>> {
        Response::from_parts(self.parts, Full::from(self.body))
    }
}

/// Outcome of a conditional request.
#[derive(Debug)]
pub enum Revalidation {
    /// The origin confirmed the stored entry; its headers have been refreshed
    /// from the `304` response.
    Validated(CacheEntry),
    /// The origin sent a new representation.
    Replaced(Fetched),
}

/// Calls `service` once and collects the response body.
pub async fn fetch<S, ReqBody, ResBody>(
    service: S,
    request: Request<ReqBody>,
) -> Result<Fetched, BoxError>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: Into<BoxError>,
    ResBody: Body<Data = Bytes>,
    ResBody::Error: Into<BoxError>,
{
    let response = service
        .oneshot(request)
        .await
        .map_err(Into::<BoxError>::into)?;
    let (parts, body) = response.into_parts();
    let body = BodyExt::collect(body)
        .await
        .map_err(Into::<BoxError>::into)?
        .to_bytes();
    Ok(Fetched { parts, body })
}

/// Removes every conditional header from an outgoing request.
///
/// A `304` answer is only meaningful for the validators the cache itself
/// sent.
pub fn strip_conditionals(request_headers: &mut HeaderMap) {
    for name in [
        IF_MATCH,
        IF_NONE_MATCH,
        IF_MODIFIED_SINCE,
        IF_UNMODIFIED_SINCE,
        IF_RANGE,
    ] {
        request_headers.remove(name);
    }
}

/// Copies the stored validators onto an outgoing request.
pub fn attach_validators(request_headers: &mut HeaderMap, stored: &HeaderMap) {
    if let Some(etag) = headers::etag(stored) {
        request_headers.insert(IF_NONE_MATCH, etag.clone());
    }
    if let Some(last_modified) = headers::last_modified(stored) {
        request_headers.insert(IF_MODIFIED_SINCE, last_modified.clone());
    }
}

/// Issues the conditional request for `stored`.
pub async fn revalidate<S, ReqBody, ResBody>(
    service: S,
    mut request: Request<ReqBody>,
    stored: &CacheEntry,
) -> Result<Revalidation, BoxError>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: Into<BoxError>,
    ResBody: Body<Data = Bytes>,
    ResBody::Error: Into<BoxError>,
{
    strip_conditionals(request.headers_mut());
    attach_validators(request.headers_mut(), &stored.headers);

    #[cfg(feature = "tracing")]
    tracing::debug!(
        uri = %request.uri(),
        if_none_match = ?request.headers().get(IF_NONE_MATCH),
        if_modified_since = ?request.headers().get(IF_MODIFIED_SINCE),
        "revalidating stale entry"
    );

    let fetched = fetch(service, request).await?;

    if fetched.parts.status == StatusCode::NOT_MODIFIED {
        let mut entry = stored.clone();
        refresh_headers(&mut entry.headers, &fetched.parts.headers);
        Ok(Revalidation::Validated(entry))
    } else {
        Ok(Revalidation::Replaced(fetched))
    }
}

/// Replaces stored header values with those sent alongside a `304`.
fn refresh_headers(stored: &mut HeaderMap, update: &HeaderMap) {
    for name in update.keys() {
        if name == CONTENT_LENGTH || name == TRANSFER_ENCODING {
            continue;
        }
        stored.remove(name);
        for value in update.get_all(name) {
            stored.append(name.clone(), value.clone());
        }
    }
}
