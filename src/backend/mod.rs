//! Storage backends for the cache layer.
//!
//! The layer treats storage as an opaque capability: a [`CacheBackend`] can
//! get, set and delete [`CacheEntry`] snapshots by key and nothing more.
//! Eviction, expiry and concurrency control are the backend's own business.
//!
//! [`memory::InMemoryBackend`] is a process-local implementation backed by
//! [`moka`].

pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use http::response::Parts;
use http::{HeaderMap, Response, StatusCode, Version};
use http_body_util::Full;

use crate::error::CacheError;

/// Snapshot of a response captured by the cache layer.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CacheEntry {
    pub fn new(status: StatusCode, version: Version, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            version,
            headers,
            body,
        }
    }

    /// Captures the head of a response together with its collected body.
    pub fn from_parts(parts: &Parts, body: Bytes) -> Self {
        Self::new(parts.status, parts.version, parts.headers.clone(), body)
    }

    /// Converts the entry back into an `http::Response`.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::from(self.body));
        *response.status_mut() = self.status;
        *response.version_mut() = self.version;
        *response.headers_mut() = self.headers;
        response
    }
}

#[async_trait]
pub trait CacheBackend: Send + Sync + Clone + 'static {
    /// Fetches a stored entry by key, `Ok(None)` when absent.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;
    /// Stores `entry` under `key`, replacing any previous entry.
    async fn set(&self, key: String, entry: CacheEntry) -> Result<(), CacheError>;
    /// Removes the entry for `key`, if present.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}
