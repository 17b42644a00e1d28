//! Structured cache events.
//!
//! Every decision the layer takes (hit, miss, revalidation, store, delete)
//! can be emitted as a single JSON event through `tracing`, correlated by a
//! [`RequestId`]. Events are off by default; see [`EventLogConfig`].

use std::fmt;
use std::time::{Duration, SystemTime};

use http::{HeaderValue, Method, Request, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::freshness::Freshness;

/// Header consulted for an upstream request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Configuration for structured cache events.
#[derive(Debug, Clone)]
pub struct EventLogConfig {
    pub enabled: bool,

    /// Sample rate (1.0 = all requests, 0.1 = 10%)
    pub sample_rate: f64,

    /// Hash cache keys before they are written out.
    pub hash_keys: bool,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_rate: 1.0,
            hash_keys: true,
        }
    }
}

impl EventLogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the sample rate, clamped to `0.0..=1.0`.
    pub fn with_sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_hash_keys(mut self, hash: bool) -> Self {
        self.hash_keys = hash;
        self
    }

    /// Checks if an event should be emitted based on the sampling rate.
    pub fn should_sample(&self) -> bool {
        if !self.enabled {
            return false;
        }
        if self.sample_rate >= 1.0 {
            return true;
        }
        use std::collections::hash_map::RandomState;
        use std::hash::BuildHasher;

        let random = (RandomState::new().hash_one(SystemTime::now()) as f64) / (u64::MAX as f64);
        random < self.sample_rate
    }
}

/// Identifier correlating the events of one request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Generates a random UUID v4 id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Uses the `x-request-id` header when it is valid UTF-8, otherwise
    /// generates a new id.
    pub fn from_request<B>(req: &Request<B>) -> Self {
        req.headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value: &HeaderValue| value.to_str().ok())
            .map(|value| Self(value.to_owned()))
            .unwrap_or_else(Self::new)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Kinds of cache events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEventType {
    /// Fresh entry served without contacting the origin
    Hit,
    /// No stored entry
    Miss,
    /// Origin answered 304; stored body served
    Revalidated,
    /// Origin answered with a new representation
    Replaced,
    /// Stored entry carried no cache signal; fetched without the cache
    Transparent,
    /// Stale entry served after a failed revalidation
    StaleServed,
    Store,
    StoreSkipped,
    Delete,
    /// Request was not eligible for caching
    Bypass,
}

impl CacheEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheEventType::Hit => "hit",
            CacheEventType::Miss => "miss",
            CacheEventType::Revalidated => "revalidated",
            CacheEventType::Replaced => "replaced",
            CacheEventType::Transparent => "transparent",
            CacheEventType::StaleServed => "stale_served",
            CacheEventType::Store => "store",
            CacheEventType::StoreSkipped => "store_skipped",
            CacheEventType::Delete => "delete",
            CacheEventType::Bypass => "bypass",
        }
    }
}

/// One structured cache event.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    pub timestamp: SystemTime,
    pub event_type: CacheEventType,
    pub request_id: RequestId,
    /// Cache key (hashed on output when configured)
    pub key: String,
    pub method: Option<Method>,
    pub uri: Option<Uri>,
    pub status: Option<StatusCode>,
    pub freshness: Option<Freshness>,
    pub latency_us: Option<u64>,
    pub size_bytes: Option<usize>,
    /// Free-form reason, e.g. why a store was skipped
    pub reason: Option<String>,
}

impl CacheEvent {
    pub fn new(event_type: CacheEventType, request_id: RequestId, key: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            event_type,
            request_id,
            key: key.into(),
            method: None,
            uri: None,
            status: None,
            freshness: None,
            latency_us: None,
            size_bytes: None,
            reason: None,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_uri(mut self, uri: Uri) -> Self {
        self.uri = Some(uri);
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_freshness(mut self, freshness: Freshness) -> Self {
        self.freshness = Some(freshness);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_us = Some(latency.as_micros() as u64);
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size_bytes = Some(size);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Renders the event as JSON.
    pub fn to_json(&self, config: &EventLogConfig) -> serde_json::Value {
        let key = if config.hash_keys {
            hash_key(&self.key)
        } else {
            self.key.clone()
        };

        json!({
            "timestamp": chrono::DateTime::<chrono::Utc>::from(self.timestamp)
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "event": self.event_type.as_str(),
            "request_id": self.request_id.as_str(),
            "key": key,
            "method": self.method.as_ref().map(|m| m.as_str()),
            "uri": self.uri.as_ref().map(|u| u.to_string()),
            "status": self.status.map(|s| s.as_u16()),
            "freshness": self.freshness.map(|f| f.as_str()),
            "latency_us": self.latency_us,
            "size_bytes": self.size_bytes,
            "reason": self.reason,
        })
    }

    /// Emits this event if the configuration samples it.
    pub fn log(&self, config: &EventLogConfig) {
        if !config.should_sample() {
            return;
        }

        let event = self.to_json(config);

        #[cfg(feature = "tracing")]
        tracing::info!(target: "tower_http_revalidate::events", event = %event);

        #[cfg(not(feature = "tracing"))]
        drop(event);
    }
}

/// Hashes a cache key using SHA-256.
pub fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}
