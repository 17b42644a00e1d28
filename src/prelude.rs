//! Re-exports for consumers who prefer a single import.
//!
//! ```no_run
//! use tower_http_revalidate::prelude::*;
//! let backend = InMemoryBackend::new(128);
//! let layer = CacheLayer::builder(backend)
//!     .revalidation_failure(RevalidationFailure::ServeStale)
//!     .build();
//! # drop(layer);
//! ```

pub use crate::backend::memory::InMemoryBackend;
pub use crate::backend::{CacheBackend, CacheEntry};
pub use crate::clock::{Clock, FixedClock, SystemClock};
pub use crate::directives::{CacheControl, NoCacheEquivalence};
pub use crate::error::{CacheError, HeaderError};
pub use crate::freshness::{Freshness, FreshnessPipeline, FreshnessRule};
pub use crate::key::KeyBuilder;
pub use crate::layer::{is_cache_hit, CacheLayer, CacheLayerBuilder, CacheService, HIT, STALE};
pub use crate::logging::{CacheEvent, CacheEventType, EventLogConfig, RequestId};
pub use crate::policy::{CachePolicy, CacheSettings, RevalidationFailure, SkipReason};
pub use crate::validator::Revalidation;
