//! Tower HTTP Revalidate
//! =====================
//!
//! `tower-http-revalidate` is a caching layer for Tower HTTP services that
//! follows the RFC 7234 freshness model. Each stored response is classified
//! as fresh, stale or transparent from its `Cache-Control`, `Age`, `Date` and
//! `Expires` headers:
//!
//! - **fresh** responses are served from the backend, marked `x-cache: HIT`;
//! - **stale** responses are revalidated with a conditional request
//!   (`If-None-Match` / `If-Modified-Since`); a `304` keeps the stored body,
//!   anything else replaces it;
//! - **transparent** responses carry no cache signal and bypass the cache.
//!
//! ```no_run
//! use tower::{Service, ServiceBuilder, ServiceExt};
//! use tower_http_revalidate::prelude::*;
//!
//! # async fn run() -> Result<(), tower_http_revalidate::layer::BoxError> {
//! let layer = CacheLayer::builder(InMemoryBackend::new(1_000))
//!     .cache_private_responses(false)
//!     .build();
//!
//! let mut svc = ServiceBuilder::new()
//!     .layer(layer)
//!     .service(tower::service_fn(|_req: http::Request<()>| async {
//!         let response = http::Response::builder()
//!             .header("cache-control", "max-age=60")
//!             .header("date", httpdate::fmt_http_date(std::time::SystemTime::now()))
//!             .body(http_body_util::Full::from("ok"))
//!             .unwrap();
//!         Ok::<_, std::convert::Infallible>(response)
//!     }));
//!
//! let response = svc
//!     .ready()
//!     .await?
//!     .call(http::Request::new(()))
//!     .await?;
//! # drop(response);
//! # Ok(())
//! # }
//! ```
//!
//! Storage is pluggable through [`backend::CacheBackend`]; time is injected
//! through [`clock::Clock`] so freshness decisions are deterministic.

pub mod backend;
pub mod clock;
pub mod directives;
pub mod error;
pub mod freshness;
pub mod headers;
pub mod key;
pub mod layer;
pub mod logging;
pub mod policy;
pub mod prelude;
pub mod validator;

pub use directives::{CacheControl, NoCacheEquivalence};
pub use freshness::{Freshness, FreshnessPipeline, FreshnessRule};
pub use key::KeyBuilder;
pub use layer::{is_cache_hit, CacheLayer, CacheLayerBuilder, CacheService};
pub use logging::{CacheEvent, CacheEventType, EventLogConfig, RequestId};
pub use policy::{CachePolicy, CacheSettings, RevalidationFailure};
