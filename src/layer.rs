use std::error::Error as StdError;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::header::PRAGMA;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, Uri};
use http_body::Body;
use http_body_util::Full;
use tower::{Layer, Service};

#[cfg(feature = "metrics")]
use metrics::{counter, histogram};

use crate::backend::memory::InMemoryBackend;
use crate::backend::{CacheBackend, CacheEntry};
use crate::clock::Clock;
use crate::directives::{CacheControl, NoCacheEquivalence};
use crate::freshness::{Freshness, FreshnessPipeline};
use crate::key::KeyBuilder;
use crate::logging::{CacheEvent, CacheEventType, EventLogConfig, RequestId};
use crate::policy::{CachePolicy, RevalidationFailure, DEFAULT_HIT_HEADER};
use crate::validator::{self, Fetched, Revalidation};

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Marker value for responses served from cache (fresh or validated).
pub const HIT: &str = "HIT";
/// Marker value for stale entries served after a failed revalidation.
pub const STALE: &str = "STALE";

/// Whether a response produced by the layer was served from cache.
///
/// Only checks the default marker header; layers configured with a custom
/// header should inspect it directly.
pub fn is_cache_hit<T>(response: &Response<T>) -> bool {
    response
        .headers()
        .get(DEFAULT_HIT_HEADER)
        .is_some_and(|value| value == HIT)
}

/// Caching layer for Tower HTTP services.
///
/// Stored responses are classified by the [`FreshnessPipeline`]: fresh ones
/// are served directly, stale ones are revalidated with a conditional request
/// to the inner service, and transparent ones bypass the cache.
///
/// Cloning a `CacheLayer` is cheap and shares the underlying backend.
#[derive(Clone)]
pub struct CacheLayer<B> {
    backend: B,
    policy: CachePolicy,
    key_builder: KeyBuilder,
    pipeline: Arc<FreshnessPipeline>,
}

/// Builder for configuring [`CacheLayer`] instances.
pub struct CacheLayerBuilder<B> {
    backend: B,
    policy: CachePolicy,
    key_builder: KeyBuilder,
    pipeline: Option<FreshnessPipeline>,
}

impl<B> CacheLayerBuilder<B>
where
    B: CacheBackend,
{
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            policy: CachePolicy::default(),
            key_builder: KeyBuilder::default(),
            pipeline: None,
        }
    }

    /// Replaces the cache policy with a pre-built value.
    pub fn policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Allows storing responses marked `Cache-Control: private`.
    pub fn cache_private_responses(mut self, enabled: bool) -> Self {
        self.policy = self.policy.with_cache_private_responses(enabled);
        self
    }

    pub fn no_cache_equivalence(mut self, rule: NoCacheEquivalence) -> Self {
        self.policy = self.policy.with_no_cache_equivalence(rule);
        self
    }

    pub fn revalidation_failure(mut self, mode: RevalidationFailure) -> Self {
        self.policy = self.policy.with_revalidation_failure(mode);
        self
    }

    pub fn hit_header(mut self, name: HeaderName) -> Self {
        self.policy = self.policy.with_hit_header(name);
        self
    }

    pub fn respect_request_cache_control(mut self, enabled: bool) -> Self {
        self.policy = self.policy.with_respect_request_cache_control(enabled);
        self
    }

    pub fn max_body_size(mut self, size: Option<usize>) -> Self {
        self.policy = self.policy.with_max_body_size(size);
        self
    }

    pub fn method_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Method) -> bool + Send + Sync + 'static,
    {
        self.policy = self.policy.with_method_predicate(predicate);
        self
    }

    pub fn event_log(mut self, config: EventLogConfig) -> Self {
        self.policy = self.policy.with_event_log(config);
        self
    }

    /// Sets the clock used for freshness decisions.
    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.policy = self.policy.with_clock(clock);
        self
    }

    pub fn key_builder(mut self, builder: KeyBuilder) -> Self {
        self.key_builder = builder;
        self
    }

    /// Replaces the standard rule order.
    ///
    /// The policy's `no-cache` equivalence still governs whether responses
    /// are stored.
    pub fn freshness_pipeline(mut self, pipeline: FreshnessPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn build(self) -> CacheLayer<B> {
        let pipeline = self.pipeline.unwrap_or_else(|| {
            FreshnessPipeline::standard(self.policy.no_cache_equivalence().clone())
        });

        CacheLayer {
            backend: self.backend,
            policy: self.policy,
            key_builder: self.key_builder,
            pipeline: Arc::new(pipeline),
        }
    }
}

impl CacheLayer<InMemoryBackend> {
    /// Creates a cache layer backed by an in-memory [`InMemoryBackend`].
    pub fn new_in_memory(max_capacity: u64) -> Self {
        CacheLayerBuilder::new(InMemoryBackend::new(max_capacity)).build()
    }
}

impl<B> CacheLayer<B>
where
    B: CacheBackend,
{
    /// Builds a cache layer with the default [`CachePolicy`].
    pub fn new(backend: B) -> Self {
        CacheLayerBuilder::new(backend).build()
    }

    /// Returns a builder for fine-grained control over the cache policy.
    pub fn builder(backend: B) -> CacheLayerBuilder<B> {
        CacheLayerBuilder::new(backend)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn key_builder(&self) -> &KeyBuilder {
        &self.key_builder
    }
}

impl<S, B> Layer<S> for CacheLayer<B>
where
    B: CacheBackend,
{
    type Service = CacheService<S, B>;

    fn layer(&self, inner: S) -> Self::Service {
        CacheService {
            inner,
            backend: self.backend.clone(),
            policy: self.policy.clone(),
            key_builder: self.key_builder.clone(),
            pipeline: self.pipeline.clone(),
        }
    }
}

#[derive(Clone)]
pub struct CacheService<S, B> {
    inner: S,
    backend: B,
    policy: CachePolicy,
    key_builder: KeyBuilder,
    pipeline: Arc<FreshnessPipeline>,
}

impl<S, B, ReqBody, ResBody> Service<Request<ReqBody>> for CacheService<S, B>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError> + Send,
    ReqBody: Send + 'static,
    ResBody: Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError> + Send,
    B: CacheBackend,
{
    type Response = Response<Full<Bytes>>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let method = req.method().clone();
        let uri = req.uri().clone();

        let respect_request = self.policy.respect_request_cache_control();
        let request_directives = CacheControl::from_headers(req.headers());
        let request_bypass = respect_request && request_directives.no_store();
        let force_revalidation =
            respect_request && (request_directives.no_cache() || pragma_no_cache(req.headers()));

        let key = if self.policy.should_cache_method(&method) && !request_bypass {
            self.key_builder.build(&method, &uri, req.headers())
        } else {
            None
        };

        let request_id = self
            .policy
            .event_log()
            .enabled
            .then(|| RequestId::from_request(&req));

        let exchange = Exchange {
            backend: self.backend.clone(),
            policy: self.policy.clone(),
            pipeline: self.pipeline.clone(),
            request_id,
            method,
            uri,
        };
        let inner = self.inner.clone();

        Box::pin(async move {
            #[cfg(feature = "tracing")]
            tracing::debug!(method = %exchange.method, uri = %exchange.uri, key = ?key, "cache_call");

            let Some(key) = key else {
                exchange.emit(CacheEventType::Bypass, "", |event| event);
                return exchange.fetch(inner, req).await.map(Fetched::into_response);
            };

            let stored = match exchange.backend.get(&key).await {
                Ok(stored) => stored,
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(key = %key, error = %_err, "cache lookup failed, treating as miss");
                    #[cfg(feature = "metrics")]
                    counter!("tower_http_revalidate.lookup_error").increment(1);
                    None
                }
            };

            match stored {
                Some(entry) => {
                    exchange
                        .serve_stored(inner, key, entry, req, force_revalidation)
                        .await
                }
                None => exchange.serve_miss(inner, key, req).await,
            }
        })
    }
}

/// Per-request state shared by the cache paths.
///
/// Holds everything but the inner service, which each path takes by value.
struct Exchange<B> {
    backend: B,
    policy: CachePolicy,
    pipeline: Arc<FreshnessPipeline>,
    request_id: Option<RequestId>,
    method: Method,
    uri: Uri,
}

impl<B> Exchange<B>
where
    B: CacheBackend,
{
    async fn fetch<S, ReqBody, ResBody>(
        &self,
        inner: S,
        req: Request<ReqBody>,
    ) -> Result<Fetched, BoxError>
    where
        S: Service<Request<ReqBody>, Response = Response<ResBody>>,
        S::Error: Into<BoxError>,
        ResBody: Body<Data = Bytes>,
        ResBody::Error: Into<BoxError>,
    {
        let start = Instant::now();
        let fetched = validator::fetch(inner, req).await?;
        let _elapsed = start.elapsed();

        #[cfg(feature = "metrics")]
        histogram!("tower_http_revalidate.fetch_latency").record(_elapsed.as_secs_f64());

        Ok(fetched)
    }

    async fn serve_miss<S, ReqBody, ResBody>(
        &self,
        inner: S,
        key: String,
        mut req: Request<ReqBody>,
    ) -> Result<Response<Full<Bytes>>, BoxError>
    where
        S: Service<Request<ReqBody>, Response = Response<ResBody>>,
        S::Error: Into<BoxError>,
        ResBody: Body<Data = Bytes>,
        ResBody::Error: Into<BoxError>,
    {
        #[cfg(feature = "metrics")]
        counter!("tower_http_revalidate.miss").increment(1);

        // the stored representation must be a full one
        validator::strip_conditionals(req.headers_mut());

        let start = Instant::now();
        let fetched = self.fetch(inner, req).await?;
        self.emit(CacheEventType::Miss, &key, |event| {
            event
                .with_status(fetched.parts.status)
                .with_latency(start.elapsed())
                .with_size(fetched.body.len())
        });

        let directives = CacheControl::from_headers(&fetched.parts.headers);
        self.store(&key, &fetched, &directives).await;

        Ok(fetched.into_response())
    }

    async fn serve_stored<S, ReqBody, ResBody>(
        &self,
        inner: S,
        key: String,
        entry: CacheEntry,
        req: Request<ReqBody>,
        force_revalidation: bool,
    ) -> Result<Response<Full<Bytes>>, BoxError>
    where
        S: Service<Request<ReqBody>, Response = Response<ResBody>>,
        S::Error: Into<BoxError>,
        ResBody: Body<Data = Bytes>,
        ResBody::Error: Into<BoxError>,
    {
        let directives = CacheControl::from_headers(&entry.headers);
        let mut freshness = self
            .pipeline
            .evaluate(&entry.headers, &directives, self.policy.clock());
        if freshness == Freshness::Fresh && force_revalidation {
            freshness = Freshness::Stale;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(key = %key, %freshness, "stored entry classified");

        match freshness {
            Freshness::Fresh => {
                #[cfg(feature = "metrics")]
                counter!("tower_http_revalidate.hit").increment(1);

                self.emit(CacheEventType::Hit, &key, |event| {
                    event
                        .with_freshness(freshness)
                        .with_status(entry.status)
                        .with_size(entry.body.len())
                });
                Ok(self.mark(entry.into_response(), HIT))
            }
            Freshness::Stale => self.revalidate(inner, key, entry, directives, req).await,
            Freshness::Transparent => {
                #[cfg(feature = "metrics")]
                counter!("tower_http_revalidate.transparent").increment(1);

                self.emit(CacheEventType::Transparent, &key, |event| {
                    event.with_freshness(freshness)
                });
                self.fetch(inner, req).await.map(Fetched::into_response)
            }
        }
    }

    async fn revalidate<S, ReqBody, ResBody>(
        &self,
        inner: S,
        key: String,
        entry: CacheEntry,
        stored_directives: CacheControl,
        req: Request<ReqBody>,
    ) -> Result<Response<Full<Bytes>>, BoxError>
    where
        S: Service<Request<ReqBody>, Response = Response<ResBody>>,
        S::Error: Into<BoxError>,
        ResBody: Body<Data = Bytes>,
        ResBody::Error: Into<BoxError>,
    {
        let start = Instant::now();
        let outcome = match validator::revalidate(inner, req, &entry).await {
            Ok(outcome) => outcome,
            Err(err) => {
                #[cfg(feature = "metrics")]
                counter!("tower_http_revalidate.revalidation_error").increment(1);

                return match self.policy.revalidation_failure() {
                    RevalidationFailure::Propagate => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(key = %key, error = %err, "revalidation failed");
                        Err(err)
                    }
                    RevalidationFailure::ServeStale => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(key = %key, error = %err, "revalidation failed, serving stale entry");
                        #[cfg(feature = "metrics")]
                        counter!("tower_http_revalidate.stale_served").increment(1);

                        self.emit(CacheEventType::StaleServed, &key, |event| {
                            event.with_reason(err.to_string())
                        });
                        Ok(self.mark(entry.into_response(), STALE))
                    }
                };
            }
        };

        match outcome {
            Revalidation::Validated(refreshed) => {
                #[cfg(feature = "metrics")]
                counter!("tower_http_revalidate.revalidated").increment(1);

                self.emit(CacheEventType::Revalidated, &key, |event| {
                    event
                        .with_status(refreshed.status)
                        .with_latency(start.elapsed())
                });

                let forbids_store = stored_directives.no_store()
                    || CacheControl::from_headers(&refreshed.headers).no_store();
                let response = self.mark(refreshed.into_response(), HIT);
                if forbids_store {
                    self.delete(&key, "no_store").await;
                }
                Ok(response)
            }
            Revalidation::Replaced(fetched) => {
                #[cfg(feature = "metrics")]
                counter!("tower_http_revalidate.replaced").increment(1);

                self.emit(CacheEventType::Replaced, &key, |event| {
                    event
                        .with_status(fetched.parts.status)
                        .with_latency(start.elapsed())
                        .with_size(fetched.body.len())
                });

                let directives = CacheControl::from_headers(&fetched.parts.headers);
                if stored_directives.no_store() || directives.no_store() {
                    self.delete(&key, "no_store").await;
                } else if !self.store(&key, &fetched, &directives).await {
                    self.delete(&key, "replaced").await;
                }
                Ok(fetched.into_response())
            }
        }
    }

    /// Writes `fetched` to the backend when the policy allows it. Returns
    /// whether the entry was written.
    async fn store(&self, key: &str, fetched: &Fetched, directives: &CacheControl) -> bool {
        let decision = self
            .policy
            .store_decision(fetched.parts.status, directives, fetched.body.len());
        if let Err(reason) = decision {
            #[cfg(feature = "tracing")]
            tracing::debug!(key = %key, %reason, "response not stored");
            #[cfg(feature = "metrics")]
            counter!("tower_http_revalidate.store_skipped").increment(1);

            self.emit(CacheEventType::StoreSkipped, key, |event| {
                event.with_reason(reason.as_str())
            });
            return false;
        }

        match self.backend.set(key.to_owned(), fetched.to_entry()).await {
            Ok(()) => {
                #[cfg(feature = "metrics")]
                counter!("tower_http_revalidate.store").increment(1);

                self.emit(CacheEventType::Store, key, |event| {
                    event
                        .with_status(fetched.parts.status)
                        .with_size(fetched.body.len())
                });
                true
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(key = %key, error = %_err, "failed to store response");
                #[cfg(feature = "metrics")]
                counter!("tower_http_revalidate.store_error").increment(1);
                false
            }
        }
    }

    async fn delete(&self, key: &str, reason: &'static str) {
        match self.backend.delete(key).await {
            Ok(()) => {
                #[cfg(feature = "metrics")]
                counter!("tower_http_revalidate.delete").increment(1);

                self.emit(CacheEventType::Delete, key, |event| event.with_reason(reason));
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(key = %key, error = %_err, "failed to delete entry");
                #[cfg(feature = "metrics")]
                counter!("tower_http_revalidate.delete_error").increment(1);
            }
        }
    }

    fn mark(
        &self,
        mut response: Response<Full<Bytes>>,
        value: &'static str,
    ) -> Response<Full<Bytes>> {
        response.headers_mut().insert(
            self.policy.hit_header().clone(),
            HeaderValue::from_static(value),
        );
        response
    }

    fn emit<F>(&self, event_type: CacheEventType, key: &str, decorate: F)
    where
        F: FnOnce(CacheEvent) -> CacheEvent,
    {
        let config = self.policy.event_log();
        if !config.enabled {
            return;
        }

        let event = CacheEvent::new(
            event_type,
            self.request_id.clone().unwrap_or_default(),
            key,
        )
        .with_method(self.method.clone())
        .with_uri(self.uri.clone());
        decorate(event).log(config);
    }
}

fn pragma_no_cache(headers: &HeaderMap) -> bool {
    headers
        .get_all(PRAGMA)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.to_ascii_lowercase().contains("no-cache"))
}
