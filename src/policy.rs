use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use http::{HeaderName, Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::directives::{CacheControl, NoCacheEquivalence};
use crate::error::CacheError;
use crate::logging::EventLogConfig;

/// Type alias for the method predicate function
type MethodPredicateFn = Arc<dyn Fn(&Method) -> bool + Send + Sync>;

/// Default name of the header that marks responses served from cache.
pub const DEFAULT_HIT_HEADER: &str = "x-cache";

/// What happens when the conditional request for a stale entry fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevalidationFailure {
    /// Surface the fetch error to the caller (fail-closed).
    #[default]
    Propagate,
    /// Serve the stored entry, marked `STALE` (fail-open).
    ServeStale,
}

/// Why a response was not written to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoCacheControl,
    NoStore,
    NoCache,
    Private,
    BodyTooLarge,
    /// `304` and `206` answers are not full representations.
    UncacheableStatus,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoCacheControl => "no_cache_control",
            SkipReason::NoStore => "no_store",
            SkipReason::NoCache => "no_cache",
            SkipReason::Private => "private",
            SkipReason::BodyTooLarge => "body_too_large",
            SkipReason::UncacheableStatus => "uncacheable_status",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime cache policy shared by every service produced by a layer.
///
/// Policies are cheap to clone and immutable; the `with_*` helpers return
/// updated copies.
#[derive(Clone)]
pub struct CachePolicy {
    cache_private_responses: bool,
    no_cache_equivalence: NoCacheEquivalence,
    revalidation_failure: RevalidationFailure,
    hit_header: HeaderName,
    respect_request_cache_control: bool,
    max_body_size: Option<usize>,
    method_predicate: Option<MethodPredicateFn>,
    event_log: EventLogConfig,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachePolicy")
            .field("cache_private_responses", &self.cache_private_responses)
            .field("no_cache_equivalence", &self.no_cache_equivalence)
            .field("revalidation_failure", &self.revalidation_failure)
            .field("hit_header", &self.hit_header)
            .field(
                "respect_request_cache_control",
                &self.respect_request_cache_control,
            )
            .field("max_body_size", &self.max_body_size)
            .field("event_log", &self.event_log)
            .finish_non_exhaustive()
    }
}

impl CachePolicy {
    /// Decides whether a response with this status and these directives may
    /// be written to the backend.
    pub fn store_decision(
        &self,
        status: StatusCode,
        directives: &CacheControl,
        body_len: usize,
    ) -> Result<(), SkipReason> {
        if matches!(status, StatusCode::NOT_MODIFIED | StatusCode::PARTIAL_CONTENT) {
            return Err(SkipReason::UncacheableStatus);
        }
        if !directives.is_present() {
            return Err(SkipReason::NoCacheControl);
        }
        if directives.no_store() {
            return Err(SkipReason::NoStore);
        }
        if directives.no_cache() || directives.no_cache_equivalent(&self.no_cache_equivalence) {
            return Err(SkipReason::NoCache);
        }
        if directives.private() && !self.cache_private_responses {
            return Err(SkipReason::Private);
        }
        if self.max_body_size.is_some_and(|max| body_len > max) {
            return Err(SkipReason::BodyTooLarge);
        }
        Ok(())
    }

    /// Determines whether the request method is cacheable.
    pub fn should_cache_method(&self, method: &Method) -> bool {
        if let Some(predicate) = &self.method_predicate {
            predicate(method)
        } else {
            matches!(method, &Method::GET | &Method::HEAD)
        }
    }

    pub fn cache_private_responses(&self) -> bool {
        self.cache_private_responses
    }

    pub fn no_cache_equivalence(&self) -> &NoCacheEquivalence {
        &self.no_cache_equivalence
    }

    pub fn revalidation_failure(&self) -> RevalidationFailure {
        self.revalidation_failure
    }

    pub fn hit_header(&self) -> &HeaderName {
        &self.hit_header
    }

    /// Returns whether `Cache-Control`/`Pragma` headers on requests are honored.
    pub fn respect_request_cache_control(&self) -> bool {
        self.respect_request_cache_control
    }

    pub fn max_body_size(&self) -> Option<usize> {
        self.max_body_size
    }

    pub fn event_log(&self) -> &EventLogConfig {
        &self.event_log
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn with_cache_private_responses(mut self, enabled: bool) -> Self {
        self.cache_private_responses = enabled;
        self
    }

    pub fn with_no_cache_equivalence(mut self, rule: NoCacheEquivalence) -> Self {
        self.no_cache_equivalence = rule;
        self
    }

    pub fn with_revalidation_failure(mut self, mode: RevalidationFailure) -> Self {
        self.revalidation_failure = mode;
        self
    }

    pub fn with_hit_header(mut self, name: HeaderName) -> Self {
        self.hit_header = name;
        self
    }

    pub fn with_respect_request_cache_control(mut self, enabled: bool) -> Self {
        self.respect_request_cache_control = enabled;
        self
    }

    pub fn with_max_body_size(mut self, size: Option<usize>) -> Self {
        self.max_body_size = size;
        self
    }

    pub fn with_method_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Method) -> bool + Send + Sync + 'static,
    {
        self.method_predicate = Some(Arc::new(predicate));
        self
    }

    pub fn with_event_log(mut self, config: EventLogConfig) -> Self {
        self.event_log = config;
        self
    }

    pub fn with_clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            cache_private_responses: false,
            no_cache_equivalence: NoCacheEquivalence::default(),
            revalidation_failure: RevalidationFailure::default(),
            hit_header: HeaderName::from_static(DEFAULT_HIT_HEADER),
            respect_request_cache_control: true,
            max_body_size: None,
            method_predicate: None,
            event_log: EventLogConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Named `no-cache` equivalence rules usable from configuration files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquivalenceSetting {
    #[default]
    RevalidateAtZeroMaxAge,
    ZeroMaxAge,
    Never,
}

impl From<EquivalenceSetting> for NoCacheEquivalence {
    fn from(setting: EquivalenceSetting) -> Self {
        match setting {
            EquivalenceSetting::RevalidateAtZeroMaxAge => NoCacheEquivalence::RevalidateAtZeroMaxAge,
            EquivalenceSetting::ZeroMaxAge => NoCacheEquivalence::ZeroMaxAge,
            EquivalenceSetting::Never => NoCacheEquivalence::Never,
        }
    }
}

/// Plain, deserializable cache settings.
///
/// ```
/// use tower_http_revalidate::policy::CacheSettings;
///
/// let settings: CacheSettings = serde_json::from_str(
///     r#"{ "cache_private_responses": true, "methods": ["GET"] }"#,
/// ).unwrap();
/// let policy = settings.into_policy().unwrap();
/// assert!(policy.cache_private_responses());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub cache_private_responses: bool,
    pub no_cache_equivalence: EquivalenceSetting,
    pub revalidation_failure: RevalidationFailure,
    pub hit_header: String,
    pub respect_request_cache_control: bool,
    pub max_body_size: Option<usize>,
    pub methods: Vec<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            cache_private_responses: false,
            no_cache_equivalence: EquivalenceSetting::default(),
            revalidation_failure: RevalidationFailure::default(),
            hit_header: DEFAULT_HIT_HEADER.to_owned(),
            respect_request_cache_control: true,
            max_body_size: None,
            methods: vec!["GET".to_owned(), "HEAD".to_owned()],
        }
    }
}

impl CacheSettings {
    /// Validates the settings and builds a [`CachePolicy`] from them.
    pub fn into_policy(self) -> Result<CachePolicy, CacheError> {
        let hit_header = HeaderName::from_bytes(self.hit_header.as_bytes())
            .map_err(|err| CacheError::Config(format!("hit_header: {err}")))?;

        let methods = self
            .methods
            .iter()
            .map(|method| {
                Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                    .map_err(|err| CacheError::Config(format!("method `{method}`: {err}")))
            })
            .collect::<Result<HashSet<_>, _>>()?;

        Ok(CachePolicy::default()
            .with_cache_private_responses(self.cache_private_responses)
            .with_no_cache_equivalence(self.no_cache_equivalence.into())
            .with_revalidation_failure(self.revalidation_failure)
            .with_hit_header(hit_header)
            .with_respect_request_cache_control(self.respect_request_cache_control)
            .with_max_body_size(self.max_body_size)
            .with_method_predicate(move |method| methods.contains(method)))
    }
}
