//! Freshness classification of stored responses.
//!
//! A [`FreshnessPipeline`] is an ordered list of [`FreshnessRule`]s. Each rule
//! either settles the classification or declines, handing the decision to the
//! next rule. When every rule declines the response is
//! [`Freshness::Transparent`]: it carries no signal the cache can act on.
//!
//! The standard order is:
//!
//! 1. [`MandatoryRevalidation`]: `no-cache` (or an equivalent combination)
//!    always means stale.
//! 2. [`AgeRule`]: `max-age` compared against the `Age` header.
//! 3. [`MaxAgeRule`]: `max-age` added to the `Date` header.
//! 4. [`ExpiresRule`]: `Expires` compared against `Date`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;

use crate::clock::Clock;
use crate::directives::{CacheControl, NoCacheEquivalence};
use crate::headers;

/// Classification of a stored response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Freshness {
    /// May be served without contacting the origin.
    Fresh,
    /// Must be revalidated before it is served.
    Stale,
    /// No cache signal at all; the cache offers no opinion.
    Transparent,
}

impl Freshness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Freshness::Fresh => "fresh",
            Freshness::Stale => "stale",
            Freshness::Transparent => "transparent",
        }
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of the freshness pipeline.
///
/// Returning `None` passes the decision on to the next rule.
pub trait FreshnessRule: Send + Sync + 'static {
    fn evaluate(
        &self,
        headers: &HeaderMap,
        directives: &CacheControl,
        clock: &dyn Clock,
    ) -> Option<Freshness>;

    /// Short identifier used in diagnostics.
    fn name(&self) -> &'static str;
}

/// `no-cache`, or a directive combination treated like it, forces revalidation
/// regardless of any timing signal.
#[derive(Debug, Clone, Default)]
pub struct MandatoryRevalidation {
    equivalence: NoCacheEquivalence,
}

impl MandatoryRevalidation {
    pub fn new(equivalence: NoCacheEquivalence) -> Self {
        Self { equivalence }
    }
}

impl FreshnessRule for MandatoryRevalidation {
    fn evaluate(
        &self,
        _headers: &HeaderMap,
        directives: &CacheControl,
        _clock: &dyn Clock,
    ) -> Option<Freshness> {
        if directives.no_cache() || directives.no_cache_equivalent(&self.equivalence) {
            Some(Freshness::Stale)
        } else {
            None
        }
    }

    fn name(&self) -> &'static str {
        "mandatory_revalidation"
    }
}

/// Fresh while `max-age - Age > 0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgeRule;

impl FreshnessRule for AgeRule {
    fn evaluate(
        &self,
        headers: &HeaderMap,
        directives: &CacheControl,
        _clock: &dyn Clock,
    ) -> Option<Freshness> {
        let max_age = directives.max_age().ok()?;
        let age = headers::age(headers).ok()?;

        if max_age.saturating_sub(age) > 0 {
            Some(Freshness::Fresh)
        } else {
            Some(Freshness::Stale)
        }
    }

    fn name(&self) -> &'static str {
        "age"
    }
}

/// Fresh while `now < Date + max-age`.
///
/// A usable `max-age` without a usable `Date` is stale: freshness is never
/// assumed without a timestamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxAgeRule;

impl FreshnessRule for MaxAgeRule {
    fn evaluate(
        &self,
        headers: &HeaderMap,
        directives: &CacheControl,
        clock: &dyn Clock,
    ) -> Option<Freshness> {
        let max_age = directives.max_age().ok()?;

        let Ok(date) = headers::date(headers) else {
            return Some(Freshness::Stale);
        };
        if max_age <= 0 {
            return Some(Freshness::Stale);
        }

        let fresh_until = date.checked_add(Duration::from_secs(max_age.unsigned_abs()));
        match fresh_until {
            Some(fresh_until) if clock.now() < fresh_until => Some(Freshness::Fresh),
            Some(_) => Some(Freshness::Stale),
            // max-age beyond the representable range never runs out
            None => Some(Freshness::Fresh),
        }
    }

    fn name(&self) -> &'static str {
        "max_age"
    }
}

/// Fresh when `Expires >= Date`. Declines unless both headers parse.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpiresRule;

impl FreshnessRule for ExpiresRule {
    fn evaluate(
        &self,
        headers: &HeaderMap,
        _directives: &CacheControl,
        _clock: &dyn Clock,
    ) -> Option<Freshness> {
        let expires = headers::expires(headers).ok()?;
        let date = headers::date(headers).ok()?;

        if expires >= date {
            Some(Freshness::Fresh)
        } else {
            Some(Freshness::Stale)
        }
    }

    fn name(&self) -> &'static str {
        "expires"
    }
}

/// Ordered chain of [`FreshnessRule`]s.
#[derive(Clone)]
pub struct FreshnessPipeline {
    rules: Vec<Arc<dyn FreshnessRule>>,
}

impl FreshnessPipeline {
    /// Builds a pipeline from an explicit rule order.
    pub fn new(rules: Vec<Arc<dyn FreshnessRule>>) -> Self {
        Self { rules }
    }

    /// The RFC 7234 rule order with the given `no-cache` equivalence.
    pub fn standard(equivalence: NoCacheEquivalence) -> Self {
        Self::new(vec![
            Arc::new(MandatoryRevalidation::new(equivalence)),
            Arc::new(AgeRule),
            Arc::new(MaxAgeRule),
            Arc::new(ExpiresRule),
        ])
    }

    /// Classifies a response with pre-parsed directives.
    pub fn evaluate(
        &self,
        headers: &HeaderMap,
        directives: &CacheControl,
        clock: &dyn Clock,
    ) -> Freshness {
        for rule in &self.rules {
            if let Some(freshness) = rule.evaluate(headers, directives, clock) {
                #[cfg(feature = "tracing")]
                tracing::trace!(rule = rule.name(), %freshness, "freshness decided");
                return freshness;
            }
        }
        Freshness::Transparent
    }

    /// Parses `Cache-Control` from `headers` and classifies the response.
    pub fn classify(&self, headers: &HeaderMap, clock: &dyn Clock) -> Freshness {
        let directives = CacheControl::from_headers(headers);
        self.evaluate(headers, &directives, clock)
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }
}

impl Default for FreshnessPipeline {
    fn default() -> Self {
        Self::standard(NoCacheEquivalence::default())
    }
}

impl fmt::Debug for FreshnessPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreshnessPipeline")
            .field("rules", &self.rule_names())
            .finish()
    }
}
