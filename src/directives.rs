//! `Cache-Control` parsing.
//!
//! [`CacheControl`] turns every `Cache-Control` occurrence of a header map
//! into a single directive set. Lookups are pure; a parsed set can be queried
//! any number of times.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::header::CACHE_CONTROL;
use http::HeaderMap;

use crate::error::HeaderError;

const MAX_AGE: &str = "max-age";
const PUBLIC: &str = "public";
const PRIVATE: &str = "private";
const NO_STORE: &str = "no-store";
const NO_CACHE: &str = "no-cache";
const MUST_REVALIDATE: &str = "must-revalidate";
const PROXY_REVALIDATE: &str = "proxy-revalidate";

/// Parsed `Cache-Control` directives.
///
/// Names are lower-cased. Directives without a value (`no-store`) map to an
/// empty string. When a directive appears more than once, the last
/// occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    directives: HashMap<String, String>,
    present: bool,
}

impl CacheControl {
    /// Collects the directives of every `Cache-Control` header in `headers`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut cache_control = Self::default();
        for value in headers.get_all(CACHE_CONTROL) {
            cache_control.present = true;
            if let Ok(value) = value.to_str() {
                cache_control.extend(value);
            }
        }
        cache_control
    }

    /// Parses a single header value.
    pub fn parse(value: &str) -> Self {
        let mut cache_control = Self {
            present: true,
            ..Self::default()
        };
        cache_control.extend(value);
        cache_control
    }

    fn extend(&mut self, value: &str) {
        for token in value.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }

            let (name, value) = match token.split_once('=') {
                Some((name, value)) => (name.trim(), unquote(value.trim())),
                None => (token, ""),
            };
            if name.is_empty() {
                continue;
            }

            self.directives.insert(name.to_ascii_lowercase(), value.to_owned());
        }
    }

    /// Whether at least one `Cache-Control` header was seen, even an empty one.
    pub fn is_present(&self) -> bool {
        self.present
    }

    /// Raw value of a directive; `Some("")` for value-less directives.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.directives
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The `max-age` directive in seconds.
    pub fn max_age(&self) -> Result<i64, HeaderError> {
        let value = self
            .directives
            .get(MAX_AGE)
            .ok_or(HeaderError::MissingDirective(MAX_AGE))?;
        value
            .parse::<i64>()
            .map_err(|_| HeaderError::InvalidDirective {
                name: MAX_AGE,
                value: value.clone(),
            })
    }

    pub fn public(&self) -> bool {
        self.directives.contains_key(PUBLIC)
    }

    pub fn private(&self) -> bool {
        self.directives.contains_key(PRIVATE)
    }

    pub fn no_store(&self) -> bool {
        self.directives.contains_key(NO_STORE)
    }

    pub fn no_cache(&self) -> bool {
        self.directives.contains_key(NO_CACHE)
    }

    pub fn must_revalidate(&self) -> bool {
        self.directives.contains_key(MUST_REVALIDATE)
    }

    pub fn proxy_revalidate(&self) -> bool {
        self.directives.contains_key(PROXY_REVALIDATE)
    }

    /// Whether the directives demand revalidation without a literal `no-cache`.
    pub fn no_cache_equivalent(&self, rule: &NoCacheEquivalence) -> bool {
        rule.matches(self)
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.directives
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(value)
}

type EquivalenceFn = Arc<dyn Fn(&CacheControl) -> bool + Send + Sync>;

/// Decides which directive combinations count as `no-cache`.
///
/// The default, [`NoCacheEquivalence::RevalidateAtZeroMaxAge`], requires
/// `must-revalidate` or `proxy-revalidate` together with `max-age <= 0`.
#[derive(Clone, Default)]
pub enum NoCacheEquivalence {
    #[default]
    RevalidateAtZeroMaxAge,
    /// Any `max-age <= 0`, with or without a revalidation directive.
    ZeroMaxAge,
    /// Only a literal `no-cache` forces revalidation.
    Never,
    Custom(EquivalenceFn),
}

impl NoCacheEquivalence {
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&CacheControl) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    pub fn matches(&self, directives: &CacheControl) -> bool {
        let expired = || directives.max_age().is_ok_and(|max_age| max_age <= 0);
        match self {
            Self::RevalidateAtZeroMaxAge => {
                (directives.must_revalidate() || directives.proxy_revalidate()) && expired()
            }
            Self::ZeroMaxAge => expired(),
            Self::Never => false,
            Self::Custom(predicate) => predicate(directives),
        }
    }
}

impl fmt::Debug for NoCacheEquivalence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RevalidateAtZeroMaxAge => f.write_str("RevalidateAtZeroMaxAge"),
            Self::ZeroMaxAge => f.write_str("ZeroMaxAge"),
            Self::Never => f.write_str("Never"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
