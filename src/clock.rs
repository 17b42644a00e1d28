//! Time sources for freshness evaluation.
//!
//! Freshness rules never read the wall clock themselves; the current time is
//! always supplied through a [`Clock`] handed to the pipeline. Production code
//! uses [`SystemClock`]; tests pin time with [`FixedClock`].

use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

/// Supplies the current time to the cache.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> SystemTime;
}

/// [`Clock`] backed by [`SystemTime::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A manually driven [`Clock`].
///
/// Clones share the same instant, so a test can keep a handle and advance
/// time after the clock has been moved into a policy.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<RwLock<SystemTime>>,
}

impl FixedClock {
    pub fn new(now: SystemTime) -> Self {
        Self {
            now: Arc::new(RwLock::new(now)),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }

    pub fn set(&self, instant: SystemTime) {
        let mut now = self.now.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now = instant;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        *self.now.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
