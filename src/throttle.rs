//! Login brute-force throttle.
//!
//! Failed attempts are counted per key (client host + attempted username) in a
//! bounded LRU cache. Each failure delays the failing request according to
//! [`penalty_for`]; a success removes the key. Once the cache is full the least
//! recently used key is forgotten.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;

/// Default number of keys remembered.
pub const DEFAULT_CAPACITY: usize = 100;

/// Delay imposed after the `count`-th failed attempt on a key.
///
/// Attempts 1-2 are free, 3-5 cost ten seconds, and from the sixth on the
/// penalty grows by a minute per attempt without bound.
pub fn penalty_for(count: u32) -> Duration {
    match count {
        0..=2 => Duration::ZERO,
        3..=5 => Duration::from_secs(10),
        n => Duration::from_secs(60 * u64::from(n - 5)),
    }
}

/// Throttle key for `username` attempted from `host`.
pub fn key_for(host: &str, username: &str) -> String {
    format!("{}{}", host, username)
}

#[derive(Clone)]
pub struct BruteForceThrottle {
    attempts: Arc<Mutex<LruCache<String, u32>>>,
}

impl Default for BruteForceThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BruteForceThrottle {
    /// A throttle remembering at most `capacity` keys (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { attempts: Arc::new(Mutex::new(LruCache::new(capacity))) }
    }

    /// Records a failed attempt for `key` and returns its new count without
    /// waiting.
    pub fn record(&self, key: &str) -> u32 {
        let mut attempts = self.lock();
        let count = attempts.get(key).copied().unwrap_or(0).saturating_add(1);
        attempts.put(key.to_string(), count);
        count
    }

    /// Records a failed attempt for `key`, then holds the caller for the
    /// penalty earned by the new count. The delay is not cancellable.
    pub async fn penalize(&self, key: &str) -> u32 {
        let count = self.record(key);
        let delay = penalty_for(count);
        if !delay.is_zero() {
            tracing::warn!(count, delay_secs = delay.as_secs(), "Throttling repeated failures");
            tokio::time::sleep(delay).await;
        }
        count
    }

    /// Forgets `key` entirely.
    pub fn reset(&self, key: &str) {
        self.lock().pop(key);
    }

    /// Current count for `key` without touching its recency.
    pub fn count(&self, key: &str) -> Option<u32> {
        self.lock().peek(key).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, u32>> {
        // Counters stay meaningful even if a holder panicked mid-update.
        self.attempts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
