use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Gate counters for monitoring
#[derive(Clone)]
pub struct Metrics {
    pub logins_succeeded: Arc<AtomicU64>,
    pub logins_failed: Arc<AtomicU64>,
    pub throttled_attempts: Arc<AtomicU64>,
    pub csrf_rejections: Arc<AtomicU64>,
    pub sessions_refreshed: Arc<AtomicU64>,
    pub downloads_served: Arc<AtomicU64>,
    pub quota_rejections: Arc<AtomicU64>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            logins_succeeded: Arc::new(AtomicU64::new(0)),
            logins_failed: Arc::new(AtomicU64::new(0)),
            throttled_attempts: Arc::new(AtomicU64::new(0)),
            csrf_rejections: Arc::new(AtomicU64::new(0)),
            sessions_refreshed: Arc::new(AtomicU64::new(0)),
            downloads_served: Arc::new(AtomicU64::new(0)),
            quota_rejections: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_logins_succeeded(&self) {
        self.logins_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a failed attempt; `count` is the throttle counter after it.
    pub fn inc_logins_failed(&self, count: u32) {
        self.logins_failed.fetch_add(1, Ordering::Relaxed);
        if crate::throttle::penalty_for(count) > std::time::Duration::ZERO {
            self.throttled_attempts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_csrf_rejections(&self) {
        self.csrf_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sessions_refreshed(&self) {
        self.sessions_refreshed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_downloads_served(&self) {
        self.downloads_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_quota_rejections(&self) {
        self.quota_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            logins_succeeded: self.logins_succeeded.load(Ordering::Relaxed),
            logins_failed: self.logins_failed.load(Ordering::Relaxed),
            throttled_attempts: self.throttled_attempts.load(Ordering::Relaxed),
            csrf_rejections: self.csrf_rejections.load(Ordering::Relaxed),
            sessions_refreshed: self.sessions_refreshed.load(Ordering::Relaxed),
            downloads_served: self.downloads_served.load(Ordering::Relaxed),
            quota_rejections: self.quota_rejections.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub logins_succeeded: u64,
    pub logins_failed: u64,
    pub throttled_attempts: u64,
    pub csrf_rejections: u64,
    pub sessions_refreshed: u64,
    pub downloads_served: u64,
    pub quota_rejections: u64,
    pub uptime_seconds: u64,
}
