use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{FetchEvent, FetchObserver};

/// Counters for fetch events using lock-free atomic operations.
///
/// All counters use `Ordering::SeqCst` so snapshot reads are coherent.
/// Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct FetchMetrics {
    pub cache_hits: Arc<AtomicU64>,
    pub cache_misses: Arc<AtomicU64>,
    pub cache_discards: Arc<AtomicU64>,
    pub http_successes: Arc<AtomicU64>,
    pub http_fallthroughs: Arc<AtomicU64>,
    pub pool_inits: Arc<AtomicU64>,
    pub pool_init_retries: Arc<AtomicU64>,
    pub render_attempts: Arc<AtomicU64>,
    pub render_failures: Arc<AtomicU64>,
    pub escalations: Arc<AtomicU64>,
    pub headed_renders: Arc<AtomicU64>,
    pub successes: Arc<AtomicU64>,
    pub failures: Arc<AtomicU64>,
    pub absorbed_errors: Arc<AtomicU64>,
}

impl FetchMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record(&self, event: &FetchEvent) {
        match event {
            FetchEvent::CacheHit { .. } => Self::bump(&self.cache_hits),
            FetchEvent::CacheMiss { .. } => Self::bump(&self.cache_misses),
            FetchEvent::CacheDiscarded { .. } => Self::bump(&self.cache_discards),
            FetchEvent::HttpFallbackSucceeded { .. } => Self::bump(&self.http_successes),
            FetchEvent::HttpFallbackSkipped { .. } => Self::bump(&self.http_fallthroughs),
            FetchEvent::PoolInitialized { .. } => Self::bump(&self.pool_inits),
            FetchEvent::PoolInitRetry { .. } => Self::bump(&self.pool_init_retries),
            FetchEvent::RenderAttemptStarted { .. } => Self::bump(&self.render_attempts),
            FetchEvent::RenderAttemptFailed { .. } => Self::bump(&self.render_failures),
            FetchEvent::FastModeEscalated { .. } => Self::bump(&self.escalations),
            FetchEvent::HeadedModeSelected { .. } => Self::bump(&self.headed_renders),
            FetchEvent::FetchSucceeded { .. } => Self::bump(&self.successes),
            FetchEvent::FetchFailed { .. } => Self::bump(&self.failures),
            FetchEvent::ResourceErrorAbsorbed { .. } => Self::bump(&self.absorbed_errors),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> FetchMetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::SeqCst);
        FetchMetricsSnapshot {
            cache_hits: load(&self.cache_hits),
            cache_misses: load(&self.cache_misses),
            cache_discards: load(&self.cache_discards),
            http_successes: load(&self.http_successes),
            http_fallthroughs: load(&self.http_fallthroughs),
            pool_inits: load(&self.pool_inits),
            pool_init_retries: load(&self.pool_init_retries),
            render_attempts: load(&self.render_attempts),
            render_failures: load(&self.render_failures),
            escalations: load(&self.escalations),
            headed_renders: load(&self.headed_renders),
            successes: load(&self.successes),
            failures: load(&self.failures),
            absorbed_errors: load(&self.absorbed_errors),
        }
    }
}

impl FetchObserver for FetchMetrics {
    fn on_event(&self, event: &FetchEvent) {
        self.record(event);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchMetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_discards: u64,
    pub http_successes: u64,
    pub http_fallthroughs: u64,
    pub pool_inits: u64,
    pub pool_init_retries: u64,
    pub render_attempts: u64,
    pub render_failures: u64,
    pub escalations: u64,
    pub headed_renders: u64,
    pub successes: u64,
    pub failures: u64,
    pub absorbed_errors: u64,
}

impl FetchMetricsSnapshot {
    #[must_use]
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / total as f64
    }

    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            return 1.0;
        }
        self.successes as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let metrics = FetchMetrics::new();
        let shared = metrics.clone();
        metrics.record(&FetchEvent::CacheHit {
            url: "https://a".into(),
        });
        shared.record(&FetchEvent::CacheMiss {
            url: "https://b".into(),
        });
        shared.record(&FetchEvent::FastModeEscalated {
            url: "https://b".into(),
        });
        shared.record(&FetchEvent::ResourceErrorAbsorbed {
            instance_id: 1,
            scope: crate::browser_pool::ResourceScope::Page,
            error: "target closed".into(),
        });

        let snap = metrics.snapshot();
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.cache_misses, 1);
        assert_eq!(snap.escalations, 1);
        assert_eq!(snap.absorbed_errors, 1);
        assert!((snap.cache_hit_rate() - 0.5).abs() < f64::EPSILON);
        assert!((snap.success_rate() - 1.0).abs() < f64::EPSILON);
    }
}
