//! Typed observability hook for the fetch pipeline
//!
//! Every routing decision and absorbed failure is published as a
//! [`FetchEvent`] so that failure paths can be asserted in tests and counted
//! in production instead of vanishing into log lines.

pub mod metrics;

pub use metrics::{FetchMetrics, FetchMetricsSnapshot};

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::browser_pool::{BrowserMode, ResourceScope};
use crate::fetch_engine::{FetchErrorKind, FetchSource};

#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    CacheHit {
        url: String,
    },
    CacheMiss {
        url: String,
    },
    /// Cached entry had the wrong content type and was dropped
    CacheDiscarded {
        url: String,
    },
    HttpFallbackSucceeded {
        url: String,
        status_code: u16,
    },
    /// HTTP fallback did not produce a result; rendering takes over
    HttpFallbackSkipped {
        url: String,
        kind: FetchErrorKind,
        reason: String,
    },
    PoolInitialized {
        mode: BrowserMode,
    },
    PoolInitRetry {
        url: String,
        error: String,
    },
    RenderAttemptStarted {
        url: String,
        attempt: u32,
        fast_mode: bool,
        mode: BrowserMode,
    },
    RenderAttemptFailed {
        url: String,
        attempt: u32,
        kind: FetchErrorKind,
        error: String,
    },
    FastModeEscalated {
        url: String,
    },
    HeadedModeSelected {
        url: String,
        domain_flagged: bool,
    },
    FetchSucceeded {
        url: String,
        source: FetchSource,
        elapsed: Duration,
    },
    FetchFailed {
        url: String,
        kind: FetchErrorKind,
        error: String,
    },
    /// A page, context, browser or interceptor error that did not fail the fetch
    ResourceErrorAbsorbed {
        instance_id: u64,
        scope: ResourceScope,
        error: String,
    },
}

/// Receives every event published by a fetch orchestrator
pub trait FetchObserver: Send + Sync {
    fn on_event(&self, event: &FetchEvent);
}

/// Observer that forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl FetchObserver for TracingObserver {
    fn on_event(&self, event: &FetchEvent) {
        match event {
            FetchEvent::CacheHit { url } => debug!(url = %url, "Cache hit"),
            FetchEvent::CacheMiss { url } => debug!(url = %url, "Cache miss"),
            FetchEvent::CacheDiscarded { url } => {
                debug!(url = %url, "Discarded cached entry with mismatched content type");
            }
            FetchEvent::HttpFallbackSucceeded { url, status_code } => {
                info!(url = %url, status_code, "Fetched via HTTP fallback");
            }
            FetchEvent::HttpFallbackSkipped { url, kind, reason } => {
                debug!(url = %url, ?kind, "HTTP fallback fell through: {}", reason);
            }
            FetchEvent::PoolInitialized { mode } => info!(?mode, "Browser pool ready"),
            FetchEvent::PoolInitRetry { url, error } => {
                warn!(url = %url, "Browser pool initialization failed, retrying: {}", error);
            }
            FetchEvent::RenderAttemptStarted {
                url,
                attempt,
                fast_mode,
                mode,
            } => debug!(url = %url, attempt, fast_mode, ?mode, "Render attempt"),
            FetchEvent::RenderAttemptFailed {
                url,
                attempt,
                kind,
                error,
            } => warn!(url = %url, attempt, ?kind, "Render attempt failed: {}", error),
            FetchEvent::FastModeEscalated { url } => {
                debug!(url = %url, "Escalating to thorough mode");
            }
            FetchEvent::HeadedModeSelected {
                url,
                domain_flagged,
            } => info!(url = %url, domain_flagged, "Using headed browser"),
            FetchEvent::FetchSucceeded {
                url,
                source,
                elapsed,
            } => info!(url = %url, ?source, elapsed_ms = elapsed.as_millis() as u64, "Fetch succeeded"),
            FetchEvent::FetchFailed { url, kind, error } => {
                warn!(url = %url, ?kind, "Fetch failed: {}", error);
            }
            FetchEvent::ResourceErrorAbsorbed {
                instance_id,
                scope,
                error,
            } => debug!(instance_id, ?scope, "Absorbed browser error: {}", error),
        }
    }
}
