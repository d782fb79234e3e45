//! Per-call overrides and effective-config resolution
//!
//! Precedence, highest first: per-call [`FetchOptions`], the [`FetchConfig`]
//! the orchestrator was constructed with, then [`FetchConfig::default`].
//! The second and third layers are already folded together by the builder,
//! so resolution is a single pure overlay.

use serde::{Deserialize, Serialize};

use super::types::FetchConfig;
use crate::driver::WaitUntil;

/// Per-call overrides; `None` keeps the constructor value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    pub markdown: Option<bool>,
    /// Start in fast mode (heavy resources blocked, no interaction simulation)
    pub fast_mode: Option<bool>,
    pub use_http_fallback: Option<bool>,
    pub use_headed_mode: Option<bool>,
    pub simulate_human_behavior: Option<bool>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub navigation_timeout_ms: Option<u64>,
    pub wait_until: Option<WaitUntil>,
    /// Skip the cache lookup; a successful result is still stored
    pub bypass_cache: bool,
}

impl FetchOptions {
    #[must_use]
    pub fn markdown(mut self, enabled: bool) -> Self {
        self.markdown = Some(enabled);
        self
    }

    #[must_use]
    pub fn fast_mode(mut self, enabled: bool) -> Self {
        self.fast_mode = Some(enabled);
        self
    }

    #[must_use]
    pub fn use_http_fallback(mut self, enabled: bool) -> Self {
        self.use_http_fallback = Some(enabled);
        self
    }

    #[must_use]
    pub fn use_headed_mode(mut self, enabled: bool) -> Self {
        self.use_headed_mode = Some(enabled);
        self
    }

    #[must_use]
    pub fn bypass_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }
}

/// Overlay per-call options onto a constructor config
#[must_use]
pub fn resolve_config(base: &FetchConfig, options: &FetchOptions) -> FetchConfig {
    let mut effective = base.clone();
    if let Some(v) = options.markdown {
        effective.markdown = v;
    }
    if let Some(v) = options.fast_mode {
        effective.default_fast_mode = v;
    }
    if let Some(v) = options.use_http_fallback {
        effective.use_http_fallback = v;
    }
    if let Some(v) = options.use_headed_mode {
        effective.use_headed_mode = v;
    }
    if let Some(v) = options.simulate_human_behavior {
        effective.simulate_human_behavior = v;
    }
    if let Some(v) = options.max_retries {
        effective.max_retries = v;
    }
    if let Some(v) = options.retry_delay_ms {
        effective.retry_delay_ms = v;
    }
    if let Some(v) = options.navigation_timeout_ms {
        effective.navigation_timeout_ms = v;
    }
    if let Some(v) = options.wait_until {
        effective.wait_until = v;
    }
    effective
}
