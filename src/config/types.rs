//! Core configuration type for fetching
//!
//! `FetchConfig` holds every recognized option of the fetch engine. Durations
//! are stored as integer milliseconds so the struct serializes cleanly; use
//! the getters in `getters.rs` for `Duration` values.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::driver::WaitUntil;
use crate::utils::DEFAULT_BLOCKED_RESOURCE_TYPES;

/// Main configuration struct for the fetch engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Size of the render concurrency limiter
    pub(crate) concurrent_pages: usize,
    /// Render-retry budget; excludes the one free fast-to-thorough escalation
    pub(crate) max_retries: u32,
    /// Fixed wait between retries, also used before the pool-init retry
    pub(crate) retry_delay_ms: u64,
    /// Result cache TTL; 0 disables caching
    pub(crate) cache_ttl_ms: u64,
    pub(crate) use_http_fallback: bool,
    /// Escalate to headed mode on the third render attempt or for flagged domains
    pub(crate) use_headed_mode_fallback: bool,
    pub(crate) default_fast_mode: bool,
    pub(crate) simulate_human_behavior: bool,

    pub(crate) max_browsers: usize,
    pub(crate) max_pages_per_context: usize,
    pub(crate) max_browser_age_ms: u64,
    pub(crate) max_idle_time_ms: u64,
    pub(crate) health_check_interval_ms: u64,
    /// Hosts (and their subdomains) whose requests are aborted
    pub(crate) pool_blocked_domains: Vec<String>,
    /// Resource type names aborted at the context level
    pub(crate) pool_blocked_resource_types: Vec<String>,
    pub(crate) proxy: Option<String>,
    /// Force headed mode for every render
    pub(crate) use_headed_mode: bool,
    /// Return Markdown instead of HTML
    pub(crate) markdown: bool,

    pub(crate) navigation_timeout_ms: u64,
    pub(crate) http_timeout_ms: u64,
    pub(crate) wait_until: WaitUntil,
    pub(crate) executable_path: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrent_pages: 4,
            max_retries: 2,
            retry_delay_ms: 1_000,
            cache_ttl_ms: 300_000,
            use_http_fallback: true,
            use_headed_mode_fallback: false,
            default_fast_mode: true,
            simulate_human_behavior: true,
            max_browsers: 2,
            max_pages_per_context: 4,
            max_browser_age_ms: 30 * 60 * 1_000,
            max_idle_time_ms: 5 * 60 * 1_000,
            health_check_interval_ms: 30_000,
            pool_blocked_domains: Vec::new(),
            pool_blocked_resource_types: DEFAULT_BLOCKED_RESOURCE_TYPES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            proxy: None,
            use_headed_mode: false,
            markdown: false,
            navigation_timeout_ms: 30_000,
            http_timeout_ms: 10_000,
            wait_until: WaitUntil::Load,
            executable_path: None,
        }
    }
}
