//! Getter methods for `FetchConfig`

use std::path::PathBuf;
use std::time::Duration;

use super::types::FetchConfig;
use crate::driver::WaitUntil;

impl FetchConfig {
    #[must_use]
    pub fn concurrent_pages(&self) -> usize {
        self.concurrent_pages
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    #[must_use]
    pub fn use_http_fallback(&self) -> bool {
        self.use_http_fallback
    }

    #[must_use]
    pub fn use_headed_mode_fallback(&self) -> bool {
        self.use_headed_mode_fallback
    }

    #[must_use]
    pub fn default_fast_mode(&self) -> bool {
        self.default_fast_mode
    }

    #[must_use]
    pub fn simulate_human_behavior(&self) -> bool {
        self.simulate_human_behavior
    }

    #[must_use]
    pub fn max_browsers(&self) -> usize {
        self.max_browsers
    }

    #[must_use]
    pub fn max_pages_per_context(&self) -> usize {
        self.max_pages_per_context
    }

    #[must_use]
    pub fn max_browser_age(&self) -> Duration {
        Duration::from_millis(self.max_browser_age_ms)
    }

    #[must_use]
    pub fn max_idle_time(&self) -> Duration {
        Duration::from_millis(self.max_idle_time_ms)
    }

    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    #[must_use]
    pub fn pool_blocked_domains(&self) -> &[String] {
        &self.pool_blocked_domains
    }

    #[must_use]
    pub fn pool_blocked_resource_types(&self) -> &[String] {
        &self.pool_blocked_resource_types
    }

    #[must_use]
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    #[must_use]
    pub fn use_headed_mode(&self) -> bool {
        self.use_headed_mode
    }

    #[must_use]
    pub fn markdown(&self) -> bool {
        self.markdown
    }

    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    #[must_use]
    pub fn wait_until(&self) -> WaitUntil {
        self.wait_until
    }

    #[must_use]
    pub fn executable_path(&self) -> Option<&PathBuf> {
        self.executable_path.as_ref()
    }
}
