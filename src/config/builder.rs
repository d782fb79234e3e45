//! Fluent builder for `FetchConfig`
//!
//! Every field has a default, so the builder starts from
//! [`FetchConfig::default`] and `build()` only validates.

use anyhow::{Result, anyhow};
use std::path::PathBuf;
use std::time::Duration;

use super::types::FetchConfig;
use crate::driver::{ResourceType, WaitUntil};

#[derive(Debug, Clone, Default)]
pub struct FetchConfigBuilder {
    config: FetchConfig,
}

impl FetchConfig {
    /// Create a builder for configuring a `FetchConfig` with a fluent interface
    ///
    /// # Example
    /// ```rust
    /// # use kodegen_tools_webfetch::config::FetchConfig;
    /// # fn main() -> anyhow::Result<()> {
    /// let config = FetchConfig::builder()
    ///     .max_browsers(1)
    ///     .max_retries(3)
    ///     .markdown(true)
    ///     .build()?;
    /// assert_eq!(config.max_retries(), 3);
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn builder() -> FetchConfigBuilder {
        FetchConfigBuilder::default()
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl FetchConfigBuilder {
    #[must_use]
    pub fn concurrent_pages(mut self, n: usize) -> Self {
        self.config.concurrent_pages = n;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay_ms = millis(delay);
        self
    }

    /// Set the result cache TTL; `Duration::ZERO` disables caching
    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl_ms = millis(ttl);
        self
    }

    #[must_use]
    pub fn use_http_fallback(mut self, enabled: bool) -> Self {
        self.config.use_http_fallback = enabled;
        self
    }

    #[must_use]
    pub fn use_headed_mode_fallback(mut self, enabled: bool) -> Self {
        self.config.use_headed_mode_fallback = enabled;
        self
    }

    #[must_use]
    pub fn default_fast_mode(mut self, enabled: bool) -> Self {
        self.config.default_fast_mode = enabled;
        self
    }

    #[must_use]
    pub fn simulate_human_behavior(mut self, enabled: bool) -> Self {
        self.config.simulate_human_behavior = enabled;
        self
    }

    #[must_use]
    pub fn max_browsers(mut self, n: usize) -> Self {
        self.config.max_browsers = n;
        self
    }

    #[must_use]
    pub fn max_pages_per_context(mut self, n: usize) -> Self {
        self.config.max_pages_per_context = n;
        self
    }

    #[must_use]
    pub fn max_browser_age(mut self, age: Duration) -> Self {
        self.config.max_browser_age_ms = millis(age);
        self
    }

    #[must_use]
    pub fn max_idle_time(mut self, idle: Duration) -> Self {
        self.config.max_idle_time_ms = millis(idle);
        self
    }

    #[must_use]
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.config.health_check_interval_ms = millis(interval);
        self
    }

    #[must_use]
    pub fn pool_blocked_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.pool_blocked_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn pool_blocked_resource_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.pool_blocked_resource_types = types.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy.into());
        self
    }

    #[must_use]
    pub fn use_headed_mode(mut self, enabled: bool) -> Self {
        self.config.use_headed_mode = enabled;
        self
    }

    #[must_use]
    pub fn markdown(mut self, enabled: bool) -> Self {
        self.config.markdown = enabled;
        self
    }

    #[must_use]
    pub fn navigation_timeout(mut self, timeout: Duration) -> Self {
        self.config.navigation_timeout_ms = millis(timeout);
        self
    }

    #[must_use]
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.config.http_timeout_ms = millis(timeout);
        self
    }

    #[must_use]
    pub fn wait_until(mut self, wait_until: WaitUntil) -> Self {
        self.config.wait_until = wait_until;
        self
    }

    #[must_use]
    pub fn executable_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.executable_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<FetchConfig> {
        let config = self.config;
        if config.max_browsers == 0 {
            return Err(anyhow!("max_browsers must be at least 1"));
        }
        if config.max_pages_per_context == 0 {
            return Err(anyhow!("max_pages_per_context must be at least 1"));
        }
        if config.concurrent_pages == 0 {
            return Err(anyhow!("concurrent_pages must be at least 1"));
        }
        if let Some(unknown) = config
            .pool_blocked_resource_types
            .iter()
            .find(|name| ResourceType::parse(name).is_none())
        {
            return Err(anyhow!("Unknown resource type '{unknown}'"));
        }
        Ok(config)
    }
}
