use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::FetchConfig;
use crate::driver::{LaunchOptions, ResourceType};

/// Whether instances run with a visible UI surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserMode {
    #[default]
    Headless,
    Headed,
}

impl BrowserMode {
    #[must_use]
    pub fn from_headed(headed: bool) -> Self {
        if headed { Self::Headed } else { Self::Headless }
    }

    #[must_use]
    pub fn is_headless(self) -> bool {
        self == Self::Headless
    }
}

/// Configuration for the instance pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Single mode for every instance of this pool
    pub mode: BrowserMode,
    pub max_browsers: usize,
    pub max_pages_per_context: usize,
    pub max_browser_age: Duration,
    /// Idle instances are retired after this long, never below one instance
    pub max_idle_time: Duration,
    pub health_check_interval: Duration,
    pub blocked_domains: Vec<String>,
    pub blocked_resource_types: Vec<ResourceType>,
    /// Caller overrides merged on top of the pool's launch defaults
    pub launch_overrides: LaunchOptions,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_fetch_config(&FetchConfig::default(), BrowserMode::Headless)
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_fetch_config(config: &FetchConfig, mode: BrowserMode) -> Self {
        Self {
            mode,
            max_browsers: config.max_browsers().max(1),
            max_pages_per_context: config.max_pages_per_context().max(1),
            max_browser_age: config.max_browser_age(),
            max_idle_time: config.max_idle_time(),
            health_check_interval: config.health_check_interval(),
            blocked_domains: config.pool_blocked_domains().to_vec(),
            blocked_resource_types: config
                .pool_blocked_resource_types()
                .iter()
                .filter_map(|name| ResourceType::parse(name))
                .collect(),
            launch_overrides: LaunchOptions {
                headless: mode.is_headless(),
                proxy: config.proxy().map(str::to_string),
                executable_path: config.executable_path().cloned(),
                args: Vec::new(),
                request_timeout: None,
            },
        }
    }

    /// Pool defaults with the caller overrides merged on top
    #[must_use]
    pub fn launch_options(&self) -> LaunchOptions {
        let defaults = LaunchOptions {
            headless: self.mode.is_headless(),
            request_timeout: Some(Duration::from_secs(30)),
            ..LaunchOptions::default()
        };
        let mut merged = defaults.merged_with(&self.launch_overrides);
        // the pool's mode is authoritative
        merged.headless = self.mode.is_headless();
        merged
    }
}
