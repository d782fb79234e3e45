pub mod browser_pool;
pub mod config;
pub mod content;
pub mod driver;
pub mod fetch_engine;
pub mod fetch_events;
pub mod utils;

pub use browser_pool::{
    BrowserMode, InstancePool, ManagedInstance, PoolConfig, PoolError, PoolStats, PooledPage,
};
pub use config::{FetchConfig, FetchConfigBuilder, FetchOptions, resolve_config};
pub use content::{HtmdConverter, MarkdownConverter};
pub use driver::{BrowserDriver, ChromiumDriver, DriverError};
pub use fetch_engine::{
    ContentType, FetchError, FetchErrorKind, FetchOrchestrator, FetchResult, FetchSource,
    HttpFetcher, ReqwestFetcher, ResultCache,
};
pub use fetch_events::{FetchEvent, FetchMetrics, FetchObserver, TracingObserver};

/// One-shot fetch with a throwaway orchestrator
///
/// Launches and tears down its own browser pool; hold a [`FetchOrchestrator`]
/// to reuse browsers and the cache across calls.
pub async fn fetch(url: &str, config: FetchConfig) -> Result<FetchResult, FetchError> {
    let orchestrator =
        FetchOrchestrator::new(config).map_err(|e| FetchError::FetchFailed(e.to_string()))?;
    let result = orchestrator.fetch(url, &FetchOptions::default()).await;
    orchestrator.cleanup().await;
    result
}
