//! Top-level fetch orchestration
//!
//! Sequences, per URL:
//! - Result cache lookup
//! - Cheap HTTP attempt
//! - Pooled browser rendering, fast mode first, then thorough
//! - Escalation to a headed pool after repeated failures or for flagged domains
//!
//! Retries run as a loop over [`RetryState`]; every routing decision is
//! published as a [`FetchEvent`].

use dashmap::DashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info};

use super::cache::ResultCache;
use super::errors::FetchError;
use super::fetch_types::{ContentType, FetchResult};
use super::http_fallback::{HttpFetcher, ReqwestFetcher, attempt_http_fallback};
use super::output::convert_in_place;
use super::render::{RenderSettings, render_fetch};
use super::retry_state::{RetryDecision, RetryState};
use crate::browser_pool::{
    AbsorbedError, AbsorbedErrorHook, BrowserMode, InstancePool, PoolConfig, PoolStats,
};
use crate::config::{FetchConfig, FetchOptions, resolve_config};
use crate::content::{HtmdConverter, MarkdownConverter};
use crate::driver::{BrowserDriver, ChromiumDriver};
use crate::fetch_events::{
    FetchEvent, FetchMetrics, FetchMetricsSnapshot, FetchObserver, TracingObserver,
};
use crate::utils::{extract_domain, is_valid_url};

/// Why one pass through the render loop ended without a result
enum AttemptError {
    /// Routed through the retry budget
    Render(FetchError),
    /// Ends the call as is
    Terminal(FetchError),
}

/// Resilient fetcher owning its cache, its browser pool and its collaborators
///
/// The pool is created lazily on the first render and recreated when a fetch
/// needs the other browser mode. Call [`FetchOrchestrator::cleanup`] when done.
pub struct FetchOrchestrator {
    config: FetchConfig,
    driver: Arc<dyn BrowserDriver>,
    http: Arc<dyn HttpFetcher>,
    converter: Arc<dyn MarkdownConverter>,
    cache: ResultCache,
    pool: Mutex<Option<Arc<InstancePool>>>,
    /// Bounds render attempts in flight across all URLs
    render_limiter: Semaphore,
    headed_domains: DashSet<String>,
    observers: Vec<Arc<dyn FetchObserver>>,
    metrics: FetchMetrics,
    next_fetch_id: AtomicU64,
}

impl FetchOrchestrator {
    /// Orchestrator backed by Chromium, reqwest and htmd
    pub fn new(config: FetchConfig) -> anyhow::Result<Self> {
        Ok(Self::with_components(
            config,
            Arc::new(ChromiumDriver),
            Arc::new(ReqwestFetcher::new()?),
            Arc::new(HtmdConverter),
        ))
    }

    #[must_use]
    pub fn with_components(
        config: FetchConfig,
        driver: Arc<dyn BrowserDriver>,
        http: Arc<dyn HttpFetcher>,
        converter: Arc<dyn MarkdownConverter>,
    ) -> Self {
        let cache = ResultCache::new(config.cache_ttl());
        let render_limiter = Semaphore::new(config.concurrent_pages().max(1));
        Self {
            config,
            driver,
            http,
            converter,
            cache,
            pool: Mutex::new(None),
            render_limiter,
            headed_domains: DashSet::new(),
            observers: vec![Arc::new(TracingObserver)],
            metrics: FetchMetrics::new(),
            next_fetch_id: AtomicU64::new(1),
        }
    }

    /// Attach an observer that receives every [`FetchEvent`]
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn FetchObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    #[must_use]
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn emit(&self, event: FetchEvent) {
        publish(&self.observers, &self.metrics, &event);
    }

    /// Hook handed to each new pool so its swallowed errors reach the observers
    fn absorbed_error_hook(&self) -> AbsorbedErrorHook {
        let observers = self.observers.clone();
        let metrics = self.metrics.clone();
        Arc::new(move |absorbed: AbsorbedError| {
            let event = FetchEvent::ResourceErrorAbsorbed {
                instance_id: absorbed.instance_id,
                scope: absorbed.scope,
                error: absorbed.error,
            };
            publish(&observers, &metrics, &event);
        })
    }

    /// Fetch one URL
    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResult, FetchError> {
        let fetch_id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        debug!(fetch_id, url = %url, "Fetch started");

        let outcome = if !is_valid_url(url) {
            Err(FetchError::FetchFailed(format!("Invalid URL: {url}")))
        } else if self.render_limiter.is_closed() {
            Err(shut_down())
        } else {
            let config = resolve_config(&self.config, options);
            self.run(url, config, options.bypass_cache).await
        };

        match &outcome {
            Ok(result) => self.emit(FetchEvent::FetchSucceeded {
                url: url.to_string(),
                source: result.source,
                elapsed: started.elapsed(),
            }),
            Err(e) => self.emit(FetchEvent::FetchFailed {
                url: url.to_string(),
                kind: e.kind(),
                error: e.to_string(),
            }),
        }
        outcome
    }

    /// Fetch several URLs concurrently; results keep the input order
    pub async fn fetch_all<I, S>(
        &self,
        urls: I,
        options: &FetchOptions,
    ) -> Vec<Result<FetchResult, FetchError>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let urls: Vec<String> = urls.into_iter().map(|u| u.as_ref().to_string()).collect();
        futures::future::join_all(urls.iter().map(|url| self.fetch(url, options))).await
    }

    async fn run(
        &self,
        url: &str,
        config: FetchConfig,
        bypass_cache: bool,
    ) -> Result<FetchResult, FetchError> {
        let mut state = RetryState::new(url, config);

        if state.is_first_pass()
            && !bypass_cache
            && let Some(cached) = self.lookup_cache(url, state.config.markdown())
        {
            return Ok(cached);
        }

        if state.is_first_pass() && state.config.use_http_fallback() {
            match attempt_http_fallback(
                self.http.as_ref(),
                url,
                &state.config,
                self.converter.as_ref(),
            )
            .await
            {
                Ok(result) => {
                    self.cache.set(url, &result);
                    self.emit(FetchEvent::HttpFallbackSucceeded {
                        url: url.to_string(),
                        status_code: result.status_code,
                    });
                    return Ok(result);
                }
                Err(e) => self.emit(FetchEvent::HttpFallbackSkipped {
                    url: url.to_string(),
                    kind: e.kind(),
                    reason: e.to_string(),
                }),
            }
        }

        self.render_loop(&mut state).await
    }

    /// Cached result in the requested format
    ///
    /// HTML cached but Markdown wanted is converted on the way out. Markdown
    /// cached but HTML wanted cannot be reversed, so the entry is dropped.
    fn lookup_cache(&self, url: &str, markdown: bool) -> Option<FetchResult> {
        let Some(mut cached) = self.cache.get(url) else {
            self.emit(FetchEvent::CacheMiss {
                url: url.to_string(),
            });
            return None;
        };

        match (markdown, cached.content_type) {
            (true, ContentType::Html) => convert_in_place(&mut cached, self.converter.as_ref()),
            (false, ContentType::Markdown) => {
                self.cache.remove(url);
                self.emit(FetchEvent::CacheDiscarded {
                    url: url.to_string(),
                });
                return None;
            }
            _ => {}
        }

        self.emit(FetchEvent::CacheHit {
            url: url.to_string(),
        });
        Some(cached)
    }

    async fn render_loop(&self, state: &mut RetryState) -> Result<FetchResult, FetchError> {
        loop {
            let error = match self.render_once(state).await {
                Ok(result) => return Ok(result),
                Err(AttemptError::Terminal(e)) => return Err(e),
                Err(AttemptError::Render(e)) => e,
            };

            self.emit(FetchEvent::RenderAttemptFailed {
                url: state.url.clone(),
                attempt: state.render_attempt,
                kind: error.kind(),
                error: error.to_string(),
            });

            match state.on_render_failure() {
                RetryDecision::EscalateToThorough => {
                    self.emit(FetchEvent::FastModeEscalated {
                        url: state.url.clone(),
                    });
                }
                RetryDecision::RetryAfter(delay) => tokio::time::sleep(delay).await,
                RetryDecision::GiveUp => {
                    return Err(FetchError::RetriesExhausted {
                        retries: state.config.max_retries(),
                        source: Box::new(error),
                    });
                }
            }
        }
    }

    async fn render_once(&self, state: &mut RetryState) -> Result<FetchResult, AttemptError> {
        let _permit = self
            .render_limiter
            .acquire()
            .await
            .map_err(|_| AttemptError::Terminal(shut_down()))?;

        let domain = extract_domain(&state.url);
        let flagged = domain
            .as_deref()
            .is_some_and(|d| self.headed_domains.contains(d));
        let mode = BrowserMode::from_headed(state.wants_headed(flagged));
        if mode == BrowserMode::Headed {
            self.emit(FetchEvent::HeadedModeSelected {
                url: state.url.clone(),
                domain_flagged: flagged,
            });
        }

        let pool = self
            .ensure_pool(state, mode)
            .await
            .map_err(AttemptError::Terminal)?;

        self.emit(FetchEvent::RenderAttemptStarted {
            url: state.url.clone(),
            attempt: state.render_attempt,
            fast_mode: state.fast_mode,
            mode,
        });

        let pooled = pool
            .acquire_page()
            .await
            .map_err(|e| AttemptError::Render(e.into()))?;
        let settings = RenderSettings::for_attempt(state, mode);
        let outcome = render_fetch(&pooled, &state.url, settings, self.converter.as_ref()).await;
        pool.release_page(pooled).await;
        let result = outcome.map_err(AttemptError::Render)?;

        self.cache.set(&state.url, &result);
        if state.escalated_to_headed()
            && let Some(domain) = domain
        {
            info!(domain = %domain, "Flagging domain for headed mode");
            self.headed_domains.insert(domain);
        }
        Ok(result)
    }

    /// Current pool if it runs in `mode`, otherwise a freshly initialized one
    ///
    /// One initialization failure per call is retried after `retry_delay`;
    /// a second is terminal.
    async fn ensure_pool(
        &self,
        state: &mut RetryState,
        mode: BrowserMode,
    ) -> Result<Arc<InstancePool>, FetchError> {
        let mut slot = self.pool.lock().await;
        if let Some(pool) = slot.as_ref()
            && pool.mode() == mode
            && !pool.is_shutting_down()
        {
            return Ok(Arc::clone(pool));
        }

        if let Some(previous) = slot.take() {
            info!(from = ?previous.mode(), to = ?mode, "Switching browser pool mode");
            previous.cleanup().await;
        }

        loop {
            let pool = InstancePool::with_error_hook(
                PoolConfig::from_fetch_config(&state.config, mode),
                Arc::clone(&self.driver),
                self.absorbed_error_hook(),
            );
            match pool.initialize().await {
                Ok(()) => {
                    self.emit(FetchEvent::PoolInitialized { mode });
                    *slot = Some(Arc::clone(&pool));
                    return Ok(pool);
                }
                Err(e) => {
                    pool.cleanup().await;
                    if !state.on_pool_init_failure() {
                        return Err(e.into());
                    }
                    self.emit(FetchEvent::PoolInitRetry {
                        url: state.url.clone(),
                        error: e.to_string(),
                    });
                    tokio::time::sleep(state.config.retry_delay()).await;
                }
            }
        }
    }

    /// Drop a cached result; true if one was stored
    pub fn invalidate(&self, url: &str) -> bool {
        self.cache.remove(url)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Send later fetches of this URL's domain straight to headed mode
    ///
    /// Only consulted while `use_headed_mode_fallback` is on.
    pub fn flag_domain_for_headed(&self, url_or_domain: &str) {
        let domain = extract_domain(url_or_domain)
            .unwrap_or_else(|| url_or_domain.trim().to_ascii_lowercase());
        self.headed_domains.insert(domain);
    }

    #[must_use]
    pub fn is_domain_flagged(&self, url_or_domain: &str) -> bool {
        let domain = extract_domain(url_or_domain)
            .unwrap_or_else(|| url_or_domain.trim().to_ascii_lowercase());
        self.headed_domains.contains(&domain)
    }

    #[must_use]
    pub fn metrics(&self) -> FetchMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stats of the live pool, `None` before the first render
    pub async fn pool_stats(&self) -> Option<PoolStats> {
        let pool = self.pool.lock().await.clone()?;
        Some(pool.stats().await)
    }

    /// Whether a browser pool currently exists
    pub async fn has_pool(&self) -> bool {
        self.pool.lock().await.is_some()
    }

    /// Stop accepting renders and shut the pool down; idempotent
    pub async fn cleanup(&self) {
        self.render_limiter.close();
        let pool = self.pool.lock().await.take();
        if let Some(pool) = pool {
            pool.cleanup().await;
        }
    }
}

fn publish(observers: &[Arc<dyn FetchObserver>], metrics: &FetchMetrics, event: &FetchEvent) {
    metrics.record(event);
    for observer in observers {
        observer.on_event(event);
    }
}

fn shut_down() -> FetchError {
    FetchError::QueueNoResult("fetch orchestrator is shut down".to_string())
}
