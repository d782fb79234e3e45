//! Bounded pool of browser instances with health-driven lifecycle
//!
//! The pool owns up to `max_browsers` [`ManagedInstance`]s, each with at most
//! `max_pages_per_context` open pages. Every capacity decision runs inside the
//! [`AdmissionQueue`]. Instances report crashes and disconnects over a channel;
//! a self-rescheduling sweep retires aged, idle and broken instances and then
//! replenishes the pool.

pub mod admission;
pub mod config;
pub mod errors;
pub mod instance;
pub mod interceptor;
pub mod metrics;

pub use admission::AdmissionQueue;
pub use config::{BrowserMode, PoolConfig};
pub use errors::{AbsorbedError, AbsorbedErrorHook, PoolError, ResourceScope};
pub use instance::{ManagedInstance, PoolNotification, RemovalReason};
pub use interceptor::{ReportingInterceptor, ResourceBlocker};
pub use metrics::{InstanceHealth, InstanceMetrics, PoolStats};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::driver::{BrowserDriver, PageHandle, Viewport};
use crate::utils::MAX_CONSECUTIVE_LAUNCH_FAILURES;
use admission::InstanceSet;

// =============================================================================
// Browser Pool
// =============================================================================

/// Outcome of one health sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub removed: Vec<(u64, RemovalReason)>,
    pub launched: usize,
}

/// Bounded, self-healing pool of rendering instances
pub struct InstancePool {
    config: PoolConfig,
    driver: Arc<dyn BrowserDriver>,
    queue: AdmissionQueue,
    /// Counter for unique instance IDs
    next_id: AtomicU64,
    initialized: AtomicBool,
    init_lock: Mutex<()>,
    notifier: instance::PoolNotifier,
    notifications: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<PoolNotification>>>,
    health_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
    listener_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
    error_hook: Option<AbsorbedErrorHook>,
}

impl std::fmt::Debug for InstancePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstancePool")
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}

impl InstancePool {
    /// Create a pool (does NOT launch anything or start background tasks)
    pub fn new(config: PoolConfig, driver: Arc<dyn BrowserDriver>) -> Arc<Self> {
        Self::build(config, driver, None)
    }

    /// Create a pool that reports swallowed close and interceptor errors to `hook`
    pub fn with_error_hook(
        config: PoolConfig,
        driver: Arc<dyn BrowserDriver>,
        hook: AbsorbedErrorHook,
    ) -> Arc<Self> {
        Self::build(config, driver, Some(hook))
    }

    fn build(
        config: PoolConfig,
        driver: Arc<dyn BrowserDriver>,
        error_hook: Option<AbsorbedErrorHook>,
    ) -> Arc<Self> {
        let (notifier, notifications) = mpsc::unbounded_channel();
        Arc::new(Self {
            config,
            driver,
            queue: AdmissionQueue::new(),
            next_id: AtomicU64::new(0),
            initialized: AtomicBool::new(false),
            init_lock: Mutex::new(()),
            notifier,
            notifications: parking_lot::Mutex::new(Some(notifications)),
            health_handle: parking_lot::Mutex::new(None),
            listener_handle: parking_lot::Mutex::new(None),
            error_hook,
        })
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[must_use]
    pub fn mode(&self) -> BrowserMode {
        self.config.mode
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.queue.is_shutting_down()
    }

    /// Launch instances up to `max_browsers` and start background tasks.
    ///
    /// Best-effort: gives up after repeated consecutive launch failures and
    /// only fails when no instance at all could be created. Idempotent.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), PoolError> {
        let _init = self.init_lock.lock().await;
        if self.is_initialized() {
            return Ok(());
        }

        info!(
            mode = ?self.config.mode,
            max_browsers = self.config.max_browsers,
            "Initializing browser pool"
        );

        let mut instances = self.queue.enter().await?;
        let mut consecutive_failures = 0;
        let mut last_error = None;
        while instances.len() < self.config.max_browsers {
            match self.launch_instance().await {
                Ok(instance) => {
                    consecutive_failures = 0;
                    instances.push(instance);
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!("Failed to launch browser for pool: {}", e);
                    last_error = Some(e);
                    if consecutive_failures >= MAX_CONSECUTIVE_LAUNCH_FAILURES {
                        warn!(
                            "Giving up after {} consecutive launch failures ({} of {} instances ready)",
                            consecutive_failures,
                            instances.len(),
                            self.config.max_browsers
                        );
                        break;
                    }
                }
            }
        }

        if instances.is_empty() {
            let reason = last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no instances launched".to_string());
            return Err(PoolError::InitFailed(reason));
        }
        let ready = instances.len();
        drop(instances);

        self.start_notification_listener();
        self.start_health_timer();
        self.initialized.store(true, Ordering::SeqCst);

        info!("Browser pool started with {} instances", ready);
        Ok(())
    }

    async fn launch_instance(&self) -> Result<Arc<ManagedInstance>, PoolError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        ManagedInstance::launch(
            id,
            self.driver.as_ref(),
            &self.config,
            self.notifier.clone(),
            self.error_hook.clone(),
        )
        .await
    }

    fn pick_instance(&self, instances: &InstanceSet) -> Option<Arc<ManagedInstance>> {
        instances
            .iter()
            .filter(|i| i.has_capacity(self.config.max_pages_per_context))
            .min_by_key(|i| i.open_page_count())
            .cloned()
    }

    async fn open_page(instance: Arc<ManagedInstance>) -> Result<PooledPage, PoolError> {
        let page = instance.acquire_page().await?;
        Ok(PooledPage {
            page,
            instance,
            released: false,
        })
    }

    /// Find or create an instance with spare capacity and open a page on it.
    ///
    /// Never waits for capacity: a full pool fails immediately with
    /// [`PoolError::CapacityExhausted`].
    pub async fn acquire_page(&self) -> Result<PooledPage, PoolError> {
        let mut instances = self.queue.enter().await?;

        if let Some(instance) = self.pick_instance(&instances) {
            return Self::open_page(instance).await;
        }

        if instances.len() < self.config.max_browsers {
            match self.launch_instance().await {
                Ok(instance) => {
                    instances.push(Arc::clone(&instance));
                    return Self::open_page(instance).await;
                }
                Err(e) => warn!("Failed to launch browser for acquire: {}", e),
            }
        }

        // page-close events may have freed a slot meanwhile
        if let Some(instance) = self.pick_instance(&instances) {
            return Self::open_page(instance).await;
        }

        debug!(
            instances = instances.len(),
            "No capacity left in browser pool"
        );
        Err(PoolError::CapacityExhausted {
            max_browsers: self.config.max_browsers,
            max_pages_per_context: self.config.max_pages_per_context,
        })
    }

    /// Close the page and give its slot back
    pub async fn release_page(&self, mut page: PooledPage) {
        page.released = true;
        page.instance.release_page(&page.page).await;
    }

    /// Run one sweep now
    pub async fn health_check(&self) -> HealthReport {
        self.health_check_at(Instant::now()).await
    }

    /// Run one sweep as if the current time were `now`.
    ///
    /// Idle retirement never takes the pool below one instance.
    pub async fn health_check_at(&self, now: Instant) -> HealthReport {
        let Ok(mut instances) = self.queue.enter().await else {
            return HealthReport::default();
        };

        let mut remaining = instances.len();
        let mut kept = Vec::with_capacity(remaining);
        let mut retired = Vec::new();
        for instance in instances.drain(..) {
            let verdict = instance.check_health(
                now,
                self.config.max_browser_age,
                self.config.max_idle_time,
            );
            match verdict {
                Some(RemovalReason::Idle) if remaining <= 1 => kept.push(instance),
                Some(reason) => {
                    remaining -= 1;
                    retired.push((instance, reason));
                }
                None => kept.push(instance),
            }
        }
        *instances = kept;
        drop(instances);

        let mut report = HealthReport::default();
        for (instance, reason) in retired {
            info!(instance_id = instance.id(), ?reason, "Retiring browser instance");
            instance.close().await;
            report.removed.push((instance.id(), reason));
        }
        report.launched = self.replenish().await;

        debug!(
            removed = report.removed.len(),
            launched = report.launched,
            "Health check complete"
        );
        report
    }

    /// Launch instances back toward `max_browsers`; stops at the first failure
    async fn replenish(&self) -> usize {
        let Ok(mut instances) = self.queue.enter().await else {
            return 0;
        };
        let mut launched = 0;
        while instances.len() < self.config.max_browsers {
            match self.launch_instance().await {
                Ok(instance) => {
                    instances.push(instance);
                    launched += 1;
                }
                Err(e) => {
                    warn!("Failed to replenish browser pool: {}", e);
                    break;
                }
            }
        }
        launched
    }

    /// Remove one instance flagged out-of-band, then self-heal
    async fn retire_instance(&self, instance_id: u64, reason: RemovalReason) {
        let removed = {
            let Ok(mut instances) = self.queue.enter().await else {
                return;
            };
            let position = instances.iter().position(|i| i.id() == instance_id);
            position.map(|p| instances.remove(p))
        };
        if let Some(instance) = removed {
            info!(instance_id, ?reason, "Removing unhealthy browser instance");
            instance.close().await;
            self.replenish().await;
        }
    }

    fn start_notification_listener(self: &Arc<Self>) {
        let Some(mut notifications) = self.notifications.lock().take() else {
            return;
        };
        let pool = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                let Some(pool) = pool.upgrade() else {
                    break;
                };
                match notification {
                    PoolNotification::InstanceUnhealthy {
                        instance_id,
                        reason,
                    } => pool.retire_instance(instance_id, reason).await,
                }
            }
            debug!("Pool notification listener exiting");
        });
        *self.listener_handle.lock() = Some(handle);
    }

    /// Sleep, sweep, repeat; the next sleep starts only after the sweep ends
    fn start_health_timer(self: &Arc<Self>) {
        let pool: Weak<Self> = Arc::downgrade(self);
        let interval = self.config.health_check_interval;
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(pool) = pool.upgrade() else {
                    break;
                };
                if pool.is_shutting_down() {
                    break;
                }
                pool.health_check().await;
            }
            debug!("Health check timer exiting");
        });
        *self.health_handle.lock() = Some(handle);
    }

    /// Shut down: refuse new acquisitions, drain, close everything. Idempotent.
    pub async fn cleanup(&self) {
        if !self.is_shutting_down() {
            info!("Shutting down browser pool");
        }
        self.queue.close();

        if let Some(handle) = self.health_handle.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.listener_handle.lock().take() {
            handle.abort();
        }

        let instances = self.queue.drain().await;
        let closed = instances.len();
        for instance in instances {
            instance.close().await;
        }
        if closed > 0 {
            info!("Browser pool shutdown complete ({} instances closed)", closed);
        }
    }

    /// Copies of each instance's counters
    pub async fn metrics(&self) -> Vec<InstanceMetrics> {
        self.queue
            .peek()
            .await
            .iter()
            .map(|instance| instance.metrics())
            .collect()
    }

    pub async fn stats(&self) -> PoolStats {
        let metrics = self.metrics().await;
        PoolStats::from_metrics(self.mode(), &metrics, self.is_shutting_down())
    }

    pub async fn size(&self) -> usize {
        self.queue.peek().await.len()
    }
}

impl Drop for InstancePool {
    fn drop(&mut self) {
        if let Some(handle) = self.health_handle.get_mut().take() {
            handle.abort();
        }
        if let Some(handle) = self.listener_handle.get_mut().take() {
            handle.abort();
        }
    }
}

// =============================================================================
// Pooled Page Guard
// =============================================================================

/// RAII guard for a pooled page
///
/// Release explicitly with [`InstancePool::release_page`]; a guard dropped
/// unreleased closes its page on a spawned task.
pub struct PooledPage {
    page: Arc<dyn PageHandle>,
    instance: Arc<ManagedInstance>,
    released: bool,
}

impl std::fmt::Debug for PooledPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledPage")
            .field("instance_id", &self.instance.id())
            .field("page_id", self.page.id())
            .field("released", &self.released)
            .finish()
    }
}

impl PooledPage {
    #[must_use]
    pub fn page(&self) -> &Arc<dyn PageHandle> {
        &self.page
    }

    #[must_use]
    pub fn instance_id(&self) -> u64 {
        self.instance.id()
    }

    /// Viewport of the owning instance's context
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.instance.viewport()
    }
}

impl Drop for PooledPage {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let page = Arc::clone(&self.page);
        let instance = Arc::clone(&self.instance);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                instance.release_page(&page).await;
            });
        } else {
            warn!(
                instance_id = instance.id(),
                "Pooled page dropped outside a runtime; page left open"
            );
        }
    }
}
