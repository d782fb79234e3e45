//! One rendering engine plus its isolated context and open pages.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::PoolConfig;
use super::errors::{AbsorbedError, AbsorbedErrorHook, PoolError, ResourceScope};
use super::interceptor::{ReportingInterceptor, ResourceBlocker};
use super::metrics::{InstanceHealth, InstanceMetrics};
use crate::driver::{
    BrowserDriver, BrowserHandle, ContextHandle, ContextOptions, DriverEvent,
    DriverEventReceiver, PageHandle, PageId, RequestInterceptor, Viewport,
};
use crate::utils::{USER_AGENTS, VIEWPORTS};

/// Why an instance should leave the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    Disconnected,
    PageCrashed,
    AlreadyUnhealthy,
    MaxAge,
    Idle,
}

/// Out-of-band message from an instance to its pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolNotification {
    InstanceUnhealthy {
        instance_id: u64,
        reason: RemovalReason,
    },
}

pub type PoolNotifier = mpsc::UnboundedSender<PoolNotification>;

pub struct ManagedInstance {
    id: u64,
    browser: Arc<dyn BrowserHandle>,
    context: Arc<dyn ContextHandle>,
    user_agent: String,
    viewport: Viewport,
    created_at: Instant,
    launched_at: DateTime<Utc>,
    last_used: Mutex<Instant>,
    open_pages: Mutex<HashSet<PageId>>,
    pages_created: AtomicU64,
    error_count: AtomicU64,
    unhealthy: AtomicBool,
    disconnected: AtomicBool,
    event_task: Mutex<Option<JoinHandle<()>>>,
    error_hook: Option<AbsorbedErrorHook>,
}

impl std::fmt::Debug for ManagedInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedInstance")
            .field("id", &self.id)
            .field("user_agent", &self.user_agent)
            .field("viewport", &self.viewport)
            .field("open_pages", &self.open_page_count())
            .field("healthy", &self.is_healthy())
            .finish_non_exhaustive()
    }
}

impl ManagedInstance {
    /// Launch an engine, open its context and install the blocking rule.
    pub async fn launch(
        id: u64,
        driver: &dyn BrowserDriver,
        config: &PoolConfig,
        notifier: PoolNotifier,
        error_hook: Option<AbsorbedErrorHook>,
    ) -> Result<Arc<Self>, PoolError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let browser = driver.launch(config.launch_options(), events_tx).await?;

        let (user_agent, viewport) = random_fingerprint();
        let context = match browser
            .new_context(ContextOptions {
                user_agent: user_agent.clone(),
                viewport,
            })
            .await
        {
            Ok(context) => context,
            Err(e) => {
                let _ = browser.close().await;
                return Err(e.into());
            }
        };

        let blocker = ResourceBlocker::new(
            config.blocked_domains.iter().cloned(),
            config.blocked_resource_types.iter().copied(),
        );
        if !blocker.is_empty() {
            let interceptor: Arc<dyn RequestInterceptor> = match &error_hook {
                Some(hook) => Arc::new(ReportingInterceptor::new(
                    Arc::new(blocker),
                    id,
                    Arc::clone(hook),
                )),
                None => Arc::new(blocker),
            };
            if let Err(e) = context.route(interceptor).await {
                warn!(instance_id = id, "Failed to install request blocking: {}", e);
            }
        }

        let now = Instant::now();
        let instance = Arc::new(Self {
            id,
            browser,
            context,
            user_agent,
            viewport,
            created_at: now,
            launched_at: Utc::now(),
            last_used: Mutex::new(now),
            open_pages: Mutex::new(HashSet::new()),
            pages_created: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            unhealthy: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            event_task: Mutex::new(None),
            error_hook,
        });

        let task = tokio::spawn(event_pump(Arc::downgrade(&instance), events_rx, notifier));
        *instance.event_task.lock() = Some(task);

        info!(
            instance_id = id,
            mode = ?config.mode,
            width = viewport.width,
            height = viewport.height,
            "Launched browser instance"
        );
        Ok(instance)
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        !self.unhealthy.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn open_page_count(&self) -> usize {
        self.open_pages.lock().len()
    }

    /// Healthy and below the per-context page limit
    #[must_use]
    pub fn has_capacity(&self, max_pages_per_context: usize) -> bool {
        self.is_healthy() && self.open_page_count() < max_pages_per_context
    }

    fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    /// Open a page in this instance's context.
    pub async fn acquire_page(&self) -> Result<Arc<dyn PageHandle>, PoolError> {
        if !self.is_healthy() {
            return Err(PoolError::InstanceUnhealthy(self.id));
        }
        match self.context.new_page().await {
            Ok(page) => {
                self.open_pages.lock().insert(page.id().clone());
                self.pages_created.fetch_add(1, Ordering::SeqCst);
                self.touch();
                debug!(instance_id = self.id, page_id = %page.id(), "Acquired page");
                Ok(page)
            }
            Err(e) => {
                self.error_count.fetch_add(1, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Close a page; close errors only bump the error counter.
    pub async fn release_page(&self, page: &Arc<dyn PageHandle>) {
        self.open_pages.lock().remove(page.id());
        self.touch();
        if let Err(e) = page.close().await {
            self.error_count.fetch_add(1, Ordering::SeqCst);
            debug!(instance_id = self.id, page_id = %page.id(), "Page close failed: {}", e);
            self.report(ResourceScope::Page, &e);
        }
    }

    fn report(&self, scope: ResourceScope, error: &dyn std::fmt::Display) {
        if let Some(hook) = &self.error_hook {
            hook(AbsorbedError {
                instance_id: self.id,
                scope,
                error: error.to_string(),
            });
        }
    }

    /// Why the pool should retire this instance, if it should.
    ///
    /// Order: disconnected, already unhealthy, age, then idleness (only with
    /// zero open pages). The pool decides whether an idle verdict is applied.
    #[must_use]
    pub fn check_health(
        &self,
        now: Instant,
        max_age: Duration,
        max_idle: Duration,
    ) -> Option<RemovalReason> {
        if self.disconnected.load(Ordering::SeqCst) || !self.browser.is_connected() {
            return Some(RemovalReason::Disconnected);
        }
        if !self.is_healthy() {
            return Some(RemovalReason::AlreadyUnhealthy);
        }
        if now.saturating_duration_since(self.created_at) >= max_age {
            return Some(RemovalReason::MaxAge);
        }
        let idle = now.saturating_duration_since(*self.last_used.lock());
        if self.open_page_count() == 0 && idle >= max_idle {
            return Some(RemovalReason::Idle);
        }
        None
    }

    #[must_use]
    pub fn metrics(&self) -> InstanceMetrics {
        let now = Instant::now();
        InstanceMetrics {
            id: self.id,
            health: if self.is_healthy() {
                InstanceHealth::Healthy
            } else {
                InstanceHealth::Unhealthy
            },
            launched_at: self.launched_at,
            age: now.saturating_duration_since(self.created_at),
            idle: now.saturating_duration_since(*self.last_used.lock()),
            open_pages: self.open_page_count(),
            pages_created: self.pages_created.load(Ordering::SeqCst),
            error_count: self.error_count.load(Ordering::SeqCst),
        }
    }

    /// Flip to unhealthy; only the first transition notifies the pool.
    fn mark_unhealthy(&self, reason: RemovalReason, notifier: &PoolNotifier) {
        if self.unhealthy.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(instance_id = self.id, ?reason, "Browser instance marked unhealthy");
        let _ = notifier.send(PoolNotification::InstanceUnhealthy {
            instance_id: self.id,
            reason,
        });
    }

    fn handle_event(&self, event: DriverEvent, notifier: &PoolNotifier) {
        match event {
            DriverEvent::PageClosed { page_id } => {
                self.open_pages.lock().remove(&page_id);
            }
            DriverEvent::PageCrashed { page_id } => {
                self.open_pages.lock().remove(&page_id);
                self.error_count.fetch_add(1, Ordering::SeqCst);
                self.mark_unhealthy(RemovalReason::PageCrashed, notifier);
            }
            DriverEvent::Disconnected => {
                self.disconnected.store(true, Ordering::SeqCst);
                self.mark_unhealthy(RemovalReason::Disconnected, notifier);
            }
        }
    }

    /// Close context and engine, ignoring errors.
    pub async fn close(&self) {
        // retired instances must not report themselves again
        self.unhealthy.store(true, Ordering::SeqCst);
        if let Some(task) = self.event_task.lock().take() {
            task.abort();
        }
        if let Err(e) = self.context.close().await {
            debug!(instance_id = self.id, "Context close failed: {}", e);
            self.report(ResourceScope::Context, &e);
        }
        if let Err(e) = self.browser.close().await {
            debug!(instance_id = self.id, "Browser close failed: {}", e);
            self.report(ResourceScope::Browser, &e);
        }
        info!(instance_id = self.id, "Closed browser instance");
    }
}

impl Drop for ManagedInstance {
    fn drop(&mut self) {
        if let Some(task) = self.event_task.lock().take() {
            task.abort();
        }
    }
}

async fn event_pump(
    instance: Weak<ManagedInstance>,
    mut events: DriverEventReceiver,
    notifier: PoolNotifier,
) {
    while let Some(event) = events.recv().await {
        let Some(instance) = instance.upgrade() else {
            break;
        };
        instance.handle_event(event, &notifier);
    }
}

fn random_fingerprint() -> (String, Viewport) {
    let mut rng = rand::rng();
    let user_agent = USER_AGENTS[rng.random_range(0..USER_AGENTS.len())].to_string();
    let (width, height) = VIEWPORTS[rng.random_range(0..VIEWPORTS.len())];
    (user_agent, Viewport { width, height })
}
