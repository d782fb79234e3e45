//! Chromium driver built on chromiumoxide.
//!
//! One launched process per [`ChromiumBrowser`], CDP browser contexts for
//! isolation, and the Fetch domain for request interception.

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
    FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType,
};
use chromiumoxide::cdp::browser_protocol::inspector::{
    EnableParams as InspectorEnableParams, EventTargetCrashed,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, EventResponseReceived, ResourceType as CdpResourceType,
    SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use futures::{FutureExt, StreamExt};
use parking_lot::RwLock as SyncRwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::browser_discovery::{build_browser_config, resolve_executable};
use super::{
    BrowserDriver, BrowserHandle, ContextHandle, ContextOptions, DriverError, DriverEvent,
    DriverEventSender, InterceptedRequest, LaunchOptions, NavigateOptions, NavigationResponse,
    PageHandle, PageId, RequestInterceptor, ResourceType, RouteDecision, WaitUntil,
    route_request,
};

type InterceptorList = Arc<SyncRwLock<Vec<Arc<dyn RequestInterceptor>>>>;

// =============================================================================
// Launch Settings
// =============================================================================

/// Injected into every new document before page scripts run
const STEALTH_SCRIPT: &str = r"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
    if (!window.chrome) { window.chrome = {}; }
    if (!window.chrome.runtime) {
        window.chrome.runtime = {
            connect: () => ({
                onMessage: { addListener: () => {}, removeListener: () => {} },
                postMessage: () => {}
            })
        };
    }
";

/// Settle time used to approximate network idle after load
const NETWORK_IDLE_SETTLE: Duration = Duration::from_millis(500);

// =============================================================================
// Driver
// =============================================================================

/// Launches real Chromium processes
#[derive(Debug, Default, Clone)]
pub struct ChromiumDriver;

impl ChromiumDriver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn launch(
        &self,
        options: LaunchOptions,
        events: DriverEventSender,
    ) -> Result<Arc<dyn BrowserHandle>, DriverError> {
        let executable = resolve_executable(options.executable_path.as_ref()).await?;

        let user_data_dir =
            std::env::temp_dir().join(format!("kodegen_webfetch_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&user_data_dir)
            .map_err(|e| DriverError::Launch(format!("Failed to create profile dir: {e}")))?;

        let config = build_browser_config(&options, executable, user_data_dir.clone())?;

        info!(headless = options.headless, "Launching Chromium");
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let connected = Arc::new(AtomicBool::new(true));
        let handler_connected = Arc::clone(&connected);
        let handler_events = events.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(e) = h {
                    let msg = e.to_string();
                    // chromiumoxide cannot decode every CDP event; those are harmless
                    let benign = msg.contains("data did not match any variant of untagged enum Message")
                        || msg.contains("Failed to deserialize WS response");
                    if benign {
                        trace!("Suppressed benign CDP serialization error: {}", msg);
                    } else {
                        error!("Browser handler error: {:?}", e);
                    }
                }
            }
            handler_connected.store(false, Ordering::SeqCst);
            let _ = handler_events.send(DriverEvent::Disconnected);
            debug!("Browser handler task completed");
        });

        Ok(Arc::new(ChromiumBrowser {
            browser: Arc::new(RwLock::new(browser)),
            handler: parking_lot::Mutex::new(Some(handler_task)),
            connected,
            events,
            user_data_dir,
        }))
    }
}

// =============================================================================
// Browser
// =============================================================================

pub struct ChromiumBrowser {
    browser: Arc<RwLock<Browser>>,
    handler: parking_lot::Mutex<Option<JoinHandle<()>>>,
    connected: Arc<AtomicBool>,
    events: DriverEventSender,
    user_data_dir: PathBuf,
}

#[async_trait]
impl BrowserHandle for ChromiumBrowser {
    async fn new_context(
        &self,
        options: ContextOptions,
    ) -> Result<Arc<dyn ContextHandle>, DriverError> {
        let context_id = self
            .browser
            .read()
            .await
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| DriverError::Context(e.to_string()))?
            .result
            .browser_context_id;

        Ok(Arc::new(ChromiumContext {
            browser: Arc::clone(&self.browser),
            context_id,
            options,
            interceptors: Arc::new(SyncRwLock::new(Vec::new())),
            events: self.events.clone(),
        }))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), DriverError> {
        let mut browser = self.browser.write().await;
        let result = browser.close().await;
        let _ = browser.wait().await;
        self.connected.store(false, Ordering::SeqCst);
        result
            .map(|_| ())
            .map_err(|e| DriverError::Page(format!("Failed to close browser: {e}")))
    }
}

impl Drop for ChromiumBrowser {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.lock().take() {
            handler.abort();
        }
        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            debug!(
                "Failed to clean up profile dir {}: {}",
                self.user_data_dir.display(),
                e
            );
        }
    }
}

// =============================================================================
// Context
// =============================================================================

pub struct ChromiumContext {
    browser: Arc<RwLock<Browser>>,
    context_id: chromiumoxide::cdp::browser_protocol::browser::BrowserContextId,
    options: ContextOptions,
    interceptors: InterceptorList,
    events: DriverEventSender,
}

impl ChromiumContext {
    async fn configure_page(&self, page: &Page) -> Result<(), chromiumoxide::error::CdpError> {
        page.execute(SetUserAgentOverrideParams::new(self.options.user_agent.clone()))
            .await?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(self.options.viewport.width),
            i64::from(self.options.viewport.height),
            1.0,
            false,
        ))
        .await?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ContextHandle for ChromiumContext {
    async fn route(&self, interceptor: Arc<dyn RequestInterceptor>) -> Result<(), DriverError> {
        self.interceptors.write().push(interceptor);
        Ok(())
    }

    async fn new_page(&self) -> Result<Arc<dyn PageHandle>, DriverError> {
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.context_id.clone())
            .build()
            .map_err(DriverError::Page)?;

        let page = self
            .browser
            .read()
            .await
            .new_page(params)
            .await
            .map_err(|e| DriverError::Page(e.to_string()))?;

        let id = PageId(page.target_id().inner().clone());

        if let Err(e) = self.configure_page(&page).await {
            warn!(page_id = %id, "Failed to apply page overrides: {}", e);
        }

        let chromium_page = ChromiumPage {
            page,
            id,
            context_interceptors: Arc::clone(&self.interceptors),
            page_interceptors: Arc::new(SyncRwLock::new(Vec::new())),
            interception_enabled: AtomicBool::new(false),
            tasks: parking_lot::Mutex::new(Vec::new()),
            events: self.events.clone(),
        };
        chromium_page.watch_for_crash().await;
        if !self.interceptors.read().is_empty() {
            chromium_page.enable_interception().await?;
        }

        Ok(Arc::new(chromium_page))
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.browser
            .read()
            .await
            .execute(DisposeBrowserContextParams::new(self.context_id.clone()))
            .await
            .map(|_| ())
            .map_err(|e| DriverError::Context(e.to_string()))
    }
}

// =============================================================================
// Page
// =============================================================================

pub struct ChromiumPage {
    page: Page,
    id: PageId,
    context_interceptors: InterceptorList,
    page_interceptors: InterceptorList,
    interception_enabled: AtomicBool,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    events: DriverEventSender,
}

impl ChromiumPage {
    async fn watch_for_crash(&self) {
        if let Err(e) = self.page.execute(InspectorEnableParams::default()).await {
            debug!(page_id = %self.id, "Inspector domain unavailable: {}", e);
            return;
        }
        let mut crashes = match self.page.event_listener::<EventTargetCrashed>().await {
            Ok(stream) => stream,
            Err(e) => {
                debug!(page_id = %self.id, "Cannot listen for crashes: {}", e);
                return;
            }
        };
        let events = self.events.clone();
        let page_id = self.id.clone();
        let task = tokio::spawn(async move {
            if crashes.next().await.is_some() {
                warn!(page_id = %page_id, "Page crashed");
                let _ = events.send(DriverEvent::PageCrashed { page_id });
            }
        });
        self.tasks.lock().push(task);
    }

    async fn enable_interception(&self) -> Result<(), DriverError> {
        if self.interception_enabled.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| DriverError::Interceptor(e.to_string()))?;
        self.page
            .execute(FetchEnableParams::default())
            .await
            .map_err(|e| DriverError::Interceptor(e.to_string()))?;

        let page = self.page.clone();
        let context_interceptors = Arc::clone(&self.context_interceptors);
        let page_interceptors = Arc::clone(&self.page_interceptors);
        let task = tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let request = InterceptedRequest {
                    url: event.request.url.clone(),
                    resource_type: map_resource_type(&event.resource_type),
                };
                let chain: Vec<_> = context_interceptors
                    .read()
                    .iter()
                    .chain(page_interceptors.read().iter())
                    .cloned()
                    .collect();
                let outcome = match route_request(&chain, &request) {
                    RouteDecision::Continue => page
                        .execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                        .map(|_| ()),
                    RouteDecision::Abort => page
                        .execute(FailRequestParams::new(
                            event.request_id.clone(),
                            ErrorReason::BlockedByClient,
                        ))
                        .await
                        .map(|_| ()),
                };
                if let Err(e) = outcome {
                    trace!(url = %request.url, "Failed to resolve paused request: {}", e);
                }
            }
        });
        self.tasks.lock().push(task);
        Ok(())
    }
}

fn map_resource_type(rt: &CdpResourceType) -> ResourceType {
    match rt {
        CdpResourceType::Document => ResourceType::Document,
        CdpResourceType::Stylesheet => ResourceType::Stylesheet,
        CdpResourceType::Image => ResourceType::Image,
        CdpResourceType::Media => ResourceType::Media,
        CdpResourceType::Font => ResourceType::Font,
        CdpResourceType::Script => ResourceType::Script,
        CdpResourceType::Xhr => ResourceType::Xhr,
        CdpResourceType::Fetch => ResourceType::Fetch,
        CdpResourceType::WebSocket => ResourceType::Websocket,
        _ => ResourceType::Other,
    }
}

#[async_trait]
impl PageHandle for ChromiumPage {
    fn id(&self) -> &PageId {
        &self.id
    }

    async fn route(&self, interceptor: Arc<dyn RequestInterceptor>) -> Result<(), DriverError> {
        self.page_interceptors.write().push(interceptor);
        self.enable_interception().await
    }

    async fn goto(
        &self,
        url: &str,
        options: &NavigateOptions,
    ) -> Result<Option<NavigationResponse>, DriverError> {
        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| DriverError::Navigation(e.to_string()))?;

        // chromiumoxide resolves goto on the load event; DOMContentLoaded has no
        // earlier hook there, and network idle gets a short settle period.
        match tokio::time::timeout(options.timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(DriverError::Navigation(e.to_string())),
            Err(_) => {
                return Err(DriverError::Timeout {
                    operation: "Navigation".to_string(),
                    after: options.timeout,
                });
            }
        }
        if options.wait_until == WaitUntil::NetworkIdle {
            tokio::time::sleep(NETWORK_IDLE_SETTLE).await;
        }

        let mut document = None;
        while let Some(Some(event)) = responses.next().now_or_never() {
            if event.r#type == CdpResourceType::Document {
                document = Some(NavigationResponse {
                    status: u16::try_from(event.response.status).unwrap_or(0),
                    content_type: Some(event.response.mime_type.clone()),
                    url: event.response.url.clone(),
                });
                break;
            }
        }
        Ok(document)
    }

    async fn content(&self) -> Result<String, DriverError> {
        self.page
            .content()
            .await
            .map_err(|e| DriverError::Page(e.to_string()))
    }

    async fn title(&self) -> Result<String, DriverError> {
        self.page
            .get_title()
            .await
            .map(Option::unwrap_or_default)
            .map_err(|e| DriverError::Page(e.to_string()))
    }

    async fn url(&self) -> Result<String, DriverError> {
        self.page
            .url()
            .await
            .map(Option::unwrap_or_default)
            .map_err(|e| DriverError::Page(e.to_string()))
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DriverError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::Evaluation(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), DriverError> {
        let params = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseMoved)
            .x(x)
            .y(y)
            .build()
            .map_err(DriverError::Page)?;
        self.page
            .execute(params)
            .await
            .map(|_| ())
            .map_err(|e| DriverError::Page(e.to_string()))
    }

    async fn close(&self) -> Result<(), DriverError> {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        let result = self
            .page
            .clone()
            .close()
            .await
            .map_err(|e| DriverError::Page(e.to_string()));
        let _ = self.events.send(DriverEvent::PageClosed {
            page_id: self.id.clone(),
        });
        result
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}
