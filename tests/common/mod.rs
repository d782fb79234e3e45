//! Test utilities for the webfetch test suite
//!
//! A scripted in-memory browser driver and HTTP fetcher that count every call,
//! so pool and orchestrator behavior can be asserted without Chromium.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use kodegen_tools_webfetch::driver::{
    BrowserDriver, BrowserHandle, ContextHandle, ContextOptions, DriverError, DriverEvent,
    DriverEventSender, InterceptedRequest, LaunchOptions, NavigateOptions, NavigationResponse,
    PageHandle, PageId, RequestInterceptor, ResourceType, RouteDecision, route_request,
};
use kodegen_tools_webfetch::fetch_engine::{FetchError, HttpFetcher, HttpResponse};
use kodegen_tools_webfetch::fetch_events::{FetchEvent, FetchObserver};

/// Install a test subscriber honoring `RUST_LOG`
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Creates a test HTML document with the given title and body
#[allow(dead_code)]
pub fn create_test_html(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><title>{title}</title></head>\n<body>{body}</body>\n</html>"
    )
}

/// What one navigation does
#[derive(Debug, Clone)]
pub enum NavScript {
    Page {
        status: u16,
        content_type: Option<String>,
        title: String,
        html: String,
    },
    Fail(String),
    NoResponse,
    /// Never loads; reports a driver timeout once the navigation timeout passes
    Hang,
}

impl NavScript {
    #[allow(dead_code)]
    pub fn html(title: &str, body: &str) -> Self {
        NavScript::Page {
            status: 200,
            content_type: Some("text/html; charset=utf-8".to_string()),
            title: title.to_string(),
            html: create_test_html(title, body),
        }
    }

    #[allow(dead_code)]
    pub fn status(status: u16) -> Self {
        NavScript::Page {
            status,
            content_type: Some("text/html".to_string()),
            title: String::new(),
            html: create_test_html("Error", "error"),
        }
    }

    #[allow(dead_code)]
    pub fn fail(message: &str) -> Self {
        NavScript::Fail(message.to_string())
    }
}

/// Shared counters and scripts behind every mock handle
pub struct MockState {
    pub launches: AtomicUsize,
    pub headless_launches: AtomicUsize,
    pub headed_launches: AtomicUsize,
    pub browser_closes: AtomicUsize,
    pub contexts: AtomicUsize,
    pub context_routes: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
    pub page_routes: AtomicUsize,
    pub navigations: AtomicUsize,
    pub mouse_moves: AtomicUsize,
    pub evaluations: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    failing_launches: AtomicUsize,
    failing_page_closes: AtomicBool,
    nav_delay: Mutex<Duration>,
    script: Mutex<VecDeque<NavScript>>,
    default_nav: Mutex<NavScript>,
    last_launch: Mutex<Option<LaunchOptions>>,
    browsers: Mutex<Vec<Arc<MockBrowser>>>,
    pages: Mutex<Vec<Arc<MockPage>>>,
    context_interceptors: Mutex<Vec<Arc<dyn RequestInterceptor>>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            launches: AtomicUsize::new(0),
            headless_launches: AtomicUsize::new(0),
            headed_launches: AtomicUsize::new(0),
            browser_closes: AtomicUsize::new(0),
            contexts: AtomicUsize::new(0),
            context_routes: AtomicUsize::new(0),
            pages_opened: AtomicUsize::new(0),
            pages_closed: AtomicUsize::new(0),
            page_routes: AtomicUsize::new(0),
            navigations: AtomicUsize::new(0),
            mouse_moves: AtomicUsize::new(0),
            evaluations: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            failing_launches: AtomicUsize::new(0),
            failing_page_closes: AtomicBool::new(false),
            nav_delay: Mutex::new(Duration::ZERO),
            script: Mutex::new(VecDeque::new()),
            default_nav: Mutex::new(NavScript::html("Mock Page", "<p>mock content</p>")),
            last_launch: Mutex::new(None),
            browsers: Mutex::new(Vec::new()),
            pages: Mutex::new(Vec::new()),
            context_interceptors: Mutex::new(Vec::new()),
        }
    }
}

#[allow(dead_code)]
impl MockState {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Fail the next `n` launches
    pub fn fail_next_launches(&self, n: usize) {
        self.failing_launches.store(n, Ordering::SeqCst);
    }

    /// Make every page close report an error after closing
    pub fn fail_page_closes(&self, fail: bool) {
        self.failing_page_closes.store(fail, Ordering::SeqCst);
    }

    /// Navigation outcome used once the script queue is empty
    pub fn set_default_nav(&self, nav: NavScript) {
        *self.default_nav.lock() = nav;
    }

    /// Queue one-shot navigation outcomes, consumed in order
    pub fn push_navs(&self, navs: impl IntoIterator<Item = NavScript>) {
        self.script.lock().extend(navs);
    }

    pub fn set_nav_delay(&self, delay: Duration) {
        *self.nav_delay.lock() = delay;
    }

    pub fn last_launch(&self) -> Option<LaunchOptions> {
        self.last_launch.lock().clone()
    }

    pub fn browsers(&self) -> Vec<Arc<MockBrowser>> {
        self.browsers.lock().clone()
    }

    pub fn page(&self, id: &PageId) -> Option<Arc<MockPage>> {
        self.pages.lock().iter().find(|p| &p.id == id).cloned()
    }

    /// Run a request through the context-level interceptors installed so far
    pub fn context_decision(&self, url: &str, resource_type: ResourceType) -> RouteDecision {
        let interceptors = self.context_interceptors.lock().clone();
        route_request(
            &interceptors,
            &InterceptedRequest {
                url: url.to_string(),
                resource_type,
            },
        )
    }

    fn next_nav(&self) -> NavScript {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_nav.lock().clone())
    }
}

/// Scripted [`BrowserDriver`]
#[derive(Clone, Default)]
pub struct MockDriver {
    pub state: Arc<MockState>,
}

#[allow(dead_code)]
impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_nav(nav: NavScript) -> Self {
        let driver = Self::default();
        driver.state.set_default_nav(nav);
        driver
    }
}

#[async_trait]
impl BrowserDriver for MockDriver {
    async fn launch(
        &self,
        options: LaunchOptions,
        events: DriverEventSender,
    ) -> Result<Arc<dyn BrowserHandle>, DriverError> {
        let state = &self.state;
        state.launches.fetch_add(1, Ordering::SeqCst);
        if state
            .failing_launches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(DriverError::Launch("scripted launch failure".to_string()));
        }

        if options.headless {
            state.headless_launches.fetch_add(1, Ordering::SeqCst);
        } else {
            state.headed_launches.fetch_add(1, Ordering::SeqCst);
        }
        *state.last_launch.lock() = Some(options);

        let browser = Arc::new(MockBrowser {
            state: Arc::clone(state),
            events,
            connected: AtomicBool::new(true),
        });
        state.browsers.lock().push(Arc::clone(&browser));
        Ok(browser)
    }
}

pub struct MockBrowser {
    state: Arc<MockState>,
    events: DriverEventSender,
    connected: AtomicBool,
}

#[allow(dead_code)]
impl MockBrowser {
    /// Simulate the engine process going away
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events.send(DriverEvent::Disconnected);
    }

    /// Emit a duplicate disconnect event without changing state
    pub fn repeat_disconnect_event(&self) {
        let _ = self.events.send(DriverEvent::Disconnected);
    }

    /// Lose the connection without the driver reporting it
    pub fn sever(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrowserHandle for MockBrowser {
    async fn new_context(
        &self,
        _options: ContextOptions,
    ) -> Result<Arc<dyn ContextHandle>, DriverError> {
        self.state.contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockContext {
            state: Arc::clone(&self.state),
            events: self.events.clone(),
        }))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.state.browser_closes.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct MockContext {
    state: Arc<MockState>,
    events: DriverEventSender,
}

#[async_trait]
impl ContextHandle for MockContext {
    async fn route(&self, interceptor: Arc<dyn RequestInterceptor>) -> Result<(), DriverError> {
        self.state.context_routes.fetch_add(1, Ordering::SeqCst);
        self.state.context_interceptors.lock().push(interceptor);
        Ok(())
    }

    async fn new_page(&self) -> Result<Arc<dyn PageHandle>, DriverError> {
        let n = self.state.pages_opened.fetch_add(1, Ordering::SeqCst);
        let page = Arc::new(MockPage {
            id: PageId(format!("page-{n}")),
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            loaded: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        self.state.pages.lock().push(Arc::clone(&page));
        Ok(page)
    }

    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct LoadedPage {
    url: String,
    title: String,
    html: String,
}

pub struct MockPage {
    id: PageId,
    state: Arc<MockState>,
    events: DriverEventSender,
    loaded: Mutex<Option<LoadedPage>>,
    closed: AtomicBool,
}

#[allow(dead_code)]
impl MockPage {
    /// Simulate the renderer crashing under this page
    pub fn crash(&self) {
        let _ = self.events.send(DriverEvent::PageCrashed {
            page_id: self.id.clone(),
        });
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a MockState);

impl<'a> InFlight<'a> {
    fn enter(state: &'a MockState) -> Self {
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(state)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PageHandle for MockPage {
    fn id(&self) -> &PageId {
        &self.id
    }

    async fn route(&self, _interceptor: Arc<dyn RequestInterceptor>) -> Result<(), DriverError> {
        self.state.page_routes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn goto(
        &self,
        url: &str,
        options: &NavigateOptions,
    ) -> Result<Option<NavigationResponse>, DriverError> {
        self.state.navigations.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.state);
        let delay = *self.state.nav_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match self.state.next_nav() {
            NavScript::Page {
                status,
                content_type,
                title,
                html,
            } => {
                *self.loaded.lock() = Some(LoadedPage {
                    url: url.to_string(),
                    title,
                    html,
                });
                Ok(Some(NavigationResponse {
                    status,
                    content_type,
                    url: url.to_string(),
                }))
            }
            NavScript::Fail(message) => Err(DriverError::Navigation(message)),
            NavScript::NoResponse => Ok(None),
            NavScript::Hang => {
                tokio::time::sleep(options.timeout).await;
                Err(DriverError::Timeout {
                    operation: "Navigation".to_string(),
                    after: options.timeout,
                })
            }
        }
    }

    async fn content(&self) -> Result<String, DriverError> {
        self.loaded
            .lock()
            .as_ref()
            .map(|p| p.html.clone())
            .ok_or_else(|| DriverError::Page("nothing loaded".to_string()))
    }

    async fn title(&self) -> Result<String, DriverError> {
        Ok(self
            .loaded
            .lock()
            .as_ref()
            .map(|p| p.title.clone())
            .unwrap_or_default())
    }

    async fn url(&self) -> Result<String, DriverError> {
        Ok(self
            .loaded
            .lock()
            .as_ref()
            .map(|p| p.url.clone())
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value, DriverError> {
        self.state.evaluations.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::Value::Null)
    }

    async fn mouse_move(&self, _x: f64, _y: f64) -> Result<(), DriverError> {
        self.state.mouse_moves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.pages_closed.fetch_add(1, Ordering::SeqCst);
            let _ = self.events.send(DriverEvent::PageClosed {
                page_id: self.id.clone(),
            });
        }
        if self.state.failing_page_closes.load(Ordering::SeqCst) {
            return Err(DriverError::Page("scripted close failure".to_string()));
        }
        Ok(())
    }
}

/// What one HTTP fallback call returns
#[derive(Debug, Clone)]
pub enum HttpScript {
    Respond {
        status: u16,
        content_type: String,
        body: String,
    },
    Fail(String),
}

#[allow(dead_code)]
impl HttpScript {
    pub fn html(status: u16, body: &str) -> Self {
        HttpScript::Respond {
            status,
            content_type: "text/html; charset=utf-8".to_string(),
            body: body.to_string(),
        }
    }
}

/// Scripted [`HttpFetcher`]
pub struct MockHttp {
    pub calls: AtomicUsize,
    response: Mutex<HttpScript>,
}

#[allow(dead_code)]
impl MockHttp {
    pub fn new(response: HttpScript) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            response: Mutex::new(response),
        })
    }

    /// A fetcher that always errors, for runs where HTTP should not matter
    pub fn unreachable() -> Arc<Self> {
        Self::new(HttpScript::Fail("connection refused".to_string()))
    }

    pub fn set_response(&self, response: HttpScript) {
        *self.response.lock() = response;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpFetcher for MockHttp {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.response.lock().clone() {
            HttpScript::Respond {
                status,
                content_type,
                body,
            } => {
                let mut headers = HeaderMap::new();
                if let Ok(value) = HeaderValue::from_str(&content_type) {
                    headers.insert(CONTENT_TYPE, value);
                }
                Ok(HttpResponse {
                    status,
                    headers,
                    final_url: url.to_string(),
                    body,
                })
            }
            HttpScript::Fail(message) => Err(FetchError::HttpFallbackFailed(message)),
        }
    }
}

/// Observer keeping every event it sees
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<FetchEvent>>,
}

#[allow(dead_code)]
impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<FetchEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&FetchEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }
}

impl FetchObserver for RecordingObserver {
    fn on_event(&self, event: &FetchEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Poll an async condition every 10ms until it holds or the timeout passes
macro_rules! eventually {
    ($timeout:expr, $condition:expr) => {{
        let deadline = tokio::time::Instant::now() + $timeout;
        loop {
            if $condition {
                break true;
            }
            if tokio::time::Instant::now() >= deadline {
                break false;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }};
}

#[allow(unused_imports)]
pub(crate) use eventually;
