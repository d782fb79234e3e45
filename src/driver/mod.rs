//! Rendering-driver abstraction.
//!
//! Defines the traits the browser pool consumes to launch engines, open
//! isolated contexts and drive pages. The production implementation is
//! Chromium via chromiumoxide ([`chromium::ChromiumDriver`]); tests plug in
//! scripted drivers.
//!
//! Lifecycle notifications (page closed, page crashed, browser disconnected)
//! are pushed by the driver into the [`DriverEventSender`] handed over at
//! launch instead of being registered as callbacks.

pub mod browser_discovery;
pub mod chromium;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub use chromium::ChromiumDriver;

/// Errors surfaced by a rendering driver
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Browser context error: {0}")]
    Context(String),

    #[error("Page error: {0}")]
    Page(String),

    #[error("{0}")]
    Navigation(String),

    #[error("{operation} timeout after {}ms", .after.as_millis())]
    Timeout { operation: String, after: Duration },

    #[error("Script evaluation failed: {0}")]
    Evaluation(String),

    #[error("Browser disconnected")]
    Disconnected,

    #[error("Interceptor error: {0}")]
    Interceptor(String),
}

impl From<anyhow::Error> for DriverError {
    fn from(e: anyhow::Error) -> Self {
        DriverError::Launch(format!("{e:#}"))
    }
}

/// Identifier of a page, unique within its browser
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub String);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PageId {
    fn from(s: &str) -> Self {
        PageId(s.to_string())
    }
}

/// Lifecycle notification pushed by a driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    PageClosed { page_id: PageId },
    PageCrashed { page_id: PageId },
    Disconnected,
}

pub type DriverEventSender = mpsc::UnboundedSender<DriverEvent>;
pub type DriverEventReceiver = mpsc::UnboundedReceiver<DriverEvent>;

/// Navigation readiness condition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    #[default]
    Load,
    DomContentLoaded,
    NetworkIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Options used to launch one rendering engine
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub headless: bool,
    pub proxy: Option<String>,
    pub executable_path: Option<PathBuf>,
    /// Extra command-line arguments appended after the built-in ones
    pub args: Vec<String>,
    pub request_timeout: Option<Duration>,
}

impl LaunchOptions {
    /// Merge caller overrides on top of these options
    ///
    /// Scalars from `overrides` win when set; argument lists are concatenated.
    #[must_use]
    pub fn merged_with(mut self, overrides: &LaunchOptions) -> Self {
        self.headless = overrides.headless;
        if overrides.proxy.is_some() {
            self.proxy.clone_from(&overrides.proxy);
        }
        if overrides.executable_path.is_some() {
            self.executable_path.clone_from(&overrides.executable_path);
        }
        if overrides.request_timeout.is_some() {
            self.request_timeout = overrides.request_timeout;
        }
        self.args.extend(overrides.args.iter().cloned());
        self
    }
}

/// Options for a fresh isolated browsing context
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    pub user_agent: String,
    pub viewport: Viewport,
}

#[derive(Debug, Clone, Copy)]
pub struct NavigateOptions {
    pub wait_until: WaitUntil,
    pub timeout: Duration,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self {
            wait_until: WaitUntil::Load,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Main-document response observed during a navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub url: String,
}

impl NavigationResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the content type is HTML (a missing content type counts as HTML)
    #[must_use]
    pub fn is_html(&self) -> bool {
        self.content_type.as_deref().is_none_or(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("text/html") || ct.contains("application/xhtml")
        })
    }
}

/// Kind of resource a request is loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    Xhr,
    Fetch,
    Websocket,
    Other,
}

impl ResourceType {
    /// Parse a resource type name, case-insensitively
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let rt = match name.trim().to_ascii_lowercase().as_str() {
            "document" => Self::Document,
            "stylesheet" => Self::Stylesheet,
            "image" => Self::Image,
            "media" => Self::Media,
            "font" => Self::Font,
            "script" => Self::Script,
            "xhr" => Self::Xhr,
            "fetch" => Self::Fetch,
            "websocket" => Self::Websocket,
            "other" => Self::Other,
            _ => return None,
        };
        Some(rt)
    }
}

#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub url: String,
    pub resource_type: ResourceType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Continue,
    Abort,
}

/// Decides whether an outgoing request proceeds
pub trait RequestInterceptor: Send + Sync {
    fn intercept(&self, request: &InterceptedRequest) -> Result<RouteDecision, DriverError>;
}

/// Run a request through an interceptor chain
///
/// Any `Abort` wins. An interceptor error lets the request through rather
/// than leaving it hanging.
pub fn route_request(
    interceptors: &[Arc<dyn RequestInterceptor>],
    request: &InterceptedRequest,
) -> RouteDecision {
    for interceptor in interceptors {
        match interceptor.intercept(request) {
            Ok(RouteDecision::Abort) => return RouteDecision::Abort,
            Ok(RouteDecision::Continue) => {}
            Err(e) => {
                tracing::debug!(url = %request.url, "Interceptor failed, continuing request: {}", e);
            }
        }
    }
    RouteDecision::Continue
}

/// A rendering engine that can be launched
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Launch one engine; lifecycle events for it are pushed into `events`
    async fn launch(
        &self,
        options: LaunchOptions,
        events: DriverEventSender,
    ) -> Result<Arc<dyn BrowserHandle>, DriverError>;
}

/// A running engine
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    async fn new_context(
        &self,
        options: ContextOptions,
    ) -> Result<Arc<dyn ContextHandle>, DriverError>;
    fn is_connected(&self) -> bool;
    async fn close(&self) -> Result<(), DriverError>;
}

/// An isolated browsing context inside an engine
#[async_trait]
pub trait ContextHandle: Send + Sync {
    /// Install an interceptor applied to every page of this context
    async fn route(&self, interceptor: Arc<dyn RequestInterceptor>) -> Result<(), DriverError>;
    async fn new_page(&self) -> Result<Arc<dyn PageHandle>, DriverError>;
    async fn close(&self) -> Result<(), DriverError>;
}

/// One page (tab) in a context
#[async_trait]
pub trait PageHandle: Send + Sync {
    fn id(&self) -> &PageId;
    /// Install an interceptor for this page only, on top of the context's
    async fn route(&self, interceptor: Arc<dyn RequestInterceptor>) -> Result<(), DriverError>;
    /// Navigate; `Ok(None)` means the navigation produced no main-document response
    async fn goto(
        &self,
        url: &str,
        options: &NavigateOptions,
    ) -> Result<Option<NavigationResponse>, DriverError>;
    async fn content(&self) -> Result<String, DriverError>;
    async fn title(&self) -> Result<String, DriverError>;
    async fn url(&self) -> Result<String, DriverError>;
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, DriverError>;
    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), DriverError>;
    async fn close(&self) -> Result<(), DriverError>;
}
