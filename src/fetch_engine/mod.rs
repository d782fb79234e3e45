//! Resilient fetch engine
//!
//! [`FetchOrchestrator`] layers a TTL result cache, a plain-HTTP attempt and
//! pooled browser rendering under a constant-delay retry budget.

pub mod cache;
pub mod challenge;
pub mod errors;
pub mod fetch_types;
pub mod http_fallback;
pub mod human;
pub mod orchestrator;
mod output;
pub mod page_timeout;
pub mod render;
pub mod retry_state;

pub use cache::ResultCache;
pub use challenge::is_challenge_page;
pub use errors::{FetchError, FetchErrorKind};
pub use fetch_types::{ContentType, FetchResult, FetchSource};
pub use http_fallback::{HttpFetcher, HttpResponse, ReqwestFetcher, attempt_http_fallback};
pub use orchestrator::FetchOrchestrator;
pub use page_timeout::with_page_timeout;
pub use render::{RenderSettings, render_fetch};
pub use retry_state::{RetryDecision, RetryState};
