//! Error taxonomy of the fetch engine

use serde::{Deserialize, Serialize};

use crate::browser_pool::PoolError;
use crate::driver::DriverError;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error {status_code}")]
    Http { status_code: u16 },

    #[error("Non-HTML content: {content_type}")]
    NonHtmlContent { content_type: String },

    /// Bot-check interstitial; only ever routes the HTTP fallback to rendering
    #[error("Challenge page detected")]
    ChallengePage,

    #[error("Browser pool initialization failed: {0}")]
    PoolInitFailed(String),

    #[error("Browser pool unavailable: {0}")]
    PoolUnavailable(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("No response received for {url}")]
    NoResponse { url: String },

    #[error("Render queue produced no result: {0}")]
    QueueNoResult(String),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("HTTP fallback failed: {0}")]
    HttpFallbackFailed(String),

    /// Terminal wrap once the render-retry budget is spent
    #[error("Fetch failed after {retries} retries: {source}")]
    RetriesExhausted {
        retries: u32,
        source: Box<FetchError>,
    },
}

/// Discriminant of [`FetchError`], with retry wraps resolved to their cause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Http,
    NonHtmlContent,
    ChallengePage,
    PoolInitFailed,
    PoolUnavailable,
    NavigationFailed,
    NoResponse,
    QueueNoResult,
    FetchFailed,
    HttpFallbackFailed,
}

impl FetchError {
    #[must_use]
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Http { .. } => FetchErrorKind::Http,
            FetchError::NonHtmlContent { .. } => FetchErrorKind::NonHtmlContent,
            FetchError::ChallengePage => FetchErrorKind::ChallengePage,
            FetchError::PoolInitFailed(_) => FetchErrorKind::PoolInitFailed,
            FetchError::PoolUnavailable(_) => FetchErrorKind::PoolUnavailable,
            FetchError::NavigationFailed(_) => FetchErrorKind::NavigationFailed,
            FetchError::NoResponse { .. } => FetchErrorKind::NoResponse,
            FetchError::QueueNoResult(_) => FetchErrorKind::QueueNoResult,
            FetchError::FetchFailed(_) => FetchErrorKind::FetchFailed,
            FetchError::HttpFallbackFailed(_) => FetchErrorKind::HttpFallbackFailed,
            FetchError::RetriesExhausted { source, .. } => source.kind(),
        }
    }

    /// Innermost error, looking through retry wraps
    #[must_use]
    pub fn root(&self) -> &FetchError {
        match self {
            FetchError::RetriesExhausted { source, .. } => source.root(),
            other => other,
        }
    }

    /// HTTP status of the innermost error, if it was one
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self.root() {
            FetchError::Http { status_code } => Some(*status_code),
            _ => None,
        }
    }
}

impl From<PoolError> for FetchError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::InitFailed(reason) => FetchError::PoolInitFailed(reason),
            other => FetchError::PoolUnavailable(other.to_string()),
        }
    }
}

impl From<DriverError> for FetchError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::Navigation(reason) => FetchError::NavigationFailed(reason),
            timeout @ DriverError::Timeout { .. } => FetchError::NavigationFailed(timeout.to_string()),
            gone @ DriverError::Disconnected => FetchError::PoolUnavailable(gone.to_string()),
            other => FetchError::FetchFailed(other.to_string()),
        }
    }
}
