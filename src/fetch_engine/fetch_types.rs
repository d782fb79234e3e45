use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::browser_pool::BrowserMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Html,
    Markdown,
}

/// Which path produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchSource {
    Http,
    Browser(BrowserMode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub content: String,
    pub content_type: ContentType,
    pub title: String,
    pub final_url: String,
    pub is_from_cache: bool,
    pub status_code: u16,
    /// Set when post-processing failed but the fetch itself succeeded
    pub error: Option<String>,
    pub source: FetchSource,
    pub fetched_at: DateTime<Utc>,
}

impl FetchResult {
    #[must_use]
    pub fn is_markdown(&self) -> bool {
        self.content_type == ContentType::Markdown
    }
}
