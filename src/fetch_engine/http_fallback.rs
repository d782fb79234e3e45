//! Cheap plain-HTTP attempt made before any browser is involved

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, USER_AGENT};
use std::time::Duration;
use tracing::debug;

use super::challenge::is_challenge_page;
use super::errors::FetchError;
use super::fetch_types::{ContentType, FetchResult, FetchSource};
use super::output::{FetchedPage, shape_output};
use crate::config::FetchConfig;
use crate::content::{MarkdownConverter, extract_title};
use crate::utils::{BROWSER_ACCEPT, BROWSER_ACCEPT_LANGUAGE, CHROME_USER_AGENT};

/// What the HTTP collaborator hands back for a GET
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    /// URL after redirects
    pub final_url: String,
    pub body: String,
}

impl HttpResponse {
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }
}

/// GET with browser-like headers, redirect following and a timeout
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, FetchError>;
}

/// Default [`HttpFetcher`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, CHROME_USER_AGENT.parse()?);
        headers.insert(ACCEPT, BROWSER_ACCEPT.parse()?);
        headers.insert(ACCEPT_LANGUAGE, BROWSER_ACCEPT_LANGUAGE.parse()?);

        let client = Client::builder()
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::HttpFallbackFailed(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::HttpFallbackFailed(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            final_url,
            body,
        })
    }
}

/// Content type classes the fallback accepts
fn accepted_content(content_type: Option<&str>, markdown: bool) -> Option<ContentType> {
    let Some(ct) = content_type else {
        return Some(ContentType::Html);
    };
    let ct = ct.to_ascii_lowercase();
    if ct.contains("text/html") || ct.contains("application/xhtml") {
        Some(ContentType::Html)
    } else if markdown && ct.contains("text/markdown") {
        Some(ContentType::Markdown)
    } else {
        None
    }
}

/// Try the URL over plain HTTP
///
/// Every error here is recoverable: the orchestrator falls through to
/// rendering on any of them.
pub async fn attempt_http_fallback(
    fetcher: &dyn HttpFetcher,
    url: &str,
    config: &FetchConfig,
    converter: &dyn MarkdownConverter,
) -> Result<FetchResult, FetchError> {
    let response = fetcher.get(url, config.http_timeout()).await?;

    if !(200..300).contains(&response.status) {
        return Err(FetchError::Http {
            status_code: response.status,
        });
    }

    let Some(content_type) = accepted_content(response.content_type(), config.markdown()) else {
        return Err(FetchError::NonHtmlContent {
            content_type: response.content_type().unwrap_or_default().to_string(),
        });
    };

    if content_type == ContentType::Markdown {
        debug!(url = %url, "Server returned Markdown directly");
        let title = response
            .body
            .lines()
            .find_map(|line| line.strip_prefix("# "))
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        return Ok(FetchResult {
            content: response.body,
            content_type,
            title,
            final_url: response.final_url,
            is_from_cache: false,
            status_code: response.status,
            error: None,
            source: FetchSource::Http,
            fetched_at: chrono::Utc::now(),
        });
    }

    let title = extract_title(&response.body);
    if is_challenge_page(title.as_deref(), &response.body) {
        return Err(FetchError::ChallengePage);
    }

    Ok(shape_output(
        FetchedPage {
            html: response.body,
            title: title.unwrap_or_default(),
            final_url: response.final_url,
            status_code: response.status,
            source: FetchSource::Http,
        },
        config.markdown(),
        converter,
    ))
}
