//! One render attempt on a pooled page

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::errors::FetchError;
use super::fetch_types::{FetchResult, FetchSource};
use super::human::simulate_human_behavior;
use super::output::{FetchedPage, shape_output};
use super::page_timeout::with_page_timeout;
use super::retry_state::RetryState;
use crate::browser_pool::{BrowserMode, PooledPage, ResourceBlocker};
use crate::content::{MarkdownConverter, extract_title};
use crate::driver::{NavigateOptions, RequestInterceptor, WaitUntil};

/// Slack on top of the driver's own navigation timeout
const NAVIGATION_GRACE: Duration = Duration::from_secs(5);

/// Upper bound for reading content, title and URL off a loaded page
const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Knobs for a single render attempt
#[derive(Debug, Clone, Copy)]
pub struct RenderSettings {
    pub mode: BrowserMode,
    pub fast_mode: bool,
    pub simulate_human: bool,
    pub markdown: bool,
    pub navigation_timeout: Duration,
    pub wait_until: WaitUntil,
}

impl RenderSettings {
    #[must_use]
    pub fn for_attempt(state: &RetryState, mode: BrowserMode) -> Self {
        Self {
            mode,
            fast_mode: state.fast_mode,
            simulate_human: state.config.simulate_human_behavior(),
            markdown: state.config.markdown(),
            navigation_timeout: state.config.navigation_timeout(),
            wait_until: state.config.wait_until(),
        }
    }
}

/// Navigate the page to `url` and shape what it rendered
pub async fn render_fetch(
    pooled: &PooledPage,
    url: &str,
    settings: RenderSettings,
    converter: &dyn MarkdownConverter,
) -> Result<FetchResult, FetchError> {
    let page = pooled.page();

    if settings.fast_mode {
        let blocker: Arc<dyn RequestInterceptor> = Arc::new(ResourceBlocker::fast_mode());
        page.route(blocker).await?;
    }

    let options = NavigateOptions {
        wait_until: settings.wait_until,
        timeout: settings.navigation_timeout,
    };
    let response = with_page_timeout(
        page.goto(url, &options),
        settings.navigation_timeout + NAVIGATION_GRACE,
        "Navigation",
    )
    .await?
    .ok_or_else(|| FetchError::NoResponse {
        url: url.to_string(),
    })?;

    if !response.is_success() {
        return Err(FetchError::Http {
            status_code: response.status,
        });
    }
    if !response.is_html() {
        return Err(FetchError::NonHtmlContent {
            content_type: response.content_type.clone().unwrap_or_default(),
        });
    }

    if !settings.fast_mode && settings.simulate_human {
        simulate_human_behavior(page.as_ref(), pooled.viewport()).await;
    }

    let html = with_page_timeout(page.content(), EXTRACTION_TIMEOUT, "Content extraction").await?;
    let title = match with_page_timeout(page.title(), EXTRACTION_TIMEOUT, "Title extraction").await {
        Ok(title) if !title.trim().is_empty() => title.trim().to_string(),
        Ok(_) => extract_title(&html).unwrap_or_default(),
        Err(e) => {
            debug!(url = %url, "Falling back to parsed title: {}", e);
            extract_title(&html).unwrap_or_default()
        }
    };
    let final_url = with_page_timeout(page.url(), EXTRACTION_TIMEOUT, "URL lookup")
        .await
        .unwrap_or_else(|_| response.url.clone());

    Ok(shape_output(
        FetchedPage {
            html,
            title,
            final_url,
            status_code: response.status,
            source: FetchSource::Browser(settings.mode),
        },
        settings.markdown,
        converter,
    ))
}
