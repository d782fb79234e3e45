use chrono::Utc;
use tracing::warn;

use super::fetch_types::{ContentType, FetchResult, FetchSource};
use crate::content::MarkdownConverter;

/// Raw page material before output shaping
#[derive(Debug, Clone)]
pub(crate) struct FetchedPage {
    pub html: String,
    pub title: String,
    pub final_url: String,
    pub status_code: u16,
    pub source: FetchSource,
}

/// Build the caller-facing result, converting to Markdown when asked
///
/// A failed conversion keeps the HTML and records the failure in `error`.
pub(crate) fn shape_output(
    page: FetchedPage,
    markdown: bool,
    converter: &dyn MarkdownConverter,
) -> FetchResult {
    let mut result = FetchResult {
        content: page.html,
        content_type: ContentType::Html,
        title: page.title,
        final_url: page.final_url,
        is_from_cache: false,
        status_code: page.status_code,
        error: None,
        source: page.source,
        fetched_at: Utc::now(),
    };
    if markdown {
        convert_in_place(&mut result, converter);
    }
    result
}

/// Re-encode an HTML result as Markdown
pub(crate) fn convert_in_place(result: &mut FetchResult, converter: &dyn MarkdownConverter) {
    if result.content_type == ContentType::Markdown {
        return;
    }
    match converter.convert(&result.content) {
        Ok(markdown) => {
            result.content = markdown;
            result.content_type = ContentType::Markdown;
            result.error = None;
        }
        Err(e) => {
            warn!(url = %result.final_url, "Returning HTML: {}", e);
            result.error = Some(e.to_string());
        }
    }
}
