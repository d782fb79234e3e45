//! HTML to Markdown conversion.
//!
//! The orchestrator only sees the [`MarkdownConverter`] trait; conversion runs
//! after a successful fetch and never takes part in retry decisions.

use htmd::HtmlToMarkdown;

#[derive(Debug, thiserror::Error)]
#[error("Markdown conversion failed: {0}")]
pub struct ConversionError(pub String);

pub trait MarkdownConverter: Send + Sync {
    fn convert(&self, html: &str) -> Result<String, ConversionError>;
}

/// Tags whose content never belongs in extracted text
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "iframe", "svg", "template"];

/// Default converter backed by `htmd`
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmdConverter;

impl MarkdownConverter for HtmdConverter {
    fn convert(&self, html: &str) -> Result<String, ConversionError> {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(SKIPPED_TAGS.to_vec())
            .build();
        let markdown = converter
            .convert(html)
            .map_err(|e| ConversionError(e.to_string()))?;
        Ok(collapse_blank_lines(markdown.trim()))
    }
}

/// Collapse runs of blank lines to a single blank line
fn collapse_blank_lines(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut blank_run = 0;
    for line in markdown.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.trim_end().to_string()
}
