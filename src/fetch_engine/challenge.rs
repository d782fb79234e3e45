//! Bot-verification interstitial detection

use regex::Regex;
use std::sync::LazyLock;

use crate::utils::{CHALLENGE_BODY_MARKERS, CHALLENGE_SCAN_BYTES, CHALLENGE_TITLE_MARKERS};

fn marker_pattern(markers: &[&str]) -> Regex {
    let alternation = markers
        .iter()
        .map(|marker| regex::escape(marker))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i){alternation}"))
        .expect("BUG: hardcoded challenge marker regex is invalid")
}

static TITLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| marker_pattern(CHALLENGE_TITLE_MARKERS));

static BODY_PATTERN: LazyLock<Regex> = LazyLock::new(|| marker_pattern(CHALLENGE_BODY_MARKERS));

/// Whether a response looks like a challenge page rather than real content
///
/// Generic phrases count only in the title. The body is checked for
/// interstitial signatures within its first bytes; markers deep in a long
/// article are not a challenge.
#[must_use]
pub fn is_challenge_page(title: Option<&str>, body: &str) -> bool {
    if title.is_some_and(|t| TITLE_PATTERN.is_match(t)) {
        return true;
    }
    BODY_PATTERN.is_match(scan_window(body))
}

fn scan_window(body: &str) -> &str {
    if body.len() <= CHALLENGE_SCAN_BYTES {
        return body;
    }
    let mut end = CHALLENGE_SCAN_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
