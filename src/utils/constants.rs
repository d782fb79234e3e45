//! Shared constants for webfetch
//!
//! Default values and fingerprint pools used throughout the codebase to ensure
//! consistency and avoid magic numbers.

/// Chrome user agent string used by the HTTP fallback
///
/// Reference: https://chromiumdash.appspot.com/schedule
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// User agents rotated across browser instances
///
/// Each instance picks one at random so that concurrent instances do not
/// share an identical fingerprint.
pub const USER_AGENTS: &[&str] = &[
    CHROME_USER_AGENT,
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.6778.205 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.6778.205 Safari/537.36",
];

/// Common desktop viewport sizes (width, height)
pub const VIEWPORTS: &[(u32, u32)] = &[
    (1920, 1080),
    (1680, 1050),
    (1536, 864),
    (1440, 900),
    (1366, 768),
    (1280, 800),
];

/// Accept header sent by the HTTP fallback
pub const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Accept-Language header sent by the HTTP fallback
pub const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Title phrases of bot-verification interstitials
///
/// Generic wording like "captcha" is only trusted in the title; real pages
/// mention it in forms and footers.
pub const CHALLENGE_TITLE_MARKERS: &[&str] = &[
    "just a moment",
    "checking your browser",
    "attention required",
    "access denied",
    "verify you are human",
    "are you a robot",
    "captcha",
    "ddos-guard",
];

/// Body signatures only interstitials carry
///
/// Matched case-insensitively against the first [`CHALLENGE_SCAN_BYTES`].
pub const CHALLENGE_BODY_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "cf-challenge",
    "challenge-platform",
    "cf_chl_opt",
    "checking your browser before accessing",
    "ddos protection by",
    "enable javascript and cookies to continue",
    "verifying you are human",
    "please verify you are a human",
];

/// How much of a response body is scanned for challenge markers
pub const CHALLENGE_SCAN_BYTES: usize = 16 * 1024;

/// Resource types blocked at the context level unless configured otherwise
pub const DEFAULT_BLOCKED_RESOURCE_TYPES: &[&str] = &["image", "font", "media", "websocket"];

/// Resource types additionally blocked on a page fetched in fast mode
pub const FAST_MODE_BLOCKED_RESOURCE_TYPES: &[&str] = &["image", "font", "stylesheet", "media"];

/// Upper bound on the human-behaviour simulation, in milliseconds
pub const HUMAN_SIMULATION_BUDGET_MS: u64 = 3_000;

/// Consecutive launch failures after which pool initialization gives up
pub const MAX_CONSECUTIVE_LAUNCH_FAILURES: usize = 2;
