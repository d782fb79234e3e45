//! Per-call retry bookkeeping for the render loop
//!
//! `render_attempt` counts render attempts already made and is never reset
//! within a call. `pool_init_attempt` counts pool-initialization retries and
//! does not touch the render budget. `fast_mode` only ever goes from true to
//! false.

use std::time::Duration;

use crate::config::FetchConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Switch to thorough mode and retry without waiting
    EscalateToThorough,
    /// Wait, then retry in the same mode
    RetryAfter(Duration),
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct RetryState {
    pub url: String,
    pub config: FetchConfig,
    pub render_attempt: u32,
    pub pool_init_attempt: u32,
    pub fast_mode: bool,
}

impl RetryState {
    #[must_use]
    pub fn new(url: impl Into<String>, config: FetchConfig) -> Self {
        let fast_mode = config.default_fast_mode();
        Self {
            url: url.into(),
            config,
            render_attempt: 0,
            pool_init_attempt: 0,
            fast_mode,
        }
    }

    /// Nothing has been attempted yet
    #[must_use]
    pub fn is_first_pass(&self) -> bool {
        self.render_attempt == 0 && self.pool_init_attempt == 0
    }

    /// Headed mode is forced, or the fallback applies from the third attempt
    /// on and for flagged domains
    #[must_use]
    pub fn wants_headed(&self, domain_flagged: bool) -> bool {
        (self.config.use_headed_mode_fallback() && (self.render_attempt >= 2 || domain_flagged))
            || self.config.use_headed_mode()
    }

    /// Headed mode was reached through the attempt-count escalation alone
    #[must_use]
    pub fn escalated_to_headed(&self) -> bool {
        !self.config.use_headed_mode()
            && self.config.use_headed_mode_fallback()
            && self.render_attempt >= 2
    }

    /// Record a pool-initialization failure; true when one more try is allowed
    pub fn on_pool_init_failure(&mut self) -> bool {
        if self.pool_init_attempt < 1 {
            self.pool_init_attempt += 1;
            true
        } else {
            false
        }
    }

    /// Route a failed render attempt
    pub fn on_render_failure(&mut self) -> RetryDecision {
        if self.render_attempt == 0 && self.fast_mode && self.pool_init_attempt == 0 {
            self.fast_mode = false;
            self.render_attempt += 1;
            RetryDecision::EscalateToThorough
        } else if self.render_attempt < self.config.max_retries() {
            self.render_attempt += 1;
            RetryDecision::RetryAfter(self.config.retry_delay())
        } else {
            RetryDecision::GiveUp
        }
    }
}
