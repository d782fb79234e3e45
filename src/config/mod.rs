//! Configuration module for fetching
//!
//! This module provides the `FetchConfig` struct, its builder, and per-call
//! `FetchOptions` with the pure `resolve_config` overlay.

// Sub-modules
pub mod builder;
pub mod getters;
pub mod options;
pub mod types;

// Re-exports for public API
pub use builder::FetchConfigBuilder;
pub use options::{FetchOptions, resolve_config};
pub use types::FetchConfig;
