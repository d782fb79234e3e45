use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use super::config::BrowserMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceHealth {
    Healthy,
    Unhealthy,
}

/// Point-in-time copy of one instance's counters
#[derive(Debug, Clone, Serialize)]
pub struct InstanceMetrics {
    pub id: u64,
    pub health: InstanceHealth,
    pub launched_at: DateTime<Utc>,
    pub age: Duration,
    pub idle: Duration,
    pub open_pages: usize,
    pub pages_created: u64,
    pub error_count: u64,
}

/// Aggregate view of a pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub mode: BrowserMode,
    pub instances: usize,
    pub healthy_instances: usize,
    pub open_pages: usize,
    pub pages_created: u64,
    pub errors: u64,
    pub shutting_down: bool,
}

impl PoolStats {
    #[must_use]
    pub fn from_metrics(mode: BrowserMode, metrics: &[InstanceMetrics], shutting_down: bool) -> Self {
        Self {
            mode,
            instances: metrics.len(),
            healthy_instances: metrics
                .iter()
                .filter(|m| m.health == InstanceHealth::Healthy)
                .count(),
            open_pages: metrics.iter().map(|m| m.open_pages).sum(),
            pages_created: metrics.iter().map(|m| m.pages_created).sum(),
            errors: metrics.iter().map(|m| m.error_count).sum(),
            shutting_down,
        }
    }
}
