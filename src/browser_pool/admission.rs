//! Strict serialization gate around pool capacity decisions.
//!
//! The instance set lives behind a FIFO `tokio::sync::Mutex`; holding the
//! guard is the only way to read-decide-mutate it. Waiters are served in
//! arrival order, so the gate behaves as a queue with concurrency 1.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};

use super::errors::PoolError;
use super::instance::ManagedInstance;

pub type InstanceSet = Vec<Arc<ManagedInstance>>;

#[derive(Debug, Default)]
pub struct AdmissionQueue {
    instances: Mutex<InstanceSet>,
    shutting_down: AtomicBool,
}

impl AdmissionQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the serialized section; fails fast once shutdown started
    pub async fn enter(&self) -> Result<MutexGuard<'_, InstanceSet>, PoolError> {
        if self.is_shutting_down() {
            return Err(PoolError::ShuttingDown);
        }
        let guard = self.instances.lock().await;
        // shutdown may have begun while this caller was queued
        if self.is_shutting_down() {
            return Err(PoolError::ShuttingDown);
        }
        Ok(guard)
    }

    /// Refuse new entries; callers already inside finish normally
    pub fn close(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Wait for in-flight work, then take every instance out
    pub async fn drain(&self) -> InstanceSet {
        std::mem::take(&mut *self.instances.lock().await)
    }

    /// Copy of the current instance handles
    pub async fn peek(&self) -> InstanceSet {
        self.instances.lock().await.clone()
    }
}
