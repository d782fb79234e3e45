//! URL-keyed result cache with lazy TTL eviction

use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::fetch_types::FetchResult;

#[derive(Debug, Clone)]
struct CacheEntry {
    result: FetchResult,
    stored_at: Instant,
}

/// Stale entries are removed on the lookup that finds them; there is no
/// background sweeper. A zero TTL disables the cache entirely.
#[derive(Debug)]
pub struct ResultCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl ResultCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Live entry for `url`, marked as served from cache
    pub fn get(&self, url: &str) -> Option<FetchResult> {
        if !self.is_enabled() {
            return None;
        }
        let entry = self.entries.get(url)?;
        if entry.stored_at.elapsed() >= self.ttl {
            drop(entry);
            self.entries
                .remove_if(url, |_, e| e.stored_at.elapsed() >= self.ttl);
            return None;
        }
        let mut result = entry.result.clone();
        result.is_from_cache = true;
        Some(result)
    }

    pub fn set(&self, url: &str, result: &FetchResult) {
        if !self.is_enabled() {
            return;
        }
        let mut result = result.clone();
        result.is_from_cache = false;
        self.entries.insert(
            url.to_string(),
            CacheEntry {
                result,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, url: &str) -> bool {
        self.entries.remove(url).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, stale ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
