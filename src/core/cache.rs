//! Caller-owned memo of finished simulations.
//!
//! Entries are keyed by the serialized config, live for a fixed TTL, and are
//! bounded by an entry count. Configs without a seed are random by
//! construction and always run fresh.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::debug;
use moka::sync::Cache;

use super::engine::simulate;
use super::types::{SimulationConfig, SimulationResult};
use super::validate::ConfigError;

pub struct SimulationCache {
    cache: Cache<String, Arc<SimulationResult>>,
    capacity: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SimulationCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .eviction_listener(|_key, _value, cause| {
                debug!("dropped cached simulation ({cause:?})");
            })
            .build();
        Self {
            cache,
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get_or_simulate(
        &self,
        config: &SimulationConfig,
    ) -> Result<Arc<SimulationResult>, ConfigError> {
        let Some(key) = cache_key(config) else {
            return simulate(config).map(Arc::new);
        };

        if let Some(result) = self.cache.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(result);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let result = Arc::new(simulate(config)?);
        if self.capacity > 0 {
            self.cache.insert(key, Arc::clone(&result));
        }
        Ok(result)
    }

    /// Runs pending housekeeping so expired and over-capacity entries are dropped now.
    pub fn purge_expired(&self) {
        self.cache.run_pending_tasks();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

// The full serialized config is the key, so distinct configs never share an entry.
fn cache_key(config: &SimulationConfig) -> Option<String> {
    config.seed?;
    serde_json::to_string(config).ok()
}
