use crate::error::SaveError;
use crate::storage::{metrics_key, SaveStorage};

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Diagnostic counters for one game's save engine.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Metrics {
    pub total_saves: u64,
    pub cloud_saves: u64,
    pub conflicts: u64,
    pub corruptions: u64,
    pub network_errors: u64,
    /// Last successful upload (unix milliseconds)
    pub last_sync: Option<u64>,
    /// Running mean of persisted payload sizes (bytes)
    pub avg_save_size: f64,
}

/// Owns the counters and their persisted snapshot.
pub struct MetricsRecorder {
    storage: Arc<dyn SaveStorage>,
    key: String,
    state: Mutex<Metrics>,
}

impl MetricsRecorder {
    /// Start from the most recent persisted snapshot, if one is readable.
    pub fn load(storage: Arc<dyn SaveStorage>, game_id: &str) -> Self {
        let key = metrics_key(game_id);
        let metrics = match storage.get(&key) {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable metrics snapshot for '{}': {}", game_id, e);
                Metrics::default()
            }),
            Ok(None) => Metrics::default(),
            Err(e) => {
                log::warn!("Could not read metrics snapshot for '{}': {}", game_id, e);
                Metrics::default()
            }
        };

        Self { storage, key, state: Mutex::new(metrics) }
    }

    fn update(&self, f: impl FnOnce(&mut Metrics)) {
        match self.state.lock() {
            Ok(mut metrics) => f(&mut metrics),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    pub fn snapshot(&self) -> Metrics {
        match self.state.lock() {
            Ok(metrics) => metrics.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn record_save(&self, size: usize) {
        self.update(|m| {
            m.total_saves += 1;
            let n = m.total_saves as f64;
            m.avg_save_size += (size as f64 - m.avg_save_size) / n;
        });
    }

    pub fn record_cloud_save(&self, now_millis: u64) {
        self.update(|m| {
            m.cloud_saves += 1;
            m.last_sync = Some(now_millis);
        });
    }

    pub fn record_network_error(&self) {
        self.update(|m| m.network_errors += 1);
    }

    pub fn record_conflict(&self) {
        self.update(|m| m.conflicts += 1);
    }

    pub fn record_corruption(&self) {
        self.update(|m| m.corruptions += 1);
    }

    pub fn persist(&self) -> Result<(), SaveError> {
        let bytes = serde_json::to_vec(&self.snapshot())?;
        self.storage.set(&self.key, &bytes)
    }
}
