//! # Engine Configuration
//!
//! Timers, thresholds and the remote endpoint for one save engine.
//!
//! ```rust
//! use save_core::EngineConfig;
//!
//! let config = EngineConfig::default();
//! assert_eq!(config.sync_interval_secs, 30);
//!
//! let yaml = "autosave_debounce_ms: 250\nremote:\n  base_url: https://saves.example.com/api\n";
//! let config = EngineConfig::from_yaml_str(yaml).unwrap();
//! assert_eq!(config.remote.unwrap().timeout_secs, 10);
//! ```

use crate::error::SaveError;
use crate::{COMPRESSION_THRESHOLD, SYNC_INTERVAL_SECS, VERSION};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Coalescing window for autosave bursts
    pub autosave_debounce_ms: u64,
    /// Delay between a local save and its queued upload
    pub upload_debounce_ms: u64,
    /// Periodic remote-sync sweep
    pub sync_interval_secs: u64,
    /// Serialized size above which payloads are compressed
    pub compression_threshold: usize,
    /// Stamped as `buildVersion` on new records
    pub build_version: String,
    /// Stamped as `platform` on new records
    pub platform: String,
    /// Remote save API; `None` means local-only
    pub remote: Option<RemoteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            autosave_debounce_ms: 1_000,
            upload_debounce_ms: 1_500,
            sync_interval_secs: SYNC_INTERVAL_SECS,
            compression_threshold: COMPRESSION_THRESHOLD,
            build_version: VERSION.to_string(),
            platform: std::env::consts::OS.to_string(),
            remote: None,
        }
    }
}

impl EngineConfig {
    /// Short timers for tests and tooling
    pub fn testing() -> Self {
        Self { autosave_debounce_ms: 50, upload_debounce_ms: 20, ..Self::default() }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, SaveError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| SaveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self, SaveError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SaveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// `.yaml`/`.yml` files are parsed as YAML, everything else as JSON.
    pub fn from_file(path: &Path) -> Result<Self, SaveError> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    pub fn validate(&self) -> Result<(), SaveError> {
        if self.sync_interval_secs == 0 {
            return Err(SaveError::Config("sync_interval_secs must be positive".into()));
        }
        if self.compression_threshold == 0 {
            return Err(SaveError::Config("compression_threshold must be positive".into()));
        }
        if let Some(remote) = &self.remote {
            if remote.base_url.trim().is_empty() {
                return Err(SaveError::Config("remote.base_url must not be empty".into()));
            }
        }
        Ok(())
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    pub fn upload_debounce(&self) -> Duration {
        Duration::from_millis(self.upload_debounce_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}
