//! # save_core - Dual-Tier Save-State Engine
//!
//! Persists a player's progress (score, level, stats, unlocks) across sessions.
//! A fast local slot store is reconciled with an authoritative but
//! intermittently reachable remote save API.
//!
//! ## Features
//! - SHA-256 integrity checks on every persisted record
//! - LZ4 compression for large payloads
//! - Transparent schema migration on load
//! - Recovery from corrupted slots (other local slots, then remote)
//! - Coalesced autosave and a periodic background sync sweep
//!
//! ## Usage
//! ```no_run
//! use std::sync::Arc;
//! use save_core::{EngineConfig, HostPlatform, MemoryStorage, PartialSave, SaveEngine};
//!
//! let engine = SaveEngine::builder("demo")
//!     .config(EngineConfig::default())
//!     .platform(Arc::new(HostPlatform::offline()))
//!     .storage(Arc::new(MemoryStorage::new()))
//!     .build()
//!     .unwrap();
//!
//! let partial = PartialSave { score: Some(150), level: Some(3), ..Default::default() };
//! engine.save(partial, Some(1)).unwrap();
//! let loaded = engine.load(Some(1)).unwrap();
//! assert_eq!(loaded.map(|r| r.score), Some(150));
//! ```

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod integrity;
pub mod metrics;
pub mod migration;
pub mod platform;
pub mod record;
pub mod remote;
pub mod slots;
pub mod storage;

pub use config::{EngineConfig, RemoteConfig};
pub use engine::{SaveEngine, SaveEngineBuilder};
pub use error::{Result, SaveError};
pub use metrics::{Metrics, MetricsRecorder};
pub use platform::{HostPlatform, Platform};
pub use record::{PartialSave, SaveRecord, SaveSlot, SaveSlotInfo, SyncStatus};
pub use remote::{HttpSaveApi, MemoryRemote, RemoteSaveApi, RemoteSyncClient, SyncOutcome};
pub use slots::{SlotMeta, SlotRead, SlotStore};
pub use storage::{FileStorage, MemoryStorage, SaveStorage};

/// Schema version stamped on every record handed out by the engine.
pub const CURRENT_SAVE_VERSION: u32 = 2;

/// Number of local save slots per game.
pub const MAX_SLOTS: u8 = 5;

/// Slot reserved for autosave.
pub const AUTOSAVE_SLOT: u8 = 0;

/// Serialized size (bytes) above which payloads are compressed.
pub const COMPRESSION_THRESHOLD: usize = 1024;

/// Interval of the periodic remote-sync sweep (seconds).
pub const SYNC_INTERVAL_SECS: u64 = 30;

/// Crate version, used as the default `buildVersion` of new records.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
