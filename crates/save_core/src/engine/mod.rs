//! Save orchestrator: one engine instance per game.
//!
//! Local writes are synchronous and authoritative for the caller. Remote
//! uploads, the autosave debounce and the periodic sync sweep run on a
//! background worker thread owned by the engine.

pub mod bundle;
mod core;
mod worker;

pub use bundle::{BundleEntry, SaveBundle};

use self::core::EngineCore;
use self::worker::Command;

use crate::config::EngineConfig;
use crate::error::SaveError;
use crate::metrics::{Metrics, MetricsRecorder};
use crate::platform::{HostPlatform, Platform};
use crate::record::{PartialSave, SaveRecord, SaveSlot, SaveSlotInfo};
use crate::remote::{HttpSaveApi, RemoteSaveApi, RemoteSyncClient};
use crate::slots::SlotStore;
use crate::storage::{MemoryStorage, SaveStorage};

use schemars::schema::RootSchema;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

pub struct SaveEngineBuilder {
    game_id: String,
    config: EngineConfig,
    platform: Option<Arc<dyn Platform>>,
    storage: Option<Arc<dyn SaveStorage>>,
    remote_api: Option<Arc<dyn RemoteSaveApi>>,
    session_id: Option<String>,
    background_worker: bool,
}

impl SaveEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn platform(mut self, platform: Arc<dyn Platform>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn SaveStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Remote API to use instead of the HTTP client built from `config.remote`.
    pub fn remote_api(mut self, api: Arc<dyn RemoteSaveApi>) -> Self {
        self.remote_api = Some(api);
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Without the worker, autosaves and uploads only happen through
    /// `flush_autosave`, `sync_now` and `cleanup`.
    pub fn background_worker(mut self, enabled: bool) -> Self {
        self.background_worker = enabled;
        self
    }

    pub fn build(self) -> Result<SaveEngine, SaveError> {
        if self.game_id.trim().is_empty() {
            return Err(SaveError::Validation("gameId must not be empty".to_string()));
        }
        self.config.validate()?;

        let platform = self.platform.unwrap_or_else(|| Arc::new(HostPlatform::offline()));
        let storage = self.storage.unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let session_id = self.session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let api: Option<Arc<dyn RemoteSaveApi>> = match (self.remote_api, &self.config.remote) {
            (Some(api), _) => Some(api),
            (None, Some(remote)) => Some(Arc::new(HttpSaveApi::new(remote)?)),
            (None, None) => None,
        };

        let core = Arc::new(EngineCore::new(
            self.game_id.clone(),
            session_id,
            self.config,
            platform.clone(),
            SlotStore::new(storage.clone(), self.game_id.clone()),
            RemoteSyncClient::new(api, platform, self.game_id.clone()),
            MetricsRecorder::load(storage, &self.game_id),
        ));

        let worker = if self.background_worker {
            let (sender, receiver) = mpsc::channel();
            let worker_core = core.clone();
            let handle = std::thread::Builder::new()
                .name(format!("save-sync-{}", self.game_id))
                .spawn(move || worker::run(worker_core, receiver))?;
            core.attach_worker(sender);
            Some(handle)
        } else {
            None
        };

        log::info!("Save engine ready for '{}' (session {})", core.game_id(), core.session_id());

        Ok(SaveEngine { core, worker: Mutex::new(worker), closed: AtomicBool::new(false) })
    }
}

pub struct SaveEngine {
    core: Arc<EngineCore>,
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl SaveEngine {
    pub fn builder(game_id: impl Into<String>) -> SaveEngineBuilder {
        SaveEngineBuilder {
            game_id: game_id.into(),
            config: EngineConfig::default(),
            platform: None,
            storage: None,
            remote_api: None,
            session_id: None,
            background_worker: true,
        }
    }

    pub fn game_id(&self) -> &str {
        self.core.game_id()
    }

    pub fn session_id(&self) -> &str {
        self.core.session_id()
    }

    // ========================
    // Save / load
    // ========================

    /// Validate, checksum and persist `partial` locally, then queue the
    /// upload. Without a slot, a time-bucketed slot is chosen.
    pub fn save(&self, partial: PartialSave, slot: Option<u8>) -> Result<SaveRecord, SaveError> {
        self.core.save(partial, slot)
    }

    /// `save` for a host-provided JSON object.
    pub fn save_json(&self, value: Value, slot: Option<u8>) -> Result<SaveRecord, SaveError> {
        self.save(SaveRecord::partial_from_json(value)?, slot)
    }

    /// Remote-first load with local fallback and corruption recovery.
    /// `Ok(None)` means nothing usable exists.
    pub fn load(&self, slot: Option<u8>) -> Result<Option<SaveRecord>, SaveError> {
        self.core.load(slot)
    }

    /// Coalesce `partial` into the pending autosave for slot 0.
    pub fn auto_save(&self, partial: PartialSave) -> Result<(), SaveError> {
        let opened = self.core.merge_autosave(partial)?;

        if self.closed.load(Ordering::SeqCst) {
            // No worker left to fire the debounce.
            self.core.flush_autosave()?;
            return Ok(());
        }

        if opened && !self.core.enqueue(Command::ScheduleAutosave) {
            log::debug!("Autosave pending until flushed");
        }
        Ok(())
    }

    pub fn flush_autosave(&self) -> Result<Option<SaveRecord>, SaveError> {
        self.core.flush_autosave()
    }

    pub fn has_pending_autosave(&self) -> bool {
        self.core.has_pending_autosave()
    }

    // ========================
    // Slots
    // ========================

    /// Every readable local slot, most recently updated first.
    pub fn get_all_saves(&self) -> Result<Vec<SaveSlot>, SaveError> {
        self.core.all_saves()
    }

    pub fn slot_info(&self, slot: u8) -> Result<Option<SaveSlotInfo>, SaveError> {
        SlotStore::validate_slot(slot)?;
        Ok(self
            .core
            .all_saves()?
            .iter()
            .find(|save| save.slot == slot)
            .map(SaveSlotInfo::from_slot))
    }

    pub fn delete_save(&self, slot: u8) -> Result<(), SaveError> {
        self.core.delete(slot)
    }

    pub fn export_saves(&self) -> Result<String, SaveError> {
        self.core.export()?.to_json()
    }

    /// Returns the number of records written.
    pub fn import_saves(&self, bundle: &str) -> Result<usize, SaveError> {
        self.core.import(SaveBundle::from_json(bundle)?)
    }

    // ========================
    // Remote sync
    // ========================

    pub fn is_remote_available(&self) -> bool {
        self.core.remote.is_available()
    }

    /// Connectivity event from the host. Coming online triggers a sweep.
    pub fn notify_connectivity(&self, online: bool) {
        log::info!("Connectivity changed: {}", if online { "online" } else { "offline" });
        if !self.core.enqueue(Command::Connectivity(online)) && online {
            self.core.sync_sweep();
        }
    }

    /// Run one sync sweep on the calling thread. Returns the slots uploaded.
    pub fn sync_now(&self) -> usize {
        self.core.sync_sweep()
    }

    pub fn get_metrics(&self) -> Metrics {
        self.core.metrics.snapshot()
    }

    /// JSON schema of the persisted record shape.
    pub fn record_schema() -> RootSchema {
        schemars::schema_for!(SaveRecord)
    }

    // ========================
    // Shutdown
    // ========================

    /// Stop the worker, write any pending autosave and persist metrics.
    /// Later calls do nothing.
    pub fn cleanup(&self) -> Result<(), SaveError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(sender) = self.core.detach_worker() {
            let _ = sender.send(Command::Shutdown);
        }
        let handle = self.worker.lock().ok().and_then(|mut worker| worker.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Sync worker for '{}' panicked", self.core.game_id());
            }
        }

        self.core.flush_autosave()?;
        self.core.metrics.persist()?;

        log::info!("Save engine for '{}' shut down", self.core.game_id());
        Ok(())
    }
}

impl Drop for SaveEngine {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            log::error!("Save engine cleanup failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_SLOTS;

    fn engine() -> SaveEngine {
        SaveEngine::builder("demo")
            .config(EngineConfig::testing())
            .background_worker(false)
            .build()
            .unwrap()
    }

    fn partial(score: i64, level: u32) -> PartialSave {
        PartialSave { score: Some(score), level: Some(level), ..Default::default() }
    }

    #[test]
    fn test_builder_rejects_empty_game_id() {
        assert!(matches!(SaveEngine::builder("  ").build(), Err(SaveError::Validation(_))));
    }

    #[test]
    fn test_builder_generates_session_id() {
        let a = engine();
        let b = engine();
        assert!(!a.session_id().is_empty());
        assert_ne!(a.session_id(), b.session_id());
    }

    #[test]
    fn test_invalid_slot_rejected() {
        let engine = engine();
        assert!(matches!(engine.save(partial(1, 1), Some(MAX_SLOTS)), Err(SaveError::InvalidSlot { .. })));
        assert!(matches!(engine.load(Some(MAX_SLOTS)), Err(SaveError::InvalidSlot { .. })));
    }

    #[test]
    fn test_save_json_rejects_wrong_types() {
        let engine = engine();
        let result = engine.save_json(serde_json::json!({"score": "lots"}), Some(1));
        assert!(matches!(result, Err(SaveError::Validation(_))));
    }

    #[test]
    fn test_slot_info_display() {
        let engine = engine();
        engine.save(partial(150, 3), Some(2)).unwrap();

        let info = engine.slot_info(2).unwrap().unwrap();
        assert_eq!(info.slot, 2);
        assert!(info.display_text().contains("Level 3"));
        assert!(engine.slot_info(3).unwrap().is_none());
    }

    #[test]
    fn test_auto_save_after_cleanup_writes_immediately() {
        let engine = engine();
        engine.cleanup().unwrap();
        engine.auto_save(partial(7, 1)).unwrap();

        assert!(!engine.has_pending_autosave());
        assert_eq!(engine.load(Some(crate::AUTOSAVE_SLOT)).unwrap().map(|r| r.score), Some(7));
    }

    #[test]
    fn test_record_schema_names_fields() {
        let schema = serde_json::to_value(SaveEngine::record_schema()).unwrap();
        let properties = &schema["properties"];
        assert!(properties.get("gameId").is_some());
        assert!(properties.get("saveVersion").is_some());
    }
}
