use super::bundle::{BundleEntry, SaveBundle};
use super::worker::Command;

use crate::codec;
use crate::config::EngineConfig;
use crate::error::SaveError;
use crate::metrics::MetricsRecorder;
use crate::migration::{migrate, needs_migration};
use crate::platform::Platform;
use crate::record::{PartialSave, RecordDefaults, SaveRecord, SaveSlot, SyncStatus};
use crate::remote::{RemoteSave, RemoteSyncClient, SyncOutcome};
use crate::slots::{SlotMeta, SlotRead, SlotStore};
use crate::{AUTOSAVE_SLOT, MAX_SLOTS};

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

/// Shared state of one engine, used by the public handle and the worker.
pub(crate) struct EngineCore {
    game_id: String,
    session_id: String,
    config: EngineConfig,
    platform: Arc<dyn Platform>,
    pub(crate) slots: SlotStore,
    pub(crate) remote: RemoteSyncClient,
    pub(crate) metrics: MetricsRecorder,
    pending_autosave: Mutex<Option<PartialSave>>,
    commands: Mutex<Option<Sender<Command>>>,
}

/// Time-bucketed slot rotation for saves without an explicit slot.
pub(crate) fn rotation_slot(now_millis: u64) -> u8 {
    ((now_millis / 1_000) % MAX_SLOTS as u64) as u8
}

impl EngineCore {
    pub(crate) fn new(
        game_id: String,
        session_id: String,
        config: EngineConfig,
        platform: Arc<dyn Platform>,
        slots: SlotStore,
        remote: RemoteSyncClient,
        metrics: MetricsRecorder,
    ) -> Self {
        Self {
            game_id,
            session_id,
            config,
            platform,
            slots,
            remote,
            metrics,
            pending_autosave: Mutex::new(None),
            commands: Mutex::new(None),
        }
    }

    pub(crate) fn game_id(&self) -> &str {
        &self.game_id
    }

    pub(crate) fn session_id(&self) -> &str {
        &self.session_id
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn attach_worker(&self, sender: Sender<Command>) {
        if let Ok(mut commands) = self.commands.lock() {
            *commands = Some(sender);
        }
    }

    /// Detach the worker channel; later commands are dropped.
    pub(crate) fn detach_worker(&self) -> Option<Sender<Command>> {
        self.commands.lock().ok().and_then(|mut commands| commands.take())
    }

    /// Send a command to the worker. Returns false when no worker is running.
    pub(crate) fn enqueue(&self, command: Command) -> bool {
        let commands = match self.commands.lock() {
            Ok(commands) => commands,
            Err(_) => return false,
        };
        match commands.as_ref() {
            Some(sender) => sender.send(command).is_ok(),
            None => false,
        }
    }

    fn record_defaults(&self, now_millis: u64) -> RecordDefaults {
        RecordDefaults {
            game_id: self.game_id.clone(),
            user_id: self.platform.current_user_id(),
            session_id: self.session_id.clone(),
            build_version: self.config.build_version.clone(),
            platform: self.config.platform.clone(),
            now_millis,
        }
    }

    // ========================
    // Save
    // ========================

    /// Pending -> Validated -> Checksummed -> LocallyPersisted -> RemoteQueued.
    pub(crate) fn save(&self, partial: PartialSave, slot: Option<u8>) -> Result<SaveRecord, SaveError> {
        let now = self.platform.now_millis();
        let slot = match slot {
            Some(slot) => {
                SlotStore::validate_slot(slot)?;
                slot
            }
            None => rotation_slot(now),
        };

        let record = SaveRecord::from_partial(partial, &self.record_defaults(now))?;
        let record = codec::seal(record, self.config.compression_threshold)?;
        let meta = self.slots.write(slot, &record)?;

        self.metrics.record_save(meta.size);
        if let Err(e) = self.metrics.persist() {
            log::warn!("Could not persist metrics: {}", e);
        }

        log::info!("Game saved to slot {} ({} bytes)", slot, meta.size);

        if self.remote.is_available() && self.enqueue(Command::QueueUpload(slot)) {
            log::debug!("Upload of slot {} queued", slot);
        }

        Ok(record)
    }

    // ========================
    // Autosave
    // ========================

    /// Merge into the pending autosave. Returns true when this call opened
    /// a new coalescing window.
    pub(crate) fn merge_autosave(&self, partial: PartialSave) -> Result<bool, SaveError> {
        let mut pending = self
            .pending_autosave
            .lock()
            .map_err(|_| SaveError::Storage("autosave lock poisoned".to_string()))?;

        let mut candidate = pending.clone().unwrap_or_default();
        candidate.merge(partial);

        // Reject bad input now rather than when the timer fires.
        SaveRecord::from_partial(candidate.clone(), &self.record_defaults(self.platform.now_millis()))?;

        let opened = pending.is_none();
        *pending = Some(candidate);
        Ok(opened)
    }

    /// Write the coalesced autosave, if one is pending.
    pub(crate) fn flush_autosave(&self) -> Result<Option<SaveRecord>, SaveError> {
        let pending = match self.pending_autosave.lock() {
            Ok(mut pending) => pending.take(),
            Err(_) => return Err(SaveError::Storage("autosave lock poisoned".to_string())),
        };

        match pending {
            Some(partial) => {
                let record = self.save(partial, Some(AUTOSAVE_SLOT))?;
                log::debug!("Auto-save completed");
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub(crate) fn has_pending_autosave(&self) -> bool {
        self.pending_autosave.lock().map(|pending| pending.is_some()).unwrap_or(false)
    }

    // ========================
    // Load
    // ========================

    pub(crate) fn load(&self, slot: Option<u8>) -> Result<Option<SaveRecord>, SaveError> {
        if let Some(slot) = slot {
            SlotStore::validate_slot(slot)?;
        }

        if let Some(record) = self.load_remote(slot) {
            return Ok(Some(record));
        }

        let target = match slot {
            Some(slot) => slot,
            None => match self.slots.latest_slot()? {
                Some(slot) => slot,
                None => return Ok(None),
            },
        };

        match self.slots.read(target)? {
            SlotRead::Found(record, _) => Ok(self.migrate_for_caller(target, record)),
            SlotRead::Missing => Ok(None),
            SlotRead::Corrupted(reason) => {
                log::warn!("Slot {} failed integrity check: {}", target, reason);
                Ok(self.recover(target))
            }
        }
    }

    /// Remote-first read. `None` means fall through to the local tier.
    fn load_remote(&self, slot: Option<u8>) -> Option<SaveRecord> {
        let entry = match self.remote.download_entry(slot) {
            SyncOutcome::Completed(Some(entry)) => entry,
            SyncOutcome::Completed(None) | SyncOutcome::Unavailable => return None,
            SyncOutcome::Failed(e) => {
                log::warn!("Remote load failed, using local saves: {}", e);
                self.metrics.record_network_error();
                return None;
            }
        };

        if let Some(local) = self.reconcile(&entry) {
            return Some(local);
        }

        match migrate(entry.record) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("Remote copy of slot {} is not usable: {}", entry.slot, e);
                None
            }
        }
    }

    /// Compare the remote copy with unsynced local changes to the same slot.
    ///
    /// Returns the local record when it must win over the remote copy.
    fn reconcile(&self, remote: &RemoteSave) -> Option<SaveRecord> {
        let (local, meta) = match self.slots.read(remote.slot) {
            Ok(SlotRead::Found(local, meta)) => (local, meta),
            _ => return None,
        };

        if !meta.needs_upload() || local.checksum == remote.record.checksum {
            return None;
        }

        // Remote still holds what we last synced: local edits just have not gone up yet.
        let diverged = meta.synced_checksum.as_deref() != Some(remote.record.checksum.as_str());
        if !diverged {
            self.enqueue(Command::QueueUpload(remote.slot));
            return self.migrate_for_caller(remote.slot, local);
        }

        log::warn!(
            "Save conflict on slot {}: local@{} remote@{}",
            remote.slot,
            local.timestamp,
            remote.record.timestamp
        );
        self.metrics.record_conflict();

        if local.timestamp > remote.record.timestamp {
            if let Err(e) = self.slots.set_sync_status(remote.slot, SyncStatus::Conflict) {
                log::warn!("Could not mark slot {} as conflicted: {}", remote.slot, e);
            }
            self.enqueue(Command::QueueUpload(remote.slot));
            return self.migrate_for_caller(remote.slot, local);
        }

        // Remote wins; adopt it locally so the sweep does not push the older copy back.
        if let Err(e) = self.adopt_remote(remote, &local.checksum) {
            log::warn!("Could not adopt remote copy of slot {}: {}", remote.slot, e);
        }
        None
    }

    /// Replace the local record read as `local_checksum` with the remote copy.
    /// A save that landed after that read is kept.
    fn adopt_remote(&self, remote: &RemoteSave, local_checksum: &str) -> Result<(), SaveError> {
        let record = if needs_migration(&remote.record) {
            codec::seal(migrate(remote.record.clone())?, self.config.compression_threshold)?
        } else {
            remote.record.clone()
        };

        if self.slots.write_if(remote.slot, local_checksum, &record)?.is_some() {
            self.slots.mark_synced(remote.slot, &record.checksum)?;
        }
        Ok(())
    }

    /// Try every other local slot round-robin from `slot + 1`, then the
    /// latest remote copy. Counts a corruption only when all sources fail.
    fn recover(&self, slot: u8) -> Option<SaveRecord> {
        for offset in 1..MAX_SLOTS {
            let candidate = (slot + offset) % MAX_SLOTS;
            match self.slots.read(candidate) {
                Ok(SlotRead::Found(record, _)) => {
                    if let Some(record) = self.migrate_for_caller(candidate, record) {
                        log::warn!("Recovered slot {} from local slot {}", slot, candidate);
                        return Some(record);
                    }
                }
                Ok(SlotRead::Missing) => {}
                Ok(SlotRead::Corrupted(reason)) => {
                    log::debug!("Recovery skipped slot {}: {}", candidate, reason);
                }
                Err(e) => log::debug!("Recovery could not read slot {}: {}", candidate, e),
            }
        }

        match self.remote.download(None) {
            SyncOutcome::Completed(Some(record)) => match migrate(record) {
                Ok(record) => {
                    log::warn!("Recovered slot {} from the remote copy", slot);
                    return Some(record);
                }
                Err(e) => log::warn!("Remote recovery copy is not usable: {}", e),
            },
            SyncOutcome::Failed(e) => {
                log::warn!("Remote recovery failed: {}", e);
                self.metrics.record_network_error();
            }
            SyncOutcome::Completed(None) | SyncOutcome::Unavailable => {}
        }

        log::error!("Slot {} is corrupted and no recovery source is available", slot);
        self.metrics.record_corruption();
        if let Err(e) = self.metrics.persist() {
            log::warn!("Could not persist metrics: {}", e);
        }
        None
    }

    /// Records newer than this build cannot be downgraded; they read as absent.
    fn migrate_for_caller(&self, slot: u8, record: SaveRecord) -> Option<SaveRecord> {
        match migrate(record) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("Slot {} cannot be loaded: {}", slot, e);
                None
            }
        }
    }

    // ========================
    // Enumeration / deletion
    // ========================

    pub(crate) fn all_saves(&self) -> Result<Vec<SaveSlot>, SaveError> {
        let mut saves = Vec::new();

        for slot in 0..MAX_SLOTS {
            let (record, meta) = match self.slots.read(slot)? {
                SlotRead::Found(record, meta) => (record, meta),
                SlotRead::Missing => continue,
                SlotRead::Corrupted(reason) => {
                    log::warn!("Skipping corrupted slot {}: {}", slot, reason);
                    continue;
                }
            };
            if let Some(record) = self.migrate_for_caller(slot, record) {
                saves.push(to_save_slot(slot, record, &meta));
            }
        }

        saves.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)); // Most recent first
        Ok(saves)
    }

    pub(crate) fn delete(&self, slot: u8) -> Result<(), SaveError> {
        self.slots.delete(slot)?;

        match self.remote.delete(slot) {
            SyncOutcome::Failed(e) => {
                log::warn!("Remote copy of slot {} was not deleted: {}", slot, e);
                self.metrics.record_network_error();
            }
            SyncOutcome::Completed(()) => log::debug!("Remote copy of slot {} deleted", slot),
            SyncOutcome::Unavailable => {}
        }

        Ok(())
    }

    // ========================
    // Export / import
    // ========================

    pub(crate) fn export(&self) -> Result<SaveBundle, SaveError> {
        let mut bundle = SaveBundle::new(self.game_id.clone(), self.platform.now_millis());

        for slot in 0..MAX_SLOTS {
            if let SlotRead::Found(record, _) = self.slots.read(slot)? {
                if let Some(record) = self.migrate_for_caller(slot, record) {
                    bundle.saves.push(BundleEntry::new(slot, &record)?);
                }
            }
        }

        log::info!("Exported {} save(s) for '{}'", bundle.saves.len(), self.game_id);
        Ok(bundle)
    }

    /// Write every acceptable entry into its original slot. Returns how many were written.
    pub(crate) fn import(&self, bundle: SaveBundle) -> Result<usize, SaveError> {
        let entries = bundle.accepted_entries(&self.game_id)?;

        for (slot, record) in &entries {
            self.slots.write(*slot, record)?;
            if self.remote.is_available() {
                self.enqueue(Command::QueueUpload(*slot));
            }
        }

        log::info!("Imported {} save(s) for '{}'", entries.len(), self.game_id);
        Ok(entries.len())
    }

    // ========================
    // Remote sync
    // ========================

    /// Upload the current record of one slot. An upload that fails is
    /// dropped; the slot stays pending for the next sweep.
    pub(crate) fn upload_slot(&self, slot: u8) -> SyncOutcome<()> {
        if !self.remote.is_available() {
            return SyncOutcome::Unavailable;
        }

        let record = match self.slots.read(slot) {
            Ok(SlotRead::Found(record, _)) => record,
            Ok(SlotRead::Missing) => return SyncOutcome::Completed(()),
            Ok(SlotRead::Corrupted(reason)) => {
                log::warn!("Not uploading corrupted slot {}: {}", slot, reason);
                return SyncOutcome::Failed(reason);
            }
            Err(e) => return SyncOutcome::Failed(e.to_string()),
        };

        let record = match self.upgrade_in_place(slot, record) {
            Ok(Some(record)) => record,
            Ok(None) => {
                // A newer save replaced the record mid-upgrade; it queues its own upload.
                return SyncOutcome::Failed(format!("slot {} changed during upgrade", slot));
            }
            Err(e) => {
                log::warn!("Not uploading slot {}: {}", slot, e);
                return SyncOutcome::Failed(e.to_string());
            }
        };

        if let Err(e) = self.slots.set_sync_status(slot, SyncStatus::Syncing) {
            return SyncOutcome::Failed(e.to_string());
        }

        let outcome = self.remote.upload(slot, &record);
        match &outcome {
            SyncOutcome::Completed(()) => {
                if let Err(e) = self.slots.mark_synced(slot, &record.checksum) {
                    log::warn!("Could not mark slot {} synced: {}", slot, e);
                }
                self.metrics.record_cloud_save(self.platform.now_millis());
                log::info!("Slot {} synced", slot);
            }
            SyncOutcome::Failed(_) => {
                self.metrics.record_network_error();
                self.release_syncing(slot);
            }
            SyncOutcome::Unavailable => self.release_syncing(slot),
        }

        if !matches!(outcome, SyncOutcome::Unavailable) {
            if let Err(e) = self.metrics.persist() {
                log::warn!("Could not persist metrics: {}", e);
            }
        }
        outcome
    }

    fn release_syncing(&self, slot: u8) {
        if let Err(e) = self.slots.set_sync_status(slot, SyncStatus::Local) {
            log::warn!("Could not reset sync status of slot {}: {}", slot, e);
        }
    }

    /// Older-schema records are rewritten at the current version before they
    /// leave the device, so the remote only ever holds current records.
    ///
    /// `None` means a newer save replaced the record while it was upgraded.
    fn upgrade_in_place(&self, slot: u8, record: SaveRecord) -> Result<Option<SaveRecord>, SaveError> {
        if !needs_migration(&record) {
            return Ok(Some(record));
        }
        let read_checksum = record.checksum.clone();
        let migrated = codec::seal(migrate(record)?, self.config.compression_threshold)?;
        Ok(self.slots.write_if(slot, &read_checksum, &migrated)?.map(|_| migrated))
    }

    /// Upload every slot whose record the remote has not acknowledged.
    pub(crate) fn sync_sweep(&self) -> usize {
        if !self.remote.is_available() {
            return 0;
        }

        let pending = match self.slots.pending_upload_slots() {
            Ok(pending) => pending,
            Err(e) => {
                log::warn!("Sync sweep could not scan slots: {}", e);
                return 0;
            }
        };

        let uploaded = pending.into_iter().filter(|slot| self.upload_slot(*slot).is_completed()).count();

        if uploaded > 0 {
            log::info!("Sync sweep uploaded {} slot(s)", uploaded);
        }
        uploaded
    }
}

pub(crate) fn to_save_slot(slot: u8, record: SaveRecord, meta: &SlotMeta) -> SaveSlot {
    SaveSlot {
        slot,
        record,
        created_at: meta.created_at,
        updated_at: meta.updated_at,
        sync_status: meta.sync_status,
    }
}
