use crate::codec::{decode_document, encode_record};
use crate::error::SaveError;
use crate::integrity::verify_value;
use crate::record::{SaveRecord, SyncStatus};
use crate::storage::{meta_key, slot_key, SaveStorage};
use crate::MAX_SLOTS;

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// Sidecar metadata persisted next to every slot payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotMeta {
    pub slot: u8,
    /// Record write time (unix milliseconds)
    pub timestamp: u64,
    /// Persisted payload size in bytes
    pub size: usize,
    pub compressed: bool,
    pub checksum: String,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default)]
    pub sync_status: SyncStatus,
    /// Checksum the remote last acknowledged for this slot
    #[serde(default)]
    pub synced_checksum: Option<String>,
}

impl SlotMeta {
    /// The local record has not been confirmed by the remote yet.
    pub fn needs_upload(&self) -> bool {
        self.sync_status != SyncStatus::Synced
            || self.synced_checksum.as_deref() != Some(self.checksum.as_str())
    }
}

/// Outcome of reading one slot. Corruption is a value, not an error:
/// the orchestrator owns recovery.
#[derive(Debug, Clone)]
pub enum SlotRead {
    Found(SaveRecord, SlotMeta),
    Missing,
    Corrupted(String),
}

/// CRUD over the fixed set of local slots of one game.
///
/// Each slot has its own lock: writes to one slot are serialized and a
/// read never observes a half-written slot, while different slots proceed
/// independently.
pub struct SlotStore {
    storage: Arc<dyn SaveStorage>,
    game_id: String,
    locks: Vec<Mutex<()>>,
}

impl SlotStore {
    pub fn new(storage: Arc<dyn SaveStorage>, game_id: impl Into<String>) -> Self {
        Self {
            storage,
            game_id: game_id.into(),
            locks: (0..MAX_SLOTS).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn validate_slot(slot: u8) -> Result<(), SaveError> {
        if slot >= MAX_SLOTS {
            return Err(SaveError::InvalidSlot { slot: slot as i64 });
        }
        Ok(())
    }

    fn lock(&self, slot: u8) -> Result<MutexGuard<'_, ()>, SaveError> {
        Self::validate_slot(slot)?;
        self.locks[slot as usize]
            .lock()
            .map_err(|_| SaveError::Storage(format!("slot {} lock poisoned", slot)))
    }

    /// Persist a sealed record and its metadata. The slot starts out `local`.
    pub fn write(&self, slot: u8, record: &SaveRecord) -> Result<SlotMeta, SaveError> {
        let _guard = self.lock(slot)?;
        let previous = self.read_meta_unlocked(slot).ok().flatten();
        self.write_unlocked(slot, record, previous)
    }

    /// Write only if the slot still holds the record with `expected_checksum`.
    ///
    /// Returns `None` when another write got there first; that write is kept.
    pub fn write_if(
        &self,
        slot: u8,
        expected_checksum: &str,
        record: &SaveRecord,
    ) -> Result<Option<SlotMeta>, SaveError> {
        let _guard = self.lock(slot)?;
        let previous = self.read_meta_unlocked(slot)?;
        if previous.as_ref().map(|meta| meta.checksum.as_str()) != Some(expected_checksum) {
            log::debug!("Slot {} changed since it was read; keeping the newer write", slot);
            return Ok(None);
        }
        self.write_unlocked(slot, record, previous).map(Some)
    }

    fn write_unlocked(
        &self,
        slot: u8,
        record: &SaveRecord,
        previous: Option<SlotMeta>,
    ) -> Result<SlotMeta, SaveError> {
        let bytes = encode_record(record)?;

        let meta = SlotMeta {
            slot,
            timestamp: record.timestamp,
            size: bytes.len(),
            compressed: record.compressed,
            checksum: record.checksum.clone(),
            created_at: previous.as_ref().map(|m| m.created_at).unwrap_or(record.timestamp),
            updated_at: record.timestamp,
            sync_status: SyncStatus::Local,
            synced_checksum: previous.and_then(|m| m.synced_checksum),
        };

        self.storage.set(&slot_key(&self.game_id, slot), &bytes)?;
        self.storage.set(&meta_key(&self.game_id, slot), &serde_json::to_vec(&meta)?)?;

        log::debug!("Slot {} written ({} bytes, compressed={})", slot, meta.size, meta.compressed);
        Ok(meta)
    }

    /// Read, decode and verify one slot.
    pub fn read(&self, slot: u8) -> Result<SlotRead, SaveError> {
        let _guard = self.lock(slot)?;

        let meta = match self.storage.get(&meta_key(&self.game_id, slot))? {
            Some(bytes) => match serde_json::from_slice::<SlotMeta>(&bytes) {
                Ok(meta) => Some(meta),
                Err(e) => return Ok(SlotRead::Corrupted(format!("malformed metadata: {}", e))),
            },
            None => None,
        };

        let bytes = match self.storage.get(&slot_key(&self.game_id, slot))? {
            Some(bytes) => bytes,
            None => {
                if meta.is_some() {
                    log::warn!("Slot {} has metadata but no payload", slot);
                }
                return Ok(SlotRead::Missing);
            }
        };

        let meta = match meta {
            Some(meta) => meta,
            None => return Ok(SlotRead::Corrupted("payload without metadata".to_string())),
        };

        let document = match decode_document(&bytes, meta.compressed) {
            Ok(document) => document,
            Err(e) => return Ok(SlotRead::Corrupted(format!("undecodable payload: {}", e))),
        };

        if !verify_value(&document) {
            return Ok(SlotRead::Corrupted("checksum mismatch".to_string()));
        }

        let record: SaveRecord = match serde_json::from_value(document) {
            Ok(record) => record,
            Err(e) => return Ok(SlotRead::Corrupted(format!("malformed record: {}", e))),
        };

        if record.game_id != self.game_id {
            return Ok(SlotRead::Corrupted(format!(
                "record belongs to game '{}'",
                record.game_id
            )));
        }
        if record.compressed != meta.compressed {
            return Ok(SlotRead::Corrupted("compression flag disagrees with metadata".into()));
        }

        Ok(SlotRead::Found(record, meta))
    }

    pub fn meta(&self, slot: u8) -> Result<Option<SlotMeta>, SaveError> {
        let _guard = self.lock(slot)?;
        self.read_meta_unlocked(slot)
    }

    fn read_meta_unlocked(&self, slot: u8) -> Result<Option<SlotMeta>, SaveError> {
        match self.storage.get(&meta_key(&self.game_id, slot))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Slot with the greatest metadata timestamp, if any slot is populated.
    pub fn latest_slot(&self) -> Result<Option<u8>, SaveError> {
        let mut latest: Option<(u8, u64)> = None;

        for slot in 0..MAX_SLOTS {
            let meta = match self.meta(slot) {
                Ok(Some(meta)) => meta,
                Ok(None) => continue,
                Err(SaveError::Serialization(_)) => continue,
                Err(e) => return Err(e),
            };
            if latest.map(|(_, ts)| meta.timestamp > ts).unwrap_or(true) {
                latest = Some((slot, meta.timestamp));
            }
        }

        Ok(latest.map(|(slot, _)| slot))
    }

    pub fn delete(&self, slot: u8) -> Result<(), SaveError> {
        let _guard = self.lock(slot)?;
        self.storage.remove(&slot_key(&self.game_id, slot))?;
        self.storage.remove(&meta_key(&self.game_id, slot))?;
        log::info!("Deleted save slot {}", slot);
        Ok(())
    }

    /// Update the sync status of a slot, if it still exists.
    pub fn set_sync_status(&self, slot: u8, status: SyncStatus) -> Result<(), SaveError> {
        let _guard = self.lock(slot)?;
        if let Some(mut meta) = self.read_meta_unlocked(slot)? {
            meta.sync_status = status;
            self.storage.set(&meta_key(&self.game_id, slot), &serde_json::to_vec(&meta)?)?;
        }
        Ok(())
    }

    /// Mark the slot synced, but only if it still holds the record with
    /// `checksum`; a newer local write stays pending.
    pub fn mark_synced(&self, slot: u8, checksum: &str) -> Result<bool, SaveError> {
        let _guard = self.lock(slot)?;
        let mut meta = match self.read_meta_unlocked(slot)? {
            Some(meta) => meta,
            None => return Ok(false),
        };
        if meta.checksum != checksum {
            return Ok(false);
        }

        meta.sync_status = SyncStatus::Synced;
        meta.synced_checksum = Some(checksum.to_string());
        self.storage.set(&meta_key(&self.game_id, slot), &serde_json::to_vec(&meta)?)?;
        Ok(true)
    }

    /// Slots whose current record has not been acknowledged by the remote.
    pub fn pending_upload_slots(&self) -> Result<Vec<u8>, SaveError> {
        let mut pending = Vec::new();
        for slot in 0..MAX_SLOTS {
            if let Ok(Some(meta)) = self.meta(slot) {
                if meta.needs_upload() {
                    pending.push(slot);
                }
            }
        }
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::seal;
    use crate::record::{PartialSave, RecordDefaults};
    use crate::storage::MemoryStorage;
    use crate::COMPRESSION_THRESHOLD;
    use serde_json::json;

    fn store() -> (Arc<MemoryStorage>, SlotStore) {
        let storage = Arc::new(MemoryStorage::new());
        let slots = SlotStore::new(storage.clone(), "demo");
        (storage, slots)
    }

    fn sealed(score: i64, timestamp: u64) -> SaveRecord {
        let defaults = RecordDefaults {
            game_id: "demo".to_string(),
            user_id: None,
            session_id: "session-1".to_string(),
            build_version: "1.0.0".to_string(),
            platform: "linux".to_string(),
            now_millis: timestamp,
        };
        let partial = PartialSave { score: Some(score), ..Default::default() };
        seal(SaveRecord::from_partial(partial, &defaults).unwrap(), COMPRESSION_THRESHOLD).unwrap()
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (_, slots) = store();
        let record = sealed(150, 1_000);

        let meta = slots.write(1, &record).unwrap();
        assert_eq!(meta.slot, 1);
        assert_eq!(meta.sync_status, SyncStatus::Local);

        match slots.read(1).unwrap() {
            SlotRead::Found(loaded, meta) => {
                assert_eq!(loaded, record);
                assert_eq!(meta.timestamp, 1_000);
            }
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_read_missing() {
        let (_, slots) = store();
        assert!(matches!(slots.read(3).unwrap(), SlotRead::Missing));
    }

    #[test]
    fn test_invalid_slot_rejected() {
        let (_, slots) = store();
        assert!(matches!(slots.read(MAX_SLOTS), Err(SaveError::InvalidSlot { .. })));
        assert!(slots.write(7, &sealed(1, 1)).is_err());
    }

    #[test]
    fn test_tampered_payload_reported_as_corruption() {
        let (storage, slots) = store();
        slots.write(2, &sealed(150, 1_000)).unwrap();

        let key = slot_key("demo", 2);
        let bytes = storage.get(&key).unwrap().unwrap();
        let tampered = String::from_utf8(bytes).unwrap().replace("150", "999");
        storage.set(&key, tampered.as_bytes()).unwrap();

        assert!(matches!(slots.read(2).unwrap(), SlotRead::Corrupted(_)));
    }

    #[test]
    fn test_garbage_payload_reported_as_corruption() {
        let (storage, slots) = store();
        slots.write(2, &sealed(150, 1_000)).unwrap();
        storage.set(&slot_key("demo", 2), b"\x00\x01garbage").unwrap();

        assert!(matches!(slots.read(2).unwrap(), SlotRead::Corrupted(_)));
    }

    #[test]
    fn test_truncated_compressed_payload_reported_as_corruption() {
        let (storage, slots) = store();
        let mut record = sealed(1, 1_000);
        record.stats = (0..200).map(|i| (format!("stat_{}", i), json!(i))).collect();
        let record = seal(record, COMPRESSION_THRESHOLD).unwrap();
        assert!(record.compressed);
        slots.write(4, &record).unwrap();

        let key = slot_key("demo", 4);
        let bytes = storage.get(&key).unwrap().unwrap();
        storage.set(&key, &bytes[..bytes.len() / 2]).unwrap();

        assert!(matches!(slots.read(4).unwrap(), SlotRead::Corrupted(_)));
    }

    #[test]
    fn test_latest_slot_by_timestamp() {
        let (_, slots) = store();
        assert_eq!(slots.latest_slot().unwrap(), None);

        slots.write(1, &sealed(1, 1_000)).unwrap();
        slots.write(3, &sealed(2, 3_000)).unwrap();
        slots.write(4, &sealed(3, 2_000)).unwrap();

        assert_eq!(slots.latest_slot().unwrap(), Some(3));
    }

    #[test]
    fn test_delete_removes_payload_and_meta() {
        let (storage, slots) = store();
        slots.write(1, &sealed(1, 1_000)).unwrap();
        slots.delete(1).unwrap();

        assert!(storage.is_empty());
        assert!(matches!(slots.read(1).unwrap(), SlotRead::Missing));
    }

    #[test]
    fn test_created_at_survives_overwrite() {
        let (_, slots) = store();
        slots.write(1, &sealed(1, 1_000)).unwrap();
        let meta = slots.write(1, &sealed(2, 5_000)).unwrap();

        assert_eq!(meta.created_at, 1_000);
        assert_eq!(meta.updated_at, 5_000);
    }

    #[test]
    fn test_mark_synced_ignores_stale_checksum() {
        let (_, slots) = store();
        let first = sealed(1, 1_000);
        slots.write(1, &first).unwrap();
        let second = sealed(2, 2_000);
        slots.write(1, &second).unwrap();

        assert!(!slots.mark_synced(1, &first.checksum).unwrap());
        assert_eq!(slots.pending_upload_slots().unwrap(), vec![1]);

        assert!(slots.mark_synced(1, &second.checksum).unwrap());
        assert!(slots.pending_upload_slots().unwrap().is_empty());

        let meta = slots.meta(1).unwrap().unwrap();
        assert_eq!(meta.sync_status, SyncStatus::Synced);
    }

    #[test]
    fn test_write_if_keeps_newer_write() {
        let (_, slots) = store();
        let first = sealed(1, 1_000);
        slots.write(1, &first).unwrap();
        let newer = sealed(2, 2_000);
        slots.write(1, &newer).unwrap();

        let replacement = sealed(3, 1_500);
        assert!(slots.write_if(1, &first.checksum, &replacement).unwrap().is_none());
        match slots.read(1).unwrap() {
            SlotRead::Found(record, _) => assert_eq!(record, newer),
            other => panic!("expected record, got {:?}", other),
        }

        assert!(slots.write_if(1, &newer.checksum, &replacement).unwrap().is_some());
        assert!(slots.write_if(2, &newer.checksum, &replacement).unwrap().is_none());
    }

    #[test]
    fn test_rewrite_after_sync_is_pending_again() {
        let (_, slots) = store();
        let first = sealed(1, 1_000);
        slots.write(2, &first).unwrap();
        slots.mark_synced(2, &first.checksum).unwrap();

        slots.write(2, &sealed(5, 2_000)).unwrap();
        assert_eq!(slots.pending_upload_slots().unwrap(), vec![2]);
    }
}
