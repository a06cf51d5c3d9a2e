use super::{RemoteDocument, RemoteSaveApi};
use crate::error::SaveError;
use crate::record::SaveRecord;

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

type RemoteKey = (String, String, u8);

/// In-process remote save API.
///
/// Stands in for the HTTP service in offline builds and tests; outages can
/// be simulated with [`MemoryRemote::set_reachable`].
#[derive(Debug)]
pub struct MemoryRemote {
    saves: Mutex<BTreeMap<RemoteKey, Value>>,
    reachable: AtomicBool,
    upserts: AtomicUsize,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            saves: Mutex::new(BTreeMap::new()),
            reachable: AtomicBool::new(true),
            upserts: AtomicUsize::new(0),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Successful upserts so far.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// The stored copy, if it still parses as a record.
    pub fn stored(&self, user_id: &str, game_id: &str, slot: u8) -> Option<SaveRecord> {
        let document = self.stored_document(user_id, game_id, slot)?;
        serde_json::from_value(document).ok()
    }

    pub fn stored_document(&self, user_id: &str, game_id: &str, slot: u8) -> Option<Value> {
        let saves = self.saves.lock().ok()?;
        saves.get(&(user_id.to_string(), game_id.to_string(), slot)).cloned()
    }

    /// Seed a remote copy directly, bypassing the upsert counter.
    pub fn insert(&self, user_id: &str, game_id: &str, slot: u8, record: SaveRecord) {
        if let Ok(document) = serde_json::to_value(&record) {
            self.insert_document(user_id, game_id, slot, document);
        }
    }

    /// Seed a raw document, e.g. one written by an older client.
    pub fn insert_document(&self, user_id: &str, game_id: &str, slot: u8, document: Value) {
        if let Ok(mut saves) = self.saves.lock() {
            saves.insert((user_id.to_string(), game_id.to_string(), slot), document);
        }
    }

    fn check_reachable(&self) -> Result<(), SaveError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SaveError::Network("remote unreachable".to_string()))
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<RemoteKey, Value>>, SaveError> {
        self.saves.lock().map_err(|_| SaveError::Network("remote store poisoned".to_string()))
    }
}

impl RemoteSaveApi for MemoryRemote {
    fn list(&self, user_id: &str, game_id: &str) -> Result<Vec<RemoteDocument>, SaveError> {
        self.check_reachable()?;
        let saves = self.lock()?;
        Ok(saves
            .iter()
            .filter(|((user, game, _), _)| user == user_id && game == game_id)
            .map(|((_, _, slot), record)| RemoteDocument { slot: *slot, record: record.clone() })
            .collect())
    }

    fn upsert(
        &self,
        user_id: &str,
        game_id: &str,
        slot: u8,
        record: &SaveRecord,
    ) -> Result<(), SaveError> {
        self.check_reachable()?;
        let document = serde_json::to_value(record)?;
        self.lock()?.insert((user_id.to_string(), game_id.to_string(), slot), document);
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, user_id: &str, game_id: &str, slot: u8) -> Result<(), SaveError> {
        self.check_reachable()?;
        self.lock()?.remove(&(user_id.to_string(), game_id.to_string(), slot));
        Ok(())
    }
}
