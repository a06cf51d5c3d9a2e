//! Export/import of every local slot as one JSON document.

use crate::error::SaveError;
use crate::integrity;
use crate::migration::migrate;
use crate::record::SaveRecord;
use crate::slots::SlotStore;
use crate::CURRENT_SAVE_VERSION;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaveBundle {
    pub game_id: String,
    /// Export time (unix milliseconds)
    pub exported_at: u64,
    pub save_version: u32,
    pub saves: Vec<BundleEntry>,
}

/// One exported slot. The record stays a raw document so bundles written
/// by older builds verify against their own checksum.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BundleEntry {
    pub slot: u8,
    pub record: Value,
}

impl BundleEntry {
    pub fn new(slot: u8, record: &SaveRecord) -> Result<Self, SaveError> {
        Ok(Self { slot, record: serde_json::to_value(record)? })
    }
}

impl SaveBundle {
    pub fn new(game_id: impl Into<String>, exported_at: u64) -> Self {
        Self {
            game_id: game_id.into(),
            exported_at,
            save_version: CURRENT_SAVE_VERSION,
            saves: Vec::new(),
        }
    }

    pub fn to_json(&self) -> Result<String, SaveError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SaveError> {
        serde_json::from_str(json).map_err(|e| SaveError::Validation(format!("malformed bundle: {}", e)))
    }

    /// `(slot, record)` pairs that may be written for `game_id`, already migrated.
    ///
    /// A bundle for another game is rejected outright; individual entries
    /// that fail validation are skipped.
    pub fn accepted_entries(self, game_id: &str) -> Result<Vec<(u8, SaveRecord)>, SaveError> {
        if self.game_id != game_id {
            return Err(SaveError::Validation(format!(
                "bundle belongs to game '{}', not '{}'",
                self.game_id, game_id
            )));
        }

        let accepted = self
            .saves
            .into_iter()
            .filter_map(|entry| match check_entry(entry, game_id) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::warn!("Skipping bundle entry: {}", e);
                    None
                }
            })
            .collect();

        Ok(accepted)
    }
}

fn check_entry(entry: BundleEntry, game_id: &str) -> Result<(u8, SaveRecord), SaveError> {
    SlotStore::validate_slot(entry.slot)?;

    let record = integrity::open_document(entry.slot, entry.record)?;
    if record.game_id != game_id {
        return Err(SaveError::Validation(format!(
            "slot {} record belongs to game '{}'",
            entry.slot, record.game_id
        )));
    }

    let record = migrate(record)?;
    record.validate()?;
    Ok((entry.slot, record))
}
