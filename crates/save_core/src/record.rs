use crate::error::SaveError;
use crate::CURRENT_SAVE_VERSION;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use validator::Validate;

/// The unit of persisted progress.
///
/// Field names are persisted in camelCase; this shape is the on-disk and
/// on-wire schema and must stay readable by [`crate::migration`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaveRecord {
    /// Namespace key; slots and metrics are scoped per game
    #[validate(length(min = 1))]
    pub game_id: String,

    /// Owner, absent for anonymous/local-only play
    #[serde(default)]
    pub user_id: Option<String>,

    /// Play session that produced this record
    #[validate(length(min = 1))]
    pub session_id: String,

    #[serde(default)]
    pub score: i64,

    #[serde(default = "default_level")]
    pub level: u32,

    /// Completion percentage (0-100)
    #[serde(default)]
    #[validate(range(min = 0.0, max = 100.0))]
    pub progress: f64,

    #[serde(default)]
    pub stats: BTreeMap<String, Value>,

    #[serde(default)]
    pub settings: BTreeMap<String, Value>,

    /// Added in schema version 2
    #[serde(default)]
    pub achievements: BTreeSet<String>,

    /// Added in schema version 2
    #[serde(default)]
    pub unlocks: BTreeSet<String>,

    /// Write time (unix milliseconds)
    pub timestamp: u64,

    pub save_version: u32,

    #[serde(default)]
    pub build_version: String,

    #[serde(default)]
    pub platform: String,

    /// SHA-256 hex of the canonical record without this field
    #[serde(default)]
    pub checksum: String,

    /// Whether the persisted payload bytes are LZ4-compressed
    #[serde(default)]
    pub compressed: bool,
}

fn default_level() -> u32 {
    1
}

/// Values the engine fills in for fields a caller did not supply.
#[derive(Debug, Clone)]
pub struct RecordDefaults {
    pub game_id: String,
    pub user_id: Option<String>,
    pub session_id: String,
    pub build_version: String,
    pub platform: String,
    pub now_millis: u64,
}

impl SaveRecord {
    /// Complete a partial save into a full, validated (but not yet sealed) record.
    pub fn from_partial(partial: PartialSave, defaults: &RecordDefaults) -> Result<Self, SaveError> {
        if let Some(game_id) = &partial.game_id {
            if game_id != &defaults.game_id {
                return Err(SaveError::Validation(format!(
                    "gameId '{}' does not match engine gameId '{}'",
                    game_id, defaults.game_id
                )));
            }
        }

        if let Some(progress) = partial.progress {
            if !progress.is_finite() {
                return Err(SaveError::Validation("progress must be a finite number".into()));
            }
        }

        let record = Self {
            game_id: defaults.game_id.clone(),
            user_id: partial.user_id.or_else(|| defaults.user_id.clone()),
            session_id: partial.session_id.unwrap_or_else(|| defaults.session_id.clone()),
            score: partial.score.unwrap_or(0),
            level: partial.level.unwrap_or_else(default_level),
            progress: partial.progress.unwrap_or(0.0),
            stats: partial.stats.unwrap_or_default(),
            settings: partial.settings.unwrap_or_default(),
            achievements: partial.achievements.unwrap_or_default(),
            unlocks: partial.unlocks.unwrap_or_default(),
            timestamp: partial.timestamp.unwrap_or(defaults.now_millis),
            save_version: CURRENT_SAVE_VERSION,
            build_version: partial.build_version.unwrap_or_else(|| defaults.build_version.clone()),
            platform: partial.platform.unwrap_or_else(|| defaults.platform.clone()),
            checksum: String::new(),
            compressed: false,
        };

        record.validate()?;
        Ok(record)
    }

    /// Parse a host-supplied JSON object into a partial save.
    pub fn partial_from_json(value: Value) -> Result<PartialSave, SaveError> {
        if !value.is_object() {
            return Err(SaveError::Validation("save payload must be a JSON object".into()));
        }
        serde_json::from_value(value).map_err(|e| SaveError::Validation(e.to_string()))
    }

    /// True when two records carry the same player progress, ignoring
    /// write-time bookkeeping (timestamp, checksum, compression flag).
    pub fn same_progress(&self, other: &SaveRecord) -> bool {
        self.game_id == other.game_id
            && self.score == other.score
            && self.level == other.level
            && self.progress == other.progress
            && self.stats == other.stats
            && self.settings == other.settings
            && self.achievements == other.achievements
            && self.unlocks == other.unlocks
    }
}

/// A save request where every field is optional; missing fields get defaults.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialSave {
    pub game_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub score: Option<i64>,
    pub level: Option<u32>,
    pub progress: Option<f64>,
    pub stats: Option<BTreeMap<String, Value>>,
    pub settings: Option<BTreeMap<String, Value>>,
    pub achievements: Option<BTreeSet<String>>,
    pub unlocks: Option<BTreeSet<String>>,
    pub timestamp: Option<u64>,
    pub build_version: Option<String>,
    pub platform: Option<String>,
}

impl PartialSave {
    /// Merge `newer` into `self`; every field `newer` supplies wins.
    pub fn merge(&mut self, newer: PartialSave) {
        fn take<T>(slot: &mut Option<T>, newer: Option<T>) {
            if newer.is_some() {
                *slot = newer;
            }
        }

        take(&mut self.game_id, newer.game_id);
        take(&mut self.user_id, newer.user_id);
        take(&mut self.session_id, newer.session_id);
        take(&mut self.score, newer.score);
        take(&mut self.level, newer.level);
        take(&mut self.progress, newer.progress);
        take(&mut self.stats, newer.stats);
        take(&mut self.settings, newer.settings);
        take(&mut self.achievements, newer.achievements);
        take(&mut self.unlocks, newer.unlocks);
        take(&mut self.timestamp, newer.timestamp);
        take(&mut self.build_version, newer.build_version);
        take(&mut self.platform, newer.platform);
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Local,
    Syncing,
    Synced,
    Conflict,
}

/// A populated storage location as reported to the host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaveSlot {
    pub slot: u8,
    pub record: SaveRecord,
    pub created_at: u64,
    pub updated_at: u64,
    pub sync_status: SyncStatus,
}

/// Compact slot summary for save/load menus.
#[derive(Debug, Clone)]
pub struct SaveSlotInfo {
    pub slot: u8,
    pub timestamp: u64,
    pub version: u32,
    pub score: i64,
    pub level: u32,
    pub progress: f64,
    pub sync_status: SyncStatus,
}

impl SaveSlotInfo {
    pub fn from_slot(slot: &SaveSlot) -> Self {
        Self {
            slot: slot.slot,
            timestamp: slot.updated_at,
            version: slot.record.save_version,
            score: slot.record.score,
            level: slot.record.level,
            progress: slot.record.progress,
            sync_status: slot.sync_status,
        }
    }

    pub fn format_timestamp(&self) -> String {
        use time::{format_description::well_known::Rfc3339, OffsetDateTime};

        let timestamp =
            OffsetDateTime::from_unix_timestamp_nanos(self.timestamp as i128 * 1_000_000)
                .unwrap_or_else(|_| OffsetDateTime::now_utc());

        timestamp.format(&Rfc3339).unwrap_or_else(|_| "Unknown".to_string())
    }

    pub fn display_text(&self) -> String {
        let label = if self.slot == crate::AUTOSAVE_SLOT {
            "Autosave".to_string()
        } else {
            format!("Slot {}", self.slot)
        };
        format!(
            "{}: Level {} - Score {} ({:.0}%)",
            label, self.level, self.score, self.progress
        )
    }
}
