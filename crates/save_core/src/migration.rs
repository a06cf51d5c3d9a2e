use crate::error::SaveError;
use crate::integrity;
use crate::record::SaveRecord;
use crate::CURRENT_SAVE_VERSION;

/// Provenance value back-filled into records that predate it.
pub const LEGACY_BUILD_VERSION: &str = "unknown";
pub const LEGACY_PLATFORM: &str = "unknown";

type UpgradeStep = fn(SaveRecord) -> SaveRecord;

/// Ordered upgrade chain; entry `n` upgrades a version-`n` record to `n + 1`.
const UPGRADE_STEPS: &[(u32, UpgradeStep)] = &[(0, migrate_v0_to_v1), (1, migrate_v1_to_v2)];

/// Migrate a record from an older schema version to the current one.
///
/// Records already at the current version are returned unchanged. Records
/// from a newer schema cannot be downgraded and are rejected.
pub fn migrate(mut record: SaveRecord) -> Result<SaveRecord, SaveError> {
    let original_version = record.save_version;

    if original_version == CURRENT_SAVE_VERSION {
        return Ok(record);
    }

    if original_version > CURRENT_SAVE_VERSION {
        log::warn!(
            "Save from future version {} (current: {}) cannot be migrated",
            original_version,
            CURRENT_SAVE_VERSION
        );
        return Err(SaveError::Migration {
            found: original_version,
            current: CURRENT_SAVE_VERSION,
        });
    }

    for (from, step) in UPGRADE_STEPS {
        if record.save_version == *from {
            record = step(record);
            record.save_version = from + 1;
        }
    }

    record.save_version = CURRENT_SAVE_VERSION;
    let record = integrity::stamp(record)?;

    log::info!("Migrated save from version {} to {}", original_version, CURRENT_SAVE_VERSION);
    Ok(record)
}

/// Pre-versioned records: repair values later versions rely on.
fn migrate_v0_to_v1(mut record: SaveRecord) -> SaveRecord {
    if record.level == 0 {
        record.level = 1;
    }
    if record.session_id.is_empty() {
        record.session_id = "legacy".to_string();
    }
    if !record.progress.is_finite() {
        record.progress = 0.0;
    }
    record.progress = record.progress.clamp(0.0, 100.0);
    record
}

/// Version 2 introduced achievements, unlocks and provenance metadata.
///
/// Missing collections deserialize as empty sets, so only the provenance
/// strings need defaults here.
fn migrate_v1_to_v2(mut record: SaveRecord) -> SaveRecord {
    if record.build_version.is_empty() {
        record.build_version = LEGACY_BUILD_VERSION.to_string();
    }
    if record.platform.is_empty() {
        record.platform = LEGACY_PLATFORM.to_string();
    }
    record
}

/// Check if a record needs migration
pub fn needs_migration(record: &SaveRecord) -> bool {
    record.save_version < CURRENT_SAVE_VERSION
}

/// Get migration description for UI display
pub fn describe_migration(from_version: u32, to_version: u32) -> String {
    match (from_version, to_version) {
        (0, 1) => "Repairing level and session data from an unversioned save".to_string(),
        (1, 2) => "Adding achievements, unlocks and build information".to_string(),
        _ => format!("Updating save format from version {} to {}", from_version, to_version),
    }
}
