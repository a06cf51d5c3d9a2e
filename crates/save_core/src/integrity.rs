//! Content checksums for save records.
//!
//! The checksum is SHA-256 over the canonical JSON form of a record with the
//! `checksum` key removed. `serde_json::Value` objects keep their keys sorted,
//! so the canonical form is stable across platforms and field order.

use crate::error::SaveError;
use crate::record::SaveRecord;

use serde_json::Value;
use sha2::{Digest, Sha256};

const CHECKSUM_KEY: &str = "checksum";

/// Compute the checksum of a record. Pure and deterministic.
pub fn checksum(record: &SaveRecord) -> Result<String, SaveError> {
    let value = serde_json::to_value(record)?;
    checksum_value(&value)
}

/// Compute the checksum of an already-parsed record document.
///
/// Used on the read path so that keys the typed record would ignore or
/// default still take part in verification.
pub fn checksum_value(value: &Value) -> Result<String, SaveError> {
    let mut canonical = value.clone();
    match canonical.as_object_mut() {
        Some(map) => {
            map.remove(CHECKSUM_KEY);
        }
        None => return Err(SaveError::Validation("record must be a JSON object".into())),
    }

    let bytes = serde_json::to_vec(&canonical)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Recompute and compare. Any difference is corruption.
pub fn verify(record: &SaveRecord) -> bool {
    match checksum(record) {
        Ok(actual) => !record.checksum.is_empty() && actual == record.checksum,
        Err(_) => false,
    }
}

/// Verify a parsed record document against the checksum it carries.
pub fn verify_value(value: &Value) -> bool {
    let stored = match value.get(CHECKSUM_KEY).and_then(Value::as_str) {
        Some(stored) if !stored.is_empty() => stored,
        _ => return false,
    };

    match checksum_value(value) {
        Ok(actual) => actual == stored,
        Err(_) => false,
    }
}

/// Verify a document as it was written, then parse it.
///
/// Records from older schemas verify here even though the typed record
/// would re-serialize with fields they never had.
pub fn open_document(slot: u8, document: Value) -> Result<SaveRecord, SaveError> {
    if !verify_value(&document) {
        return Err(SaveError::Integrity { slot, reason: "checksum mismatch".to_string() });
    }
    serde_json::from_value(document).map_err(|e| SaveError::Integrity {
        slot,
        reason: format!("malformed record: {}", e),
    })
}

/// Stamp a fresh checksum onto a record, producing a new sealed record.
pub fn stamp(mut record: SaveRecord) -> Result<SaveRecord, SaveError> {
    record.checksum = String::new();
    record.checksum = checksum(&record)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{PartialSave, RecordDefaults};
    use serde_json::json;

    fn sample() -> SaveRecord {
        let defaults = RecordDefaults {
            game_id: "demo".to_string(),
            user_id: Some("user-1".to_string()),
            session_id: "session-1".to_string(),
            build_version: "1.0.0".to_string(),
            platform: "linux".to_string(),
            now_millis: 1_700_000_000_000,
        };
        let mut partial = PartialSave { score: Some(150), level: Some(3), ..Default::default() };
        partial.stats = Some([("kills".to_string(), json!(12))].into_iter().collect());
        SaveRecord::from_partial(partial, &defaults).unwrap()
    }

    #[test]
    fn test_checksum_is_deterministic() {
        let record = sample();
        assert_eq!(checksum(&record).unwrap(), checksum(&record).unwrap());
        assert_eq!(checksum(&record).unwrap().len(), 64);
    }

    #[test]
    fn test_checksum_ignores_checksum_field() {
        let record = sample();
        let mut other = record.clone();
        other.checksum = "garbage".to_string();
        assert_eq!(checksum(&record).unwrap(), checksum(&other).unwrap());
    }

    #[test]
    fn test_verify_detects_tampering() {
        let sealed = stamp(sample()).unwrap();
        assert!(verify(&sealed));

        let mut tampered = sealed.clone();
        tampered.score += 1;
        assert!(!verify(&tampered));

        let mut unsealed = sealed;
        unsealed.checksum.clear();
        assert!(!verify(&unsealed));
    }

    #[test]
    fn test_verify_value_detects_extra_keys() {
        let sealed = stamp(sample()).unwrap();
        let mut value = serde_json::to_value(&sealed).unwrap();
        assert!(verify_value(&value));

        value.as_object_mut().unwrap().insert("cheat".to_string(), json!(true));
        assert!(!verify_value(&value));
    }

    #[test]
    fn test_typed_and_value_checksums_agree() {
        let sealed = stamp(sample()).unwrap();
        let value = serde_json::to_value(&sealed).unwrap();
        assert_eq!(checksum_value(&value).unwrap(), sealed.checksum);
    }

    #[test]
    fn test_open_document_accepts_older_shapes() {
        // Written before achievements/unlocks/provenance existed.
        let mut document = json!({
            "gameId": "demo",
            "sessionId": "old-session",
            "score": 320,
            "level": 2,
            "progress": 10.0,
            "timestamp": 1_000,
            "saveVersion": 1,
        });
        let sum = checksum_value(&document).unwrap();
        document["checksum"] = json!(sum);

        let record = open_document(1, document.clone()).unwrap();
        assert_eq!(record.score, 320);
        assert!(record.achievements.is_empty());
        // The typed record re-serializes with the newer fields.
        assert!(!verify(&record));

        document["score"] = json!(321);
        assert!(matches!(open_document(1, document), Err(SaveError::Integrity { slot: 1, .. })));
    }
}
