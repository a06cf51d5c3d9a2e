//! Payload encoding: JSON serialization plus optional LZ4 compression.
//!
//! Whether a payload is compressed is recorded next to it (record flag and
//! slot metadata); the decoder follows that flag and never sniffs bytes.

use crate::error::SaveError;
use crate::integrity;
use crate::record::SaveRecord;

use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use serde_json::Value;

/// True when the serialized record is larger than `threshold` bytes.
pub fn should_compress(record: &SaveRecord, threshold: usize) -> Result<bool, SaveError> {
    let size = serde_json::to_vec(record)?.len();
    Ok(size > threshold)
}

/// LZ4 with the uncompressed size prepended.
pub fn compress(bytes: &[u8]) -> Vec<u8> {
    compress_prepend_size(bytes)
}

pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, SaveError> {
    decompress_size_prepended(bytes).map_err(|_| SaveError::Decompression)
}

/// Decide compression, then checksum. Returns the sealed record.
///
/// The compression flag is part of the hashed content, so it is set first.
pub fn seal(mut record: SaveRecord, threshold: usize) -> Result<SaveRecord, SaveError> {
    record.compressed = false;
    record.checksum = String::new();
    record.compressed = should_compress(&record, threshold)?;
    integrity::stamp(record)
}

/// Serialize a sealed record into the bytes persisted for it.
pub fn encode_record(record: &SaveRecord) -> Result<Vec<u8>, SaveError> {
    let json = serde_json::to_vec(record)?;
    if record.compressed {
        Ok(compress(&json))
    } else {
        Ok(json)
    }
}

/// Turn persisted bytes back into a JSON document.
///
/// Malformed bytes surface as `Decompression` or `Serialization`; callers
/// treat both as corruption.
pub fn decode_document(bytes: &[u8], compressed: bool) -> Result<Value, SaveError> {
    let json = if compressed { decompress(bytes)? } else { bytes.to_vec() };
    let value: Value = serde_json::from_slice(&json)?;
    if !value.is_object() {
        return Err(SaveError::Validation("record payload is not a JSON object".into()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{PartialSave, RecordDefaults};
    use crate::COMPRESSION_THRESHOLD;
    use serde_json::json;

    fn record_with_stats(entries: usize) -> SaveRecord {
        let defaults = RecordDefaults {
            game_id: "demo".to_string(),
            user_id: None,
            session_id: "session-1".to_string(),
            build_version: "1.0.0".to_string(),
            platform: "linux".to_string(),
            now_millis: 1_700_000_000_000,
        };
        let stats = (0..entries).map(|i| (format!("enemy_{:04}_defeated", i), json!(i))).collect();
        let partial = PartialSave { stats: Some(stats), ..Default::default() };
        SaveRecord::from_partial(partial, &defaults).unwrap()
    }

    #[test]
    fn test_small_record_not_compressed() {
        let sealed = seal(record_with_stats(1), COMPRESSION_THRESHOLD).unwrap();
        assert!(!sealed.compressed);
        assert!(integrity::verify(&sealed));
    }

    #[test]
    fn test_large_record_compressed() {
        let sealed = seal(record_with_stats(200), COMPRESSION_THRESHOLD).unwrap();
        assert!(sealed.compressed);
        assert!(integrity::verify(&sealed));

        let bytes = encode_record(&sealed).unwrap();
        let plain = serde_json::to_vec(&sealed).unwrap();
        assert!(bytes.len() < plain.len());

        let value = decode_document(&bytes, true).unwrap();
        assert!(integrity::verify_value(&value));
        let decoded: SaveRecord = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, sealed);
    }

    #[test]
    fn test_compress_roundtrip_exact() {
        let input = b"aaaaaaaaaabbbbbbbbbbaaaaaaaaaa\x00\xff".repeat(40);
        assert_eq!(decompress(&compress(&input)).unwrap(), input);
        assert_eq!(decompress(&compress(&[])).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(decode_document(b"{not json", false).is_err());
        assert!(decode_document(b"[1,2]", false).is_err());
        assert!(decode_document(&[0x10, 0x00, 0x00, 0x00, 0xff], true).is_err());
    }
}
