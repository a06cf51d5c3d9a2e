use save_core::codec::seal;
use save_core::record::RecordDefaults;
use save_core::storage::slot_key;
use save_core::{integrity, MemoryStorage, PartialSave, SaveRecord, SaveStorage, SlotRead, SlotStore};

use proptest::prelude::*;
use std::sync::Arc;

fn sealed_record(score: i64, level: u32) -> SaveRecord {
    let defaults = RecordDefaults {
        game_id: "demo".to_string(),
        user_id: Some("player-1".to_string()),
        session_id: "session-1".to_string(),
        build_version: "1.0.0".to_string(),
        platform: "linux".to_string(),
        now_millis: 1_700_000_000_000,
    };
    let partial = PartialSave {
        score: Some(score),
        level: Some(level),
        progress: Some(42.5),
        ..Default::default()
    };
    seal(SaveRecord::from_partial(partial, &defaults).unwrap(), 1024).unwrap()
}

/// Large enough to cross the 1 KiB compression threshold.
fn compressed_record(score: i64) -> SaveRecord {
    let mut record = sealed_record(score, 3);
    record.stats = (0..120).map(|i| (format!("stat_{:03}", i), serde_json::json!(i * 7))).collect();
    let record = seal(record, 1024).unwrap();
    assert!(record.compressed);
    record
}

proptest! {
    #[test]
    fn flipped_payload_byte_is_never_accepted(
        score in -1_000_000i64..1_000_000,
        level in 1u32..100,
        index in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let storage = Arc::new(MemoryStorage::new());
        let slots = SlotStore::new(storage.clone(), "demo");
        let record = sealed_record(score, level);
        prop_assert!(!record.compressed);
        slots.write(1, &record).unwrap();

        let key = slot_key("demo", 1);
        let mut bytes = storage.get(&key).unwrap().unwrap();
        let at = index.index(bytes.len());
        bytes[at] ^= mask;
        storage.set(&key, &bytes).unwrap();

        let read = slots.read(1).unwrap();
        prop_assert!(matches!(read, SlotRead::Corrupted(_)), "flip at {} accepted", at);
    }

    #[test]
    fn flipped_compressed_byte_is_never_accepted(
        score in -1_000_000i64..1_000_000,
        index in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let storage = Arc::new(MemoryStorage::new());
        let slots = SlotStore::new(storage.clone(), "demo");
        let record = compressed_record(score);
        slots.write(1, &record).unwrap();

        // The 4-byte size prefix only sizes the output buffer; flip the block itself.
        let key = slot_key("demo", 1);
        let mut bytes = storage.get(&key).unwrap().unwrap();
        let at = 4 + index.index(bytes.len() - 4);
        bytes[at] ^= mask;
        storage.set(&key, &bytes).unwrap();

        // A flipped match offset can still decode to the same text; anything else is corruption.
        match slots.read(1).unwrap() {
            SlotRead::Corrupted(_) => {}
            SlotRead::Found(found, _) => prop_assert_eq!(found, record, "flip at {} altered the record", at),
            SlotRead::Missing => prop_assert!(false, "slot vanished after flip at {}", at),
        }
    }

    #[test]
    fn changed_score_fails_verification(score in any::<i64>(), delta in 1i64..1_000) {
        let mut record = sealed_record(score, 1);
        prop_assert!(integrity::verify(&record));

        record.score = score.wrapping_add(delta);
        prop_assert!(!integrity::verify(&record));
    }
}
