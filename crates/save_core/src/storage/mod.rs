//! Local key-value persistence media.
//!
//! Keys follow `save::{gameId}::{slot}` for record bytes and
//! `save::{gameId}::{slot}::meta` for the sidecar metadata entry.

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::SaveError;

/// A durable byte store keyed by strings.
pub trait SaveStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SaveError>;

    fn set(&self, key: &str, bytes: &[u8]) -> Result<(), SaveError>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), SaveError>;
}

pub fn slot_key(game_id: &str, slot: u8) -> String {
    format!("save::{}::{}", game_id, slot)
}

pub fn meta_key(game_id: &str, slot: u8) -> String {
    format!("save::{}::{}::meta", game_id, slot)
}

pub fn metrics_key(game_id: &str) -> String {
    format!("save::{}::metrics", game_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(slot_key("demo", 2), "save::demo::2");
        assert_eq!(meta_key("demo", 2), "save::demo::2::meta");
        assert_eq!(metrics_key("demo"), "save::demo::metrics");
    }
}
