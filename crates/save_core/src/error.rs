use thiserror::Error;

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Integrity check failed for slot {slot}: {reason}")]
    Integrity { slot: u8, reason: String },

    #[error("Unsupported save version: found {found}, current {current}")]
    Migration { found: u32, current: u32 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Decompression error")]
    Decompression,

    #[error("Invalid save slot: {slot}")]
    InvalidSlot { slot: i64 },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SaveError {
    /// Whether the engine can degrade around this error instead of failing the caller.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SaveError::Network(_) => true,
            SaveError::Integrity { .. } => true, // recovery chain
            SaveError::Migration { .. } => true, // reported as absent
            SaveError::Decompression => true,
            SaveError::Validation(_) => false,
            SaveError::Storage(_) | SaveError::Io(_) => false,
            SaveError::InvalidSlot { .. } => false,
            _ => false,
        }
    }

    /// Local-medium failures are the only ones `save`/`load` report to the caller.
    pub fn is_local_failure(&self) -> bool {
        matches!(self, SaveError::Storage(_) | SaveError::Io(_))
    }
}

impl From<validator::ValidationErrors> for SaveError {
    fn from(err: validator::ValidationErrors) -> Self {
        SaveError::Validation(err.to_string())
    }
}

impl From<reqwest::Error> for SaveError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SaveError::Network(format!("request timed out: {}", err))
        } else {
            SaveError::Network(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, SaveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(SaveError::Network("down".into()).is_recoverable());
        assert!(SaveError::Integrity { slot: 1, reason: "bad".into() }.is_recoverable());
        assert!(SaveError::Migration { found: 9, current: 2 }.is_recoverable());
        assert!(!SaveError::Validation("missing".into()).is_recoverable());
        assert!(!SaveError::Storage("full".into()).is_recoverable());
    }

    #[test]
    fn test_local_failure_classification() {
        assert!(SaveError::Storage("full".into()).is_local_failure());
        assert!(!SaveError::Network("down".into()).is_local_failure());
    }
}
