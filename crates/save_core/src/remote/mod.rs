//! Remote tier: the authoritative save API and the identity-gated client.
//!
//! Anonymous or offline play is a normal state, not an error: every
//! client operation then reports [`SyncOutcome::Unavailable`].

pub mod http;
pub mod memory;

pub use http::HttpSaveApi;
pub use memory::MemoryRemote;

use crate::error::SaveError;
use crate::integrity;
use crate::platform::Platform;
use crate::record::SaveRecord;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// JSON envelope used by every remote endpoint.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { ok: true, data: Some(data), error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { ok: false, data: None, error: Some(error.into()) }
    }

    pub fn into_result(self) -> Result<Option<T>, SaveError> {
        if self.ok {
            Ok(self.data)
        } else {
            Err(SaveError::Network(
                self.error.unwrap_or_else(|| "remote reported failure".to_string()),
            ))
        }
    }
}

/// One remote copy as listed by the API, exactly as it was uploaded.
///
/// Kept as a raw document so copies written by older clients still verify
/// against their own checksum.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub slot: u8,
    pub record: Value,
}

/// A remote copy that passed verification.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSave {
    pub slot: u8,
    pub record: SaveRecord,
}

/// Request/response save API, scoped by user and game.
pub trait RemoteSaveApi: Send + Sync {
    fn list(&self, user_id: &str, game_id: &str) -> Result<Vec<RemoteDocument>, SaveError>;

    fn upsert(
        &self,
        user_id: &str,
        game_id: &str,
        slot: u8,
        record: &SaveRecord,
    ) -> Result<(), SaveError>;

    fn delete(&self, user_id: &str, game_id: &str, slot: u8) -> Result<(), SaveError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome<T> {
    /// No identity or no connectivity; nothing was attempted.
    Unavailable,
    Completed(T),
    Failed(String),
}

impl<T> SyncOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, SyncOutcome::Completed(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            SyncOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> From<Result<T, SaveError>> for SyncOutcome<T> {
    fn from(result: Result<T, SaveError>) -> Self {
        match result {
            Ok(value) => SyncOutcome::Completed(value),
            Err(e) => SyncOutcome::Failed(e.to_string()),
        }
    }
}

/// Uploads, downloads and deletes records for one game.
pub struct RemoteSyncClient {
    api: Option<Arc<dyn RemoteSaveApi>>,
    platform: Arc<dyn Platform>,
    game_id: String,
}

impl RemoteSyncClient {
    pub fn new(
        api: Option<Arc<dyn RemoteSaveApi>>,
        platform: Arc<dyn Platform>,
        game_id: impl Into<String>,
    ) -> Self {
        Self { api, platform, game_id: game_id.into() }
    }

    /// The API plus the identity to act as, when remote operations may run.
    fn session(&self) -> Option<(&dyn RemoteSaveApi, String)> {
        let api = self.api.as_deref()?;
        if !self.platform.is_online() {
            return None;
        }
        let user_id = self.platform.current_user_id()?;
        Some((api, user_id))
    }

    pub fn is_available(&self) -> bool {
        self.session().is_some()
    }

    pub fn upload(&self, slot: u8, record: &SaveRecord) -> SyncOutcome<()> {
        let Some((api, user_id)) = self.session() else {
            return SyncOutcome::Unavailable;
        };

        let result = api.upsert(&user_id, &self.game_id, slot, record);
        if let Err(e) = &result {
            log::warn!("Upload of slot {} failed: {}", slot, e);
        }
        result.into()
    }

    /// Fetch one slot, or the most recent remote record when `slot` is `None`.
    pub fn download(&self, slot: Option<u8>) -> SyncOutcome<Option<SaveRecord>> {
        match self.download_entry(slot) {
            SyncOutcome::Completed(entry) => SyncOutcome::Completed(entry.map(|save| save.record)),
            SyncOutcome::Unavailable => SyncOutcome::Unavailable,
            SyncOutcome::Failed(e) => SyncOutcome::Failed(e),
        }
    }

    /// Like [`download`](Self::download) but keeps the slot the copy was listed under.
    ///
    /// Remote copies that fail verification or belong to another game are skipped.
    pub fn download_entry(&self, slot: Option<u8>) -> SyncOutcome<Option<RemoteSave>> {
        let Some((api, user_id)) = self.session() else {
            return SyncOutcome::Unavailable;
        };

        let saves = match api.list(&user_id, &self.game_id) {
            Ok(saves) => saves,
            Err(e) => {
                log::warn!("Listing remote saves failed: {}", e);
                return SyncOutcome::Failed(e.to_string());
            }
        };

        let best = saves
            .into_iter()
            .filter(|save| slot.map(|s| s == save.slot).unwrap_or(true))
            .filter_map(|save| match integrity::open_document(save.slot, save.record) {
                Ok(record) if record.game_id == self.game_id => {
                    Some(RemoteSave { slot: save.slot, record })
                }
                Ok(record) => {
                    log::warn!("Ignoring remote copy of slot {} for game '{}'", save.slot, record.game_id);
                    None
                }
                Err(e) => {
                    log::warn!("Ignoring invalid remote copy: {}", e);
                    None
                }
            })
            .max_by_key(|save| save.record.timestamp);

        SyncOutcome::Completed(best)
    }

    pub fn delete(&self, slot: u8) -> SyncOutcome<()> {
        let Some((api, user_id)) = self.session() else {
            return SyncOutcome::Unavailable;
        };

        let result = api.delete(&user_id, &self.game_id, slot);
        if let Err(e) = &result {
            log::warn!("Remote delete of slot {} failed: {}", slot, e);
        }
        result.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::seal;
    use crate::platform::HostPlatform;
    use crate::record::{PartialSave, RecordDefaults};

    fn sealed(game_id: &str, score: i64, timestamp: u64) -> SaveRecord {
        let defaults = RecordDefaults {
            game_id: game_id.to_string(),
            user_id: Some("user-1".to_string()),
            session_id: "session-1".to_string(),
            build_version: "1.0.0".to_string(),
            platform: "linux".to_string(),
            now_millis: timestamp,
        };
        let partial = PartialSave { score: Some(score), ..Default::default() };
        seal(SaveRecord::from_partial(partial, &defaults).unwrap(), 1024).unwrap()
    }

    fn client(online: bool, user: Option<&str>) -> (Arc<MemoryRemote>, RemoteSyncClient) {
        let remote = Arc::new(MemoryRemote::new());
        let platform = Arc::new(HostPlatform::new(user.map(str::to_string), online));
        let client = RemoteSyncClient::new(Some(remote.clone()), platform, "demo");
        (remote, client)
    }

    #[test]
    fn test_anonymous_is_unavailable() {
        let (remote, client) = client(true, None);
        assert!(!client.is_available());
        assert_eq!(client.upload(1, &sealed("demo", 1, 1)), SyncOutcome::Unavailable);
        assert_eq!(client.download(None), SyncOutcome::Unavailable);
        assert_eq!(client.delete(1), SyncOutcome::Unavailable);
        assert_eq!(remote.upsert_count(), 0);
    }

    #[test]
    fn test_offline_is_unavailable() {
        let (_, client) = client(false, Some("user-1"));
        assert_eq!(client.upload(1, &sealed("demo", 1, 1)), SyncOutcome::Unavailable);
    }

    #[test]
    fn test_no_api_is_unavailable() {
        let platform = Arc::new(HostPlatform::new(Some("user-1".into()), true));
        let client = RemoteSyncClient::new(None, platform, "demo");
        assert_eq!(client.download(Some(1)), SyncOutcome::Unavailable);
    }

    #[test]
    fn test_upload_then_download_slot_and_latest() {
        let (_, client) = client(true, Some("user-1"));
        let older = sealed("demo", 10, 1_000);
        let newer = sealed("demo", 20, 2_000);

        assert!(client.upload(1, &older).is_completed());
        assert!(client.upload(3, &newer).is_completed());

        assert_eq!(client.download(Some(1)).completed().flatten(), Some(older));
        assert_eq!(client.download(None).completed().flatten(), Some(newer));
        assert_eq!(client.download(Some(4)), SyncOutcome::Completed(None));

        let entry = client.download_entry(None).completed().flatten().unwrap();
        assert_eq!(entry.slot, 3);
    }

    #[test]
    fn test_download_skips_tampered_copies() {
        let (remote, client) = client(true, Some("user-1"));
        let mut tampered = sealed("demo", 10, 1_000);
        tampered.score = 1_000_000;
        remote.insert("user-1", "demo", 2, tampered);

        assert_eq!(client.download(Some(2)), SyncOutcome::Completed(None));
    }

    #[test]
    fn test_download_keeps_older_schema_copies() {
        let (remote, client) = client(true, Some("user-1"));
        let mut document = serde_json::json!({
            "gameId": "demo",
            "sessionId": "old-session",
            "score": 320,
            "level": 2,
            "timestamp": 5_000,
            "saveVersion": 1,
        });
        let sum = integrity::checksum_value(&document).unwrap();
        document["checksum"] = serde_json::json!(sum);
        remote.insert_document("user-1", "demo", 1, document);

        let record = client.download(Some(1)).completed().flatten().unwrap();
        assert_eq!(record.score, 320);
        assert_eq!(record.save_version, 1);
    }

    #[test]
    fn test_outage_reports_failure() {
        let (remote, client) = client(true, Some("user-1"));
        remote.set_reachable(false);

        assert!(matches!(client.upload(1, &sealed("demo", 1, 1)), SyncOutcome::Failed(_)));
        assert!(matches!(client.download(None), SyncOutcome::Failed(_)));
    }

    #[test]
    fn test_delete() {
        let (remote, client) = client(true, Some("user-1"));
        client.upload(2, &sealed("demo", 1, 1));
        assert!(remote.stored("user-1", "demo", 2).is_some());

        assert!(client.delete(2).is_completed());
        assert!(remote.stored("user-1", "demo", 2).is_none());
    }

    #[test]
    fn test_api_response_envelope() {
        let ok: ApiResponse<u32> = serde_json::from_str(r#"{"ok":true,"data":7}"#).unwrap();
        assert_eq!(ok.into_result().unwrap(), Some(7));

        let err: ApiResponse<u32> =
            serde_json::from_str(r#"{"ok":false,"error":"quota exceeded"}"#).unwrap();
        assert!(matches!(err.into_result(), Err(SaveError::Network(msg)) if msg == "quota exceeded"));
    }
}
