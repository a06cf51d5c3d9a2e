use super::{ApiResponse, RemoteDocument, RemoteSaveApi};
use crate::config::RemoteConfig;
use crate::error::SaveError;
use crate::record::SaveRecord;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::time::Duration;

const USER_ID_HEADER: &str = "X-User-Id";

/// Remote save API over HTTP.
///
/// - `GET    {base}/games/{gameId}/saves`
/// - `PUT    {base}/games/{gameId}/saves/{slot}`
/// - `DELETE {base}/games/{gameId}/saves/{slot}`
pub struct HttpSaveApi {
    client: Client,
    base_url: Url,
}

impl HttpSaveApi {
    pub fn new(config: &RemoteConfig) -> Result<Self, SaveError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| SaveError::Config(format!("invalid remote base_url: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(SaveError::Config(format!("remote base_url '{}' cannot be a base", base_url)));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("save_core/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, base_url })
    }

    fn saves_url(&self, game_id: &str, slot: Option<u8>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["games", game_id, "saves"]);
            if let Some(slot) = slot {
                segments.push(&slot.to_string());
            }
        }
        url
    }

    fn send<T: DeserializeOwned>(request: RequestBuilder, user_id: &str) -> Result<Option<T>, SaveError> {
        let response = request.header(USER_ID_HEADER, user_id).send()?;
        let status = response.status();
        let body = response.text()?;

        match serde_json::from_str::<ApiResponse<T>>(&body) {
            Ok(envelope) => envelope.into_result(),
            Err(_) if !status.is_success() => {
                Err(SaveError::Network(format!("remote save API returned HTTP {}", status)))
            }
            Err(e) => Err(SaveError::Network(format!("malformed response: {}", e))),
        }
    }
}

impl RemoteSaveApi for HttpSaveApi {
    fn list(&self, user_id: &str, game_id: &str) -> Result<Vec<RemoteDocument>, SaveError> {
        let request = self.client.get(self.saves_url(game_id, None));
        Ok(Self::send::<Vec<RemoteDocument>>(request, user_id)?.unwrap_or_default())
    }

    fn upsert(
        &self,
        user_id: &str,
        game_id: &str,
        slot: u8,
        record: &SaveRecord,
    ) -> Result<(), SaveError> {
        let request = self.client.put(self.saves_url(game_id, Some(slot))).json(record);
        Self::send::<serde_json::Value>(request, user_id)?;
        log::debug!("Uploaded slot {} of '{}'", slot, game_id);
        Ok(())
    }

    fn delete(&self, user_id: &str, game_id: &str, slot: u8) -> Result<(), SaveError> {
        let request = self.client.delete(self.saves_url(game_id, Some(slot)));
        Self::send::<serde_json::Value>(request, user_id)?;
        Ok(())
    }
}
