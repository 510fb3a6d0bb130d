//!
//! src/catalog.rs
//!
//! Music catalog collaborator: playlist listings and per track
//! audio features. The Spotify implementation keeps one client
//! credentials token for the whole run.
//!

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode, header};
use tokio::sync::Mutex;
use tokio::time::Instant;
use std::time::Duration;
use tracing::debug;

use crate::errors::ExtractorError;
use crate::fetch::{http_with_retry, SpotifyClient};
use crate::config::RetryConfig;
use crate::types::{AudioFeatures, ItemPage};

#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// First page of a playlist listing
    async fn playlist_items(&self, playlist_id: &str, limit: u32) ->
        Result<ItemPage, ExtractorError>;

    /// Page behind the `next` indicator of a previous page
    async fn next_page(&self, next: &str) -> Result<ItemPage, ExtractorError>;

    /// Feature vector of one track, None when the catalog has none
    async fn audio_features(&self, track_id: &str) ->
        Result<Option<AudioFeatures>, ExtractorError>;
}

/// Accepts an open.spotify.com url, a spotify:playlist: uri or a bare id
pub fn parse_playlist_id(reference: &str) -> Result<String, ExtractorError> {
    let reference = reference.trim();
    let id: String = if let Some(rest) = reference.strip_prefix("spotify:playlist:") {
        rest.to_string()
    } else if reference.contains("://") {
        let url = url::Url::parse(reference)
            .map_err(|e| ExtractorError::Parse(format!("playlist url {reference}: {e}")))?;
        let mut segments = url.path_segments()
            .ok_or_else(|| ExtractorError::Parse(format!("playlist url {reference}")))?;
        let id = match (segments.next(), segments.next()) {
            (Some("playlist"), Some(id)) => id.to_string(),
            _ => return Err(ExtractorError::Parse(
                format!("not a playlist url: {reference}")
            ))
        };
        id
    } else {
        reference.to_string()
    };

    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ExtractorError::Parse(format!("invalid playlist id: {reference}")));
    }
    Ok(id)
}

struct Token {
    bearer: String,
    expires: Instant
}

pub struct SpotifyCatalog {
    client: SpotifyClient,
    retry: RetryConfig,
    token: Mutex<Option<Token>>
}

impl SpotifyCatalog {
    pub fn new(client: SpotifyClient, retry: RetryConfig) -> Self {
        Self { client, retry, token: Mutex::new(None) }
    }

    async fn refresh_token(&self) -> Result<Token, ExtractorError> {
        let response = http_with_retry(
            self.client.token_request(),
            self.retry.max_attempts as usize,
            self.retry.base_backoff.as_millis() as u64
        ).await?;
        let bearer = response["access_token"].as_str()
            .ok_or_else(|| ExtractorError::Http("no access_token in response".into()))?
            .to_string();
        let expires_in = response["expires_in"].as_u64().unwrap_or(3600);
        let expires = Instant::now() + Duration::from_secs(expires_in.saturating_sub(60));
        Ok( Token { bearer, expires } )
    }

    async fn bearer(&self) -> Result<String, ExtractorError> {
        let mut token = self.token.lock().await;
        let stale = token.as_ref().map_or(true, |t| Instant::now() >= t.expires);
        if stale {
            *token = Some(self.refresh_token().await?);
            debug!("spotify.token.refreshed");
        }
        token.as_ref()
            .map(|t| t.bearer.clone())
            .ok_or_else(|| ExtractorError::Http("spotify token unavailable".into()))
    }

    async fn send_json(request: RequestBuilder) -> Result<Option<serde_json::Value>, ExtractorError> {
        let resp = request.send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp.headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string();
            return Err(ExtractorError::RateLimited(retry_after));
        }
        let resp = resp.error_for_status()?;
        Ok(Some(resp.json::<serde_json::Value>().await?))
    }

    async fn page(request: RequestBuilder) -> Result<ItemPage, ExtractorError> {
        let value = Self::send_json(request).await?
            .ok_or_else(|| ExtractorError::NotFound("playlist page".into()))?;
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl CatalogApi for SpotifyCatalog {
    async fn playlist_items(&self, playlist_id: &str, limit: u32) ->
        Result<ItemPage, ExtractorError> {
        let bearer = self.bearer().await?;
        Self::page(self.client.playlist_items(playlist_id, limit, &bearer)?).await
    }

    async fn next_page(&self, next: &str) -> Result<ItemPage, ExtractorError> {
        let bearer = self.bearer().await?;
        Self::page(self.client.next_page(next, &bearer)?).await
    }

    async fn audio_features(&self, track_id: &str) ->
        Result<Option<AudioFeatures>, ExtractorError> {
        let bearer = self.bearer().await?;
        let value = Self::send_json(self.client.audio_features(track_id, &bearer)?).await?;
        match value {
            Some(v) if !v.is_null() => Ok(Some(serde_json::from_value(v)?)),
            _ => Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playlist_references() {
        let id = "37i9dQZF1DWXYWuNDAdJsw";
        assert_eq!(
            parse_playlist_id("https://open.spotify.com/playlist/37i9dQZF1DWXYWuNDAdJsw?si=83de61e9d5884a17")
                .unwrap(),
            id
        );
        assert_eq!(parse_playlist_id(&format!("spotify:playlist:{id}")).unwrap(), id);
        assert_eq!(parse_playlist_id(&format!("  {id}\n")).unwrap(), id);
    }

    #[test]
    fn url_id_outlives_the_parsed_url() {
        let ids: Vec<String> = [
            "https://open.spotify.com/playlist/0c3djV2XAgsWOm5KOHIZ6A",
            "https://open.spotify.com/playlist/37i9dQZF1DWXYWuNDAdJsw/",
        ].iter().map(|r| parse_playlist_id(r).unwrap()).collect();
        assert_eq!(ids, vec!["0c3djV2XAgsWOm5KOHIZ6A", "37i9dQZF1DWXYWuNDAdJsw"]);
    }

    #[test]
    fn rejects_non_playlists() {
        assert!(parse_playlist_id("https://open.spotify.com/album/0c3djV2XAgsWOm5KOHIZ6A").is_err());
        assert!(parse_playlist_id("").is_err());
        assert!(parse_playlist_id("abc/def").is_err());
    }

    #[test]
    fn feature_payload_maps_all_thirteen() {
        let v = serde_json::json!({
            "danceability": 0.735, "energy": 0.578, "key": 5, "loudness": -11.84,
            "mode": 0, "speechiness": 0.0461, "acousticness": 0.514,
            "instrumentalness": 0.0902, "liveness": 0.159, "valence": 0.624,
            "tempo": 98.002, "type": "audio_features", "id": "x",
            "duration_ms": 255349, "time_signature": 4
        });
        let features: AudioFeatures = serde_json::from_value(v).unwrap();
        assert!(features.is_complete());
        assert_eq!(features.key, Some(5));
        assert_eq!(features.mode, Some(0));
        assert_eq!(features.loudness, Some(-11.84));
    }
}
