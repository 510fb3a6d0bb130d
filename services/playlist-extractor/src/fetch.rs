//!
//! src/fetch.rs
//!
//! Defines methods for hitting specified endpoints and
//! returning unparsed requests. Parsing and error policy live with
//! the callers (catalog.rs, lyrics.rs).
//!

use rand::{rngs::SmallRng, Rng, SeedableRng};
use reqwest::{Client, header, redirect, RequestBuilder};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;
use url::Url;

use crate::config::{GeniusConfig, HttpConfig, SpotifyConfig};
use crate::errors::ExtractorError;

/// Client building functionality
fn client_helper(http: &HttpConfig) -> reqwest::ClientBuilder  {
    Client::builder()
        .timeout(http.timeout)
        .connect_timeout(http.connect_timeout)
        .pool_max_idle_per_host(http.pool_max_idle_per_host)
        .pool_idle_timeout(Some(http.pool_idle_timeout))
        .redirect(redirect::Policy::limited(http.max_redirects as usize))
}

fn client_with_headers(http: &HttpConfig, headers: header::HeaderMap) ->
    Result<Client, ExtractorError> {
    client_helper(http)
        .default_headers(headers)
        .build()
        .map_err(|e| ExtractorError::Http(format!("build client: {e}")))
}

pub fn base_client(http: &HttpConfig) -> Result<Client, ExtractorError> {
    let mut h = header::HeaderMap::new();
    h.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    client_with_headers(http, h)
}

fn join(base: &Url, path: &str) -> Result<Url, ExtractorError> {
    base.join(path)
        .map_err(|e| ExtractorError::Config(format!("bad url {base}{path}: {e}")))
}

/// Simple function to generate random wait for http_with_retry
fn generate_backoff(ms: u64, attempt: usize, rng: &mut SmallRng) -> Duration {
    let exp = (1_u64 << attempt.min(6)) * ms;
    let jitter = rng.gen_range(50..=200) as u64;
    Duration::from_millis(exp + jitter)
}

/// Sends the request, retrying 429/5xx and transport errors with backoff
pub async fn http_with_retry(
    request: RequestBuilder,
    max_retries: usize,
    backoff_ms: u64
) -> Result<serde_json::Value, ExtractorError> {
    let mut rng = SmallRng::from_entropy();
    let mut attempt = 0_usize;
    loop {
        let response = request.try_clone()
            .ok_or_else(|| ExtractorError::Http("non-cloneable request".to_string()))?
            .send()
            .await;
        match response {
            Ok(resp) => {
                if resp.status().is_success() {
                    let v = resp.json::<serde_json::Value>().await?;
                    return Ok(v);
                }
                let status = resp.status();
                let retryable = status.as_u16() == 429 || status.is_server_error();
                if !retryable || attempt >= max_retries {
                    return Err(ExtractorError::Http(
                        format!("status {} after {} retries", status, attempt)
                    ));
                }
                let backoff = generate_backoff(backoff_ms, attempt, &mut rng);
                warn!(status = %status, backoff = ?backoff.as_millis(), "http.retry");
                sleep(backoff).await;
                attempt += 1;
            },
            Err(e) => {
                if attempt >= max_retries {
                    return Err(e.into());
                }
                let backoff = generate_backoff(backoff_ms, attempt, &mut rng);
                warn!(backoff = ?backoff.as_millis(), "http.retry.error");
                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct SpotifyClient {
    pub http: Client,
    pub cfg: SpotifyConfig
}

impl SpotifyClient {
    pub fn new(http_config: &HttpConfig, cfg: &SpotifyConfig) ->
        Result<Self, ExtractorError> {

        let http = base_client(http_config)?;
        Ok( Self {
            http,
            cfg: cfg.clone()
        })
    }

    pub fn token_request(&self) -> RequestBuilder {
        self.http
            .post(self.cfg.token_url.clone())
            .basic_auth(&self.cfg.client_id, Some(&self.cfg.client_secret))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
    }

    /// GET /v1/playlists/{id}/tracks?limit=&additional_types=track
    pub fn playlist_items(&self, playlist_id: &str, limit: u32, bearer: &str) ->
        Result<RequestBuilder, ExtractorError> {
        let url = join(&self.cfg.api_base, &format!("playlists/{playlist_id}/tracks"))?;
        Ok(self.http.get(url).bearer_auth(bearer).query(&[
            ("limit", limit.to_string().as_str()),
            ("additional_types", "track"),
        ]))
    }

    /// GET {next}, the absolute url handed back by the previous page
    pub fn next_page(&self, next: &str, bearer: &str) -> Result<RequestBuilder, ExtractorError> {
        let url = Url::parse(next)
            .map_err(|e| ExtractorError::Parse(format!("next page url {next}: {e}")))?;
        Ok(self.http.get(url).bearer_auth(bearer))
    }

    /// GET /v1/audio-features/{id}
    pub fn audio_features(&self, track_id: &str, bearer: &str) ->
        Result<RequestBuilder, ExtractorError> {
        let url = join(&self.cfg.api_base, &format!("audio-features/{track_id}"))?;
        Ok(self.http.get(url).bearer_auth(bearer))
    }
}

#[derive(Clone, Debug)]
pub struct GeniusClient {
    pub http: Client,
    pub cfg: GeniusConfig
}

impl GeniusClient {
    pub fn new(http_cfg: &HttpConfig, cfg: &GeniusConfig) -> Result<Self, ExtractorError> {
        let http_cfg = HttpConfig { timeout: cfg.timeout, ..http_cfg.clone() };

        // song pages are html, so no json-only accept header here
        let http = client_with_headers(&http_cfg, header::HeaderMap::new())?;
        Ok( Self { http, cfg: cfg.clone() })
    }

    /// GET /search?q=...
    pub fn search(&self, query: &str) -> Result<RequestBuilder, ExtractorError> {
        let url = join(&self.cfg.api_base, "search")?;
        Ok(self.http.get(url)
            .bearer_auth(&self.cfg.access_token)
            .header(header::ACCEPT, "application/json")
            .query(&[("q", query)]))
    }

    /// GET https://genius.com/{song-path}, html
    pub fn song_page(&self, song_url: &str) -> Result<RequestBuilder, ExtractorError> {
        let url = Url::parse(song_url)
            .map_err(|e| ExtractorError::Parse(format!("song url {song_url}: {e}")))?;
        Ok(self.http.get(url))
    }
}
