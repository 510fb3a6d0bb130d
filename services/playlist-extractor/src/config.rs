//!
//! src/config.rs
//!
//! Environment driven configuration for every collaborator the
//! extractor talks to. Each concern is built by its own build_* function
//! and collected into AppConfig at program start.
//!

use url::Url;
use std::time;
use crate::errors::ExtractorError;

/// Constants for HTTP Config
pub const HTTP_TIMEOUT: u64 = 8000;
pub const HTTP_CONNECT_TIMEOUT: u64 = 2000;
pub const HTTP_POOL_MAX_IDLE: usize = 16;
pub const HTTP_POOL_IDLE_TIMEOUT: u64 = 90000;
pub const HTTP_MAX_REDIRECTS: u8 = 4;

pub const RETRY_MAX_ATTEMPTS: u8 = 3;
pub const RETRY_BASE_BACKOFF: u64 = 500;

/// Genius read timeout in seconds, reported back in timeout errors
pub const GENIUS_TIMEOUT_SECS: u64 = 5;

/// Wrapper over env::var to return an invalid enviroment var error
fn env_check(s: &str) -> Result<String, ExtractorError> {
    match std::env::var(s) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ExtractorError::Config(format!("{s} was not set"))),
    }
}

/// Same as env_check but accepts a legacy name as fallback
fn env_check_either(primary: &str, legacy: &str) -> Result<String, ExtractorError> {
    env_check(primary).or_else(|_| env_check(legacy))
        .map_err(|_| ExtractorError::Config(format!("{primary} was not set")))
}

fn env_or(s: &str, default: &str) -> String {
    match std::env::var(s) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default.to_string()
    }
}

/// Ensures that url is https
pub(crate) fn ensure_https(url: &Url) -> Result<(), String> {
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(format!("URL must be https: {url}"))
    }
}

pub(crate) fn ensure_host(url: &Url, expected_host: &str) -> Result<(), String> {
    match url.host_str() {
        Some(h) if h.eq_ignore_ascii_case(expected_host) => Ok(()),
        Some(h) => Err(
            format!("Unexpected host for {url} (got {h}, expected {expected_host})")
        ),
        None => Err(format!("URL missing host: {url}"))
    }
}

/// Url::join drops the last segment unless the base ends in '/'
pub(crate) fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let mut path = url.path().to_string();
        path.push('/');
        url.set_path(&path);
    }
    url
}

fn parse_api_url(var: &str, default: &str, host: &str) -> Result<Url, ExtractorError> {
    let raw = env_or(var, default);
    let url = Url::parse(&raw)
        .map_err(|e| ExtractorError::Config(format!("{var} invalid {e}")))?;

    ensure_https(&url).map_err(ExtractorError::Config)?;
    ensure_host(&url, host).map_err(ExtractorError::Config)?;
    Ok(url)
}

/// Configuration that Spotify expects when hitting endpoints
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: Url,
    pub api_base: Url,
}

pub fn build_spotify() -> Result<SpotifyConfig, ExtractorError> {
    let client_id     = env_check_either("SPOTIFY_CLIENT_ID", "SPOTIPY_CLIENT_ID")?;
    let client_secret = env_check_either("SPOTIFY_CLIENT_SECRET", "SPOTIPY_CLIENT_SECRET")?;

    let token_url = parse_api_url(
        "SPOTIFY_TOKEN_URL",
        "https://accounts.spotify.com/api/token",
        "accounts.spotify.com"
    )?;
    let api_base = parse_api_url(
        "SPOTIFY_API_BASE",
        "https://api.spotify.com/v1/",
        "api.spotify.com"
    )?;

    Ok( SpotifyConfig {
        client_id,
        client_secret,
        token_url,
        api_base: with_trailing_slash(api_base)
    })
}

///
/// Configuration for the genius lyrics api
///
#[derive(Debug, Clone)]
pub struct GeniusConfig {
    pub access_token: String,
    pub api_base: Url,
    pub timeout: time::Duration
}

fn build_genius() -> Result<GeniusConfig, ExtractorError> {
    let access_token = env_check_either("GENIUS_ACCESS_TOKEN", "GENIUS_ACESS")?;
    let api_base = parse_api_url("GENIUS_API_BASE", "https://api.genius.com/", "api.genius.com")?;

    Ok( GeniusConfig {
        access_token,
        api_base: with_trailing_slash(api_base),
        timeout: time::Duration::from_secs(GENIUS_TIMEOUT_SECS)
    })
}

///
/// Configuration for the audio downloader (yt-dlp)
///
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub binary: String,        // yt-dlp on PATH by default
    pub query_suffix: String,  // appended to every search query
    pub extension: String      // extension in the output template
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            query_suffix: " Lyrics".to_string(),
            extension: "mp3".to_string()
        }
    }
}

fn build_audio() -> AudioConfig {
    AudioConfig {
        binary: env_or("YT_DLP_BIN", "yt-dlp"),
        ..AudioConfig::default()
    }
}

///
/// Configuration for the remote object store
///
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub remote_base: Option<String>,  // S3_BUCKET, prefix of every remote audio path
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>
}

pub fn build_storage() -> StorageConfig {
    let optional = |s: &str| std::env::var(s).ok().filter(|v| !v.trim().is_empty());
    StorageConfig {
        remote_base: optional("S3_BUCKET"),
        endpoint: optional("AWS_ENDPOINT"),
        region: env_or("AWS_REGION", "us-east-1"),
        access_key: optional("AWS_ACCESS_KEY_ID"),
        secret_key: optional("AWS_SECRET_ACCESS_KEY")
    }
}

impl StorageConfig {
    /// Remote base path, required once we build remote audio paths
    pub fn require_remote_base(&self) -> Result<&str, ExtractorError> {
        self.remote_base.as_deref()
            .ok_or_else(|| ExtractorError::Config("S3_BUCKET was not set".to_string()))
    }
}

///
/// Configuration for Http timeouts, retries, etc.
///
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u8,
    pub base_backoff: time::Duration
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            base_backoff: time::Duration::from_millis(RETRY_BASE_BACKOFF)
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: time::Duration,
    pub connect_timeout: time::Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: time::Duration,
    pub max_redirects: u8,
    pub retry: RetryConfig
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: time::Duration::from_millis(HTTP_TIMEOUT),
            connect_timeout: time::Duration::from_millis(HTTP_CONNECT_TIMEOUT),
            pool_max_idle_per_host: HTTP_POOL_MAX_IDLE,
            pool_idle_timeout: time::Duration::from_millis(HTTP_POOL_IDLE_TIMEOUT),
            max_redirects: HTTP_MAX_REDIRECTS,
            retry: RetryConfig::default()
        }
    }
}

///
/// Configuration for Logger
///

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<LogFormat> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(LogFormat::Pretty),
            "json"   => Some(LogFormat::Json),
            _ => None
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter_directives: String,
    pub format: LogFormat,
    pub include_file_line: bool,
    pub include_target: bool
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter_directives: "info,playlist_extractor=debug,reqwest=warn".to_string(),
            format: LogFormat::Json,
            include_file_line: true,
            include_target: true
        }
    }
}

pub fn build_logging() -> LoggingConfig {
    let format = std::env::var("LOG_FORMAT").ok()
        .as_deref()
        .and_then(LogFormat::parse)
        .unwrap_or(LogFormat::Json);

    LoggingConfig { format, ..LoggingConfig::default() }
}

///
/// AppConfig which holds everything an extraction run needs
///
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub spotify: SpotifyConfig,
    pub genius: GeniusConfig,
    pub audio: AudioConfig,
    pub storage: StorageConfig,
    pub http: HttpConfig
}

///
/// Return all environment variables to caller at program start.
///
pub fn load_config() -> Result<AppConfig, ExtractorError> {
    dotenvy::dotenv().ok();

    let spotify = build_spotify()?;
    let genius  = build_genius()?;
    let audio   = build_audio();
    let storage = build_storage();
    let http    = HttpConfig::default();

    Ok( AppConfig { spotify, genius, audio, storage, http } )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_and_host_checks() {
        let good = Url::parse("https://api.spotify.com/v1/").unwrap();
        assert!(ensure_https(&good).is_ok());
        assert!(ensure_host(&good, "API.spotify.com").is_ok());

        let plain = Url::parse("http://api.spotify.com/v1/").unwrap();
        assert!(ensure_https(&plain).is_err());

        let other = Url::parse("https://example.com/").unwrap();
        let err = ensure_host(&other, "api.genius.com").unwrap_err();
        assert!(err.contains("expected api.genius.com"));
    }

    #[test]
    fn trailing_slash_is_enforced() {
        let url = with_trailing_slash(Url::parse("https://api.spotify.com/v1").unwrap());
        assert_eq!(url.as_str(), "https://api.spotify.com/v1/");
        assert_eq!(url.join("tracks").unwrap().as_str(), "https://api.spotify.com/v1/tracks");

        let same = with_trailing_slash(Url::parse("https://api.genius.com/").unwrap());
        assert_eq!(same.as_str(), "https://api.genius.com/");
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::parse("Pretty"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse(" json "), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn remote_base_is_required_for_paths() {
        let storage = StorageConfig {
            remote_base: None,
            endpoint: None,
            region: "us-east-1".to_string(),
            access_key: None,
            secret_key: None
        };
        assert!(matches!(storage.require_remote_base(), Err(ExtractorError::Config(_))));

        let storage = StorageConfig { remote_base: Some("s3://bucket/".into()), ..storage };
        assert_eq!(storage.require_remote_base().unwrap(), "s3://bucket/");
    }
}
