//!
//! src/lyrics.rs
//!
//! Lyrics lookup by title and artist. A provider timeout that reports
//! its duration (`read timeout=<N>`) is waited out and retried once;
//! every other failure reads as "no lyrics".
//!

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::ExtractorError;
use crate::fetch::GeniusClient;

#[async_trait]
pub trait LyricsApi: Send + Sync {
    /// Best effort lyrics, None when no matching song exists
    async fn search_song(&self, title: &str, artist: &str) ->
        Result<Option<String>, ExtractorError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LyricsLookup {
    Found(String),
    NotFound,
    Failed(String)
}

impl LyricsLookup {
    fn from_answer(answer: Option<String>) -> Self {
        match answer {
            Some(text) if !text.trim().is_empty() => LyricsLookup::Found(text),
            _ => LyricsLookup::NotFound
        }
    }

    /// Text that goes into the record, "" unless found
    pub fn into_text(self) -> String {
        match self {
            LyricsLookup::Found(text) => text,
            LyricsLookup::NotFound | LyricsLookup::Failed(_) => String::new()
        }
    }
}

/// Seconds from a `read timeout=<N>` fragment of an error message
pub fn parse_timeout_secs(message: &str) -> Option<u64> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let re = PATTERN.get_or_init(|| Regex::new(r"read timeout=(\d+)").ok()).as_ref()?;
    re.captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub struct LyricsFetcher {
    api: Arc<dyn LyricsApi>,
    delay: Duration
}

impl LyricsFetcher {
    pub fn new(api: Arc<dyn LyricsApi>, delay: Duration) -> Self {
        Self { api, delay }
    }

    pub async fn fetch(&self, title: &str, artist: &str) -> LyricsLookup {
        // lyrics api rate limit
        sleep(self.delay).await;

        match self.api.search_song(title, artist).await {
            Ok(answer) => LyricsLookup::from_answer(answer),
            Err(ExtractorError::Timeout(message)) => {
                match parse_timeout_secs(&message) {
                    Some(secs) => {
                        warn!(track = %title, artist = %artist, wait_secs = secs, "lyrics.retry");
                        sleep(Duration::from_secs(secs)).await;
                        self.retry(title, artist).await
                    }
                    None => {
                        warn!(track = %title, artist = %artist, error = %message,
                            "lyrics.timeout.unparsed");
                        LyricsLookup::Failed(message)
                    }
                }
            }
            Err(e) => {
                warn!(track = %title, artist = %artist, error = %e, "lyrics.failed");
                LyricsLookup::Failed(e.to_string())
            }
        }
    }

    async fn retry(&self, title: &str, artist: &str) -> LyricsLookup {
        match self.api.search_song(title, artist).await {
            Ok(answer) => LyricsLookup::from_answer(answer),
            Err(e) => {
                warn!(track = %title, artist = %artist, error = %e, "lyrics.retry.failed");
                LyricsLookup::Failed(e.to_string())
            }
        }
    }
}

/// Lowercase alphanumerics only, so "Don't Stop" matches "Dont stop"
fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn loosely_equal(a: &str, b: &str) -> bool {
    let (a, b) = (normalize(a), normalize(b));
    !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a))
}

/// Url of the first song hit whose title and primary artist match
pub fn pick_song_url(search: &serde_json::Value, title: &str, artist: &str) -> Option<String> {
    search.pointer("/response/hits")?
        .as_array()?
        .iter()
        .filter(|hit| hit.get("type").and_then(|v| v.as_str()) == Some("song"))
        .filter_map(|hit| hit.get("result"))
        .find(|result| {
            let hit_title = result.get("title").and_then(|v| v.as_str()).unwrap_or("");
            let hit_artist = result.pointer("/primary_artist/name")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            loosely_equal(hit_title, title) && loosely_equal(hit_artist, artist)
        })
        .and_then(|result| result.get("url"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(inner) = ElementRef::wrap(child) {
            if inner.value().name() == "br" {
                out.push('\n');
            } else {
                collect_text(inner, out);
            }
        }
    }
}

/// Lyrics text of a genius song page
pub fn extract_lyrics(html: &str) -> Result<Option<String>, ExtractorError> {
    let selector = Selector::parse(r#"div[data-lyrics-container="true"]"#)
        .map_err(|e| ExtractorError::Parse(format!("lyrics selector: {e:?}")))?;
    let document = Html::parse_document(html);

    let blocks: Vec<String> = document.select(&selector)
        .map(|block| {
            let mut text = String::new();
            collect_text(block, &mut text);
            text.trim().to_string()
        })
        .filter(|text| !text.is_empty())
        .collect();

    if blocks.is_empty() {
        Ok(None)
    } else {
        Ok(Some(blocks.join("\n")))
    }
}

pub struct GeniusLyrics {
    client: GeniusClient
}

impl GeniusLyrics {
    pub fn new(client: GeniusClient) -> Self {
        Self { client }
    }

    /// Timeouts carry the configured read timeout so the fetcher can wait it out
    fn map_err(&self, e: reqwest::Error) -> ExtractorError {
        if e.is_timeout() {
            ExtractorError::Timeout(
                format!("{e} (read timeout={})", self.client.cfg.timeout.as_secs())
            )
        } else {
            e.into()
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ExtractorError> {
        let resp = request.send().await.map_err(|e| self.map_err(e))?;
        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(ExtractorError::RateLimited("genius".into()));
        }
        resp.error_for_status().map_err(|e| self.map_err(e))
    }
}

#[async_trait]
impl LyricsApi for GeniusLyrics {
    async fn search_song(&self, title: &str, artist: &str) ->
        Result<Option<String>, ExtractorError> {
        let search: serde_json::Value = self.send(self.client.search(&format!("{title} {artist}"))?)
            .await?
            .json()
            .await
            .map_err(|e| self.map_err(e))?;

        let Some(url) = pick_song_url(&search, title, artist) else {
            debug!(track = %title, artist = %artist, "lyrics.no_match");
            return Ok(None);
        };

        let html = self.send(self.client.song_page(&url)?)
            .await?
            .text()
            .await
            .map_err(|e| self.map_err(e))?;
        extract_lyrics(&html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeLyrics;

    fn fetcher(api: Arc<FakeLyrics>) -> LyricsFetcher {
        LyricsFetcher::new(api, Duration::from_millis(50))
    }

    #[test]
    fn timeout_seconds_from_message() {
        assert_eq!(parse_timeout_secs("HTTPSConnectionPool: Read timed out. (read timeout=7)"), Some(7));
        assert_eq!(parse_timeout_secs("read timeout=15"), Some(15));
        assert_eq!(parse_timeout_secs("connect timeout"), None);
        assert_eq!(parse_timeout_secs("read timeout=abc"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_empty_string() {
        let api = Arc::new(FakeLyrics::default().then(Ok(None)));
        let lookup = fetcher(api.clone()).fetch("Song A", "Artist A").await;

        assert_eq!(lookup, LyricsLookup::NotFound);
        assert_eq!(lookup.into_text(), "");
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_with_duration_sleeps_then_retries_once() {
        let api = Arc::new(FakeLyrics::default()
            .then(Err(ExtractorError::Timeout("Read timed out. (read timeout=7)".into())))
            .then(Ok(Some("verse".into()))));

        let start = tokio::time::Instant::now();
        let lookup = fetcher(api.clone()).fetch("Song A", "Artist A").await;
        let waited = start.elapsed();

        assert_eq!(lookup, LyricsLookup::Found("verse".into()));
        assert!(waited >= Duration::from_secs(7));
        assert!(waited < Duration::from_secs(8));

        let calls = api.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
        assert_eq!(calls[1], ("Song A".to_string(), "Artist A".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn second_timeout_is_not_retried_again() {
        let api = Arc::new(FakeLyrics::default()
            .then(Err(ExtractorError::Timeout("read timeout=2".into())))
            .then(Err(ExtractorError::Timeout("read timeout=2".into()))));

        let lookup = fetcher(api.clone()).fetch("Song A", "Artist A").await;
        assert!(matches!(lookup, LyricsLookup::Failed(_)));
        assert_eq!(lookup.into_text(), "");
        assert_eq!(api.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unparsed_timeout_gives_empty_without_retry() {
        let api = Arc::new(FakeLyrics::default()
            .then(Err(ExtractorError::Timeout("operation timed out".into()))));

        let lookup = fetcher(api.clone()).fetch("Song A", "Artist A").await;
        assert!(matches!(lookup, LyricsLookup::Failed(_)));
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_absorbed() {
        let api = Arc::new(FakeLyrics::default()
            .then(Err(ExtractorError::Http("status 500".into()))));

        let lookup = fetcher(api.clone()).fetch("Song A", "Artist A").await;
        assert_eq!(lookup, LyricsLookup::Failed("http error: status 500".into()));
        assert_eq!(lookup.into_text(), "");
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test]
    async fn genius_timeout_reports_its_duration() {
        // accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let silent = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let cfg = crate::config::GeniusConfig {
            access_token: "g".into(),
            api_base: url::Url::parse(&format!("http://{addr}/")).unwrap(),
            timeout: Duration::from_secs(1)
        };
        let client = GeniusClient::new(&crate::config::HttpConfig::default(), &cfg).unwrap();
        let err = GeniusLyrics::new(client)
            .search_song("Song A", "Artist A")
            .await
            .unwrap_err();
        silent.abort();

        let ExtractorError::Timeout(message) = err else {
            panic!("expected a timeout, got {err:?}");
        };
        assert!(message.contains("read timeout=1"), "{message}");
        assert_eq!(parse_timeout_secs(&message), Some(1));
    }

    #[test]
    fn picks_matching_song_hit() {
        let search = serde_json::json!({
            "response": { "hits": [
                { "type": "artist", "result": { "title": "Song A", "url": "https://genius.com/wrong" } },
                { "type": "song", "result": {
                    "title": "Song A (Remix)",
                    "primary_artist": { "name": "Someone Else" },
                    "url": "https://genius.com/other" } },
                { "type": "song", "result": {
                    "title": "Song A",
                    "primary_artist": { "name": "Artist A" },
                    "url": "https://genius.com/Artist-a-song-a-lyrics" } }
            ]}
        });
        assert_eq!(
            pick_song_url(&search, "Song A", "artist a").as_deref(),
            Some("https://genius.com/Artist-a-song-a-lyrics")
        );
        assert_eq!(pick_song_url(&search, "Other Song", "Artist A"), None);
        assert_eq!(pick_song_url(&serde_json::json!({}), "Song A", "Artist A"), None);
    }

    #[test]
    fn extracts_lyrics_blocks() {
        let html = r##"
            <html><body>
              <div data-lyrics-container="true">[Verse 1]<br>First line<br><a href="#"><span>Second line</span></a></div>
              <div class="ad">buy now</div>
              <div data-lyrics-container="true">[Chorus]<br>Hook</div>
            </body></html>"##;
        let lyrics = extract_lyrics(html).unwrap().unwrap();
        assert_eq!(lyrics, "[Verse 1]\nFirst line\nSecond line\n[Chorus]\nHook");

        assert_eq!(extract_lyrics("<html><body>nothing</body></html>").unwrap(), None);
    }
}
