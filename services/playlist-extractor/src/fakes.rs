//!
//! src/fakes.rs
//!
//! In-memory collaborators for unit tests. Every fake records its
//! calls so tests can assert which network calls would have been made.
//!

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::audio::MediaDownloader;
use crate::catalog::CatalogApi;
use crate::errors::ExtractorError;
use crate::lyrics::LyricsApi;
use crate::types::{Artist, AudioFeatures, ItemPage, PlaylistItem, Track};

pub fn track(id: &str, name: &str, artist: &str) -> Track {
    Track {
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        artists: vec![Artist { name: Some(artist.to_string()) }]
    }
}

pub fn full_features() -> AudioFeatures {
    AudioFeatures {
        danceability: Some(0.73),
        energy: Some(0.58),
        key: Some(5),
        loudness: Some(-11.8),
        mode: Some(1),
        speechiness: Some(0.05),
        acousticness: Some(0.51),
        instrumentalness: Some(0.09),
        liveness: Some(0.16),
        valence: Some(0.62),
        tempo: Some(98.0),
        duration_ms: Some(255_349),
        time_signature: Some(4)
    }
}

#[derive(Default)]
pub struct FakeCatalog {
    pages: Vec<Vec<Option<Track>>>,
    failing_page: Option<usize>,
    failing_features: HashSet<String>,
    calls: Mutex<Vec<String>>
}

impl FakeCatalog {
    pub fn with_pages(pages: Vec<Vec<Option<Track>>>) -> Self {
        Self { pages, ..Self::default() }
    }

    pub fn failing_page(mut self, index: usize) -> Self {
        self.failing_page = Some(index);
        self
    }

    pub fn failing_features(mut self, track_id: &str) -> Self {
        self.failing_features.insert(track_id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn next_page_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("next_page:")).count()
    }

    pub fn feature_calls(&self) -> Vec<String> {
        self.calls().iter()
            .filter_map(|c| c.strip_prefix("audio_features:").map(str::to_string))
            .collect()
    }

    fn page(&self, index: usize) -> Result<ItemPage, ExtractorError> {
        if self.failing_page == Some(index) {
            return Err(ExtractorError::Http(format!("page {index} unavailable")));
        }
        let items = self.pages.get(index)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.map_or_else(PlaylistItem::removed, PlaylistItem::of))
            .collect();
        let next = (index + 1 < self.pages.len()).then(|| format!("fake://page/{}", index + 1));
        Ok( ItemPage { items, next } )
    }
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn playlist_items(&self, playlist_id: &str, _limit: u32) ->
        Result<ItemPage, ExtractorError> {
        self.calls.lock().unwrap().push(format!("playlist_items:{playlist_id}"));
        self.page(0)
    }

    async fn next_page(&self, next: &str) -> Result<ItemPage, ExtractorError> {
        self.calls.lock().unwrap().push(format!("next_page:{next}"));
        let index = next.trim_start_matches("fake://page/")
            .parse::<usize>()
            .map_err(|e| ExtractorError::Parse(e.to_string()))?;
        self.page(index)
    }

    async fn audio_features(&self, track_id: &str) ->
        Result<Option<AudioFeatures>, ExtractorError> {
        self.calls.lock().unwrap().push(format!("audio_features:{track_id}"));
        if self.failing_features.contains(track_id) {
            return Err(ExtractorError::RateLimited("30".into()));
        }
        Ok(Some(full_features()))
    }
}

/// Answers from a script first, then with "lyrics of <title>"
#[derive(Default)]
pub struct FakeLyrics {
    script: Mutex<VecDeque<Result<Option<String>, ExtractorError>>>,
    calls: Mutex<Vec<(String, String)>>
}

impl FakeLyrics {
    pub fn then(self, answer: Result<Option<String>, ExtractorError>) -> Self {
        self.script.lock().unwrap().push_back(answer);
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LyricsApi for FakeLyrics {
    async fn search_song(&self, title: &str, artist: &str) ->
        Result<Option<String>, ExtractorError> {
        self.calls.lock().unwrap().push((title.to_string(), artist.to_string()));
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(Some(format!("lyrics of {title}"))))
    }
}

#[derive(Default)]
pub struct FakeDownloader {
    not_found: bool,
    failing: bool,
    calls: Mutex<Vec<(String, PathBuf)>>
}

impl FakeDownloader {
    pub fn not_found() -> Self {
        Self { not_found: true, ..Self::default() }
    }

    pub fn failing() -> Self {
        Self { failing: true, ..Self::default() }
    }

    pub fn calls(&self) -> Vec<(String, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaDownloader for FakeDownloader {
    async fn download_best(&self, query: &str, dest_dir: &Path) ->
        Result<Option<PathBuf>, ExtractorError> {
        self.calls.lock().unwrap().push((query.to_string(), dest_dir.to_path_buf()));
        if self.failing {
            return Err(ExtractorError::Provider("yt-dlp exited with 1".into()));
        }
        if self.not_found {
            return Ok(None);
        }
        let title = query.trim_end_matches(" Lyrics");
        Ok(Some(dest_dir.join(format!("{title}.mp3"))))
    }
}
