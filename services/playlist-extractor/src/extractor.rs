//!
//! src/extractor.rs
//!
//! Defines the extractor: one record per unique playlist track, built
//! from catalog features, lyrics and a downloaded audio file. Items are
//! processed one at a time in page order.
//!

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::audio::{AudioLocator, MediaDownloader, YtDlp};
use crate::catalog::{parse_playlist_id, CatalogApi, SpotifyCatalog};
use crate::config::{AppConfig, HttpConfig, SpotifyConfig};
use crate::errors::ExtractorError;
use crate::features::FeatureFetcher;
use crate::fetch::{GeniusClient, SpotifyClient};
use crate::lyrics::{GeniusLyrics, LyricsApi, LyricsFetcher};
use crate::paginate;
use crate::remote::remote_audio_path;
use crate::types::{AudioFeatures, PlaylistItem, RunContext, TrackRecord};

/// Largest page the catalog hands out
pub const MAX_CHUNK_SIZE: u32 = 100;

#[derive(Clone, Debug)]
pub struct ExtractorLimits {
    pub feature_delay_ms: u64,
    pub lyrics_delay_ms: u64,
    pub query_suffix: String
}

impl Default for ExtractorLimits {
    fn default() -> Self {
        Self {
            feature_delay_ms: 50,
            lyrics_delay_ms: 50,
            query_suffix: " Lyrics".to_string()
        }
    }
}

/// Provider clients, built once at run start and dropped with the run
#[derive(Clone)]
pub struct Clients {
    pub catalog: Arc<dyn CatalogApi>,
    pub lyrics: Arc<dyn LyricsApi>,
    pub media: Arc<dyn MediaDownloader>
}

impl Clients {
    pub fn new(
        catalog: Arc<dyn CatalogApi>,
        lyrics: Arc<dyn LyricsApi>,
        media: Arc<dyn MediaDownloader>
    ) -> Self {
        Self { catalog, lyrics, media }
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, ExtractorError> {
        let genius = GeniusClient::new(&cfg.http, &cfg.genius)?;

        Ok( Self::new(
            spotify_catalog(&cfg.spotify, &cfg.http)?,
            Arc::new(GeniusLyrics::new(genius)),
            Arc::new(YtDlp::new(&cfg.audio))
        ))
    }
}

/// Catalog client on its own, for listings that need nothing else
pub fn spotify_catalog(spotify: &SpotifyConfig, http: &HttpConfig) ->
    Result<Arc<dyn CatalogApi>, ExtractorError> {
    let client = SpotifyClient::new(http, spotify)?;
    Ok( Arc::new(SpotifyCatalog::new(client, http.retry.clone())) )
}

/// Every item of a playlist, first page through last
async fn playlist_items(catalog: &dyn CatalogApi, reference: &str, chunk_size: u32) ->
    Result<Vec<PlaylistItem>, ExtractorError> {
    let playlist_id = parse_playlist_id(reference)?;
    let limit = chunk_size.clamp(1, MAX_CHUNK_SIZE);
    let first = catalog.playlist_items(&playlist_id, limit).await?;
    paginate::fetch_all(catalog, first).await
}

/// (artist, title) of every item; removed tracks give (None, None).
/// Only the catalog is called.
pub async fn list_names(catalog: &dyn CatalogApi, reference: &str, chunk_size: u32) ->
    Result<Vec<(Option<String>, Option<String>)>, ExtractorError> {
    let items = playlist_items(catalog, reference, chunk_size).await?;
    Ok(items.iter()
        .map(|item| match item.track.as_ref() {
            Some(t) => (t.first_artist().map(str::to_string), t.name.clone()),
            None => (None, None)
        })
        .collect())
}

/// Track ids already handled in this run
#[derive(Debug, Default)]
pub struct SeenTracks(HashSet<String>);

impl SeenTracks {
    /// false if the id was seen before
    pub fn insert(&mut self, track_id: &str) -> bool {
        self.0.insert(track_id.to_string())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub items: usize,
    pub removed: usize,
    pub duplicates: usize,
    pub records: usize,
    pub dropped_empty: usize,
    pub with_lyrics: usize,
    pub without_lyrics: usize,
    pub with_audio: usize
}

#[derive(Debug, Clone, Default)]
pub struct PlaylistTable {
    pub rows: Vec<TrackRecord>,
    pub summary: RunSummary
}

pub struct Extractor {
    catalog: Arc<dyn CatalogApi>,
    features: FeatureFetcher,
    lyrics: LyricsFetcher,
    audio: AudioLocator,
    remote_base: String
}

impl Extractor {
    pub fn new(clients: Clients, limits: &ExtractorLimits, remote_base: impl Into<String>) -> Self {
        Self {
            features: FeatureFetcher::new(
                clients.catalog.clone(),
                Duration::from_millis(limits.feature_delay_ms)
            ),
            lyrics: LyricsFetcher::new(
                clients.lyrics,
                Duration::from_millis(limits.lyrics_delay_ms)
            ),
            audio: AudioLocator::new(clients.media, limits.query_suffix.clone()),
            catalog: clients.catalog,
            remote_base: remote_base.into()
        }
    }

    /// Record for one playlist item, None for a removed track
    pub async fn aggregate_track(&self, item: &PlaylistItem, ctx: &RunContext) ->
        Option<TrackRecord> {
        let track = item.track.as_ref()?;

        let track_id    = track.id.clone();
        let track_name  = track.name.clone();
        let artist_name = track.first_artist().map(str::to_string);

        if track_id.is_none() || track_name.is_none() || artist_name.is_none() {
            warn!(
                track_id = ?track_id, track = ?track_name, artist = ?artist_name,
                "track.malformed"
            );
        }

        let features = match track_id.as_deref() {
            Some(id) => self.features.fetch(id).await,
            None => AudioFeatures::default()
        };

        let artist = artist_name.as_deref().unwrap_or_default();
        let (lyrics, local_audio_path) = match track_name.as_deref() {
            Some(name) => {
                let lyrics = self.lyrics.fetch(name, artist).await.into_text();
                let query = format!("{name} {artist}");
                let local = self.audio.locate(query.trim(), ctx.download_dir()).await;
                (lyrics, local)
            }
            None => (String::new(), None)
        };

        let local = local_audio_path.as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let remote_audio_path = remote_audio_path(&local, &self.remote_base, ctx.run_id());

        debug!(
            track_id = ?track_id, track = ?track_name,
            lyrics = !lyrics.is_empty(), audio = !local.is_empty(),
            "track.done"
        );

        Some( TrackRecord {
            track_id,
            track_name,
            artist_name,
            lyrics,
            features,
            local_audio_path,
            remote_audio_path
        })
    }

    /// Aggregates an item sequence, skipping repeats of ids in `seen`
    pub async fn collect(
        &self,
        items: &[PlaylistItem],
        ctx: &RunContext,
        seen: &mut SeenTracks
    ) -> PlaylistTable {
        let mut summary = RunSummary::default();
        let mut rows = Vec::new();

        for item in items {
            summary.items += 1;
            let Some(track) = item.track.as_ref() else {
                summary.removed += 1;
                debug!(position = summary.items, "track.removed");
                continue;
            };

            if let Some(id) = track.id.as_deref() {
                if !seen.insert(id) {
                    summary.duplicates += 1;
                    warn!(
                        track = track.name.as_deref().unwrap_or_default(),
                        artist = track.first_artist().unwrap_or_default(),
                        track_id = %id,
                        "track.duplicate"
                    );
                    continue;
                }
            }

            if let Some(record) = self.aggregate_track(item, ctx).await {
                rows.push(record);
            }
        }

        let before = rows.len();
        rows.retain(|r| !r.is_empty());
        summary.dropped_empty = before - rows.len();
        summary.records = rows.len();
        summary.with_lyrics = rows.iter().filter(|r| !r.lyrics.is_empty()).count();
        summary.without_lyrics = summary.records - summary.with_lyrics;
        summary.with_audio = rows.iter().filter(|r| r.local_audio_path.is_some()).count();

        PlaylistTable { rows, summary }
    }

    /// Full extraction of one playlist with a fresh dedup set
    pub async fn run(&self, reference: &str, chunk_size: u32, ctx: &RunContext) ->
        Result<PlaylistTable, ExtractorError> {
        info!(playlist = %reference, run_id = %ctx.run_id(), chunk_size, "extract.start");

        let items = playlist_items(self.catalog.as_ref(), reference, chunk_size).await?;
        let mut seen = SeenTracks::default();
        let table = self.collect(&items, ctx, &mut seen).await;

        let s = &table.summary;
        info!(
            items = s.items, removed = s.removed, duplicates = s.duplicates,
            records = s.records, dropped_empty = s.dropped_empty,
            with_lyrics = s.with_lyrics, without_lyrics = s.without_lyrics,
            with_audio = s.with_audio, unique = seen.len(),
            "extract.summary"
        );
        Ok(table)
    }
}
