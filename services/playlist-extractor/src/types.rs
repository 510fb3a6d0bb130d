//!
//! src/types.rs
//!
//! Wire types of the catalog listing, the feature vector and the
//! output record of one track.
//!

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

/// One page of a playlist listing as the catalog returns it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemPage {
    #[serde(default, deserialize_with = "nullable_items")]
    pub items: Vec<PlaylistItem>,
    #[serde(default)]
    pub next: Option<String>
}

// a null entry in `items` is a removed track, same as `{"track": null}`
fn nullable_items<'de, D>(d: D) -> Result<Vec<PlaylistItem>, D::Error>
where
    D: Deserializer<'de>
{
    let raw: Option<Vec<Option<PlaylistItem>>> = Option::deserialize(d)?;
    Ok(raw.unwrap_or_default()
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistItem {
    #[serde(default)]
    pub track: Option<Track>
}

#[cfg(test)]
impl PlaylistItem {
    pub fn of(track: Track) -> Self {
        Self { track: Some(track) }
    }

    pub fn removed() -> Self {
        Self { track: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub artists: Vec<Artist>
}

impl Track {
    pub fn first_artist(&self) -> Option<&str> {
        self.artists.first().and_then(|a| a.name.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Artist {
    #[serde(default)]
    pub name: Option<String>
}

pub const FEATURE_NAMES: [&str; 13] = [
    "danceability",
    "energy",
    "key",
    "loudness",
    "mode",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "valence",
    "tempo",
    "duration_ms",
    "time_signature",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureValue {
    Int(i64),
    Float(f64)
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Int(v)   => write!(f, "{v}"),
            FeatureValue::Float(v) => write!(f, "{v}")
        }
    }
}

/// Audio attributes of one track. Default is the all-null vector used
/// whenever the provider call fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub danceability: Option<f64>,
    pub energy: Option<f64>,
    pub key: Option<i64>,
    pub loudness: Option<f64>,
    pub mode: Option<i64>,
    pub speechiness: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub liveness: Option<f64>,
    pub valence: Option<f64>,
    pub tempo: Option<f64>,
    pub duration_ms: Option<i64>,
    pub time_signature: Option<i64>
}

impl AudioFeatures {
    /// Feature name to value, in FEATURE_NAMES order
    pub fn entries(&self) -> [(&'static str, Option<FeatureValue>); 13] {
        let f = |v: Option<f64>| v.map(FeatureValue::Float);
        let i = |v: Option<i64>| v.map(FeatureValue::Int);
        [
            (FEATURE_NAMES[0],  f(self.danceability)),
            (FEATURE_NAMES[1],  f(self.energy)),
            (FEATURE_NAMES[2],  i(self.key)),
            (FEATURE_NAMES[3],  f(self.loudness)),
            (FEATURE_NAMES[4],  i(self.mode)),
            (FEATURE_NAMES[5],  f(self.speechiness)),
            (FEATURE_NAMES[6],  f(self.acousticness)),
            (FEATURE_NAMES[7],  f(self.instrumentalness)),
            (FEATURE_NAMES[8],  f(self.liveness)),
            (FEATURE_NAMES[9],  f(self.valence)),
            (FEATURE_NAMES[10], f(self.tempo)),
            (FEATURE_NAMES[11], i(self.duration_ms)),
            (FEATURE_NAMES[12], i(self.time_signature)),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.entries().iter().all(|(_, v)| v.is_none())
    }

    pub fn is_complete(&self) -> bool {
        self.entries().iter().all(|(_, v)| v.is_some())
    }
}

/// Output row for a single track
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackRecord {
    pub track_id: Option<String>,
    pub track_name: Option<String>,
    pub artist_name: Option<String>,
    pub lyrics: String,
    pub features: AudioFeatures,
    pub local_audio_path: Option<PathBuf>,
    pub remote_audio_path: String
}

impl TrackRecord {
    pub fn header() -> Vec<&'static str> {
        let mut header = vec!["track_name", "artist_name", "track_id", "lyrics"];
        header.extend(FEATURE_NAMES);
        header.push("s3_mp3_path");
        header
    }

    /// Row in header() order, absent values as empty fields
    pub fn to_row(&self) -> Vec<String> {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        let mut row = vec![
            text(&self.track_name),
            text(&self.artist_name),
            text(&self.track_id),
            self.lyrics.clone(),
        ];
        row.extend(self.features.entries()
            .iter()
            .map(|(_, v)| v.map(|v| v.to_string()).unwrap_or_default()));
        row.push(self.remote_audio_path.clone());
        row
    }

    /// True when no field carries any data
    pub fn is_empty(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, str::is_empty);
        blank(&self.track_id)
            && blank(&self.track_name)
            && blank(&self.artist_name)
            && self.lyrics.is_empty()
            && self.features.is_empty()
            && self.local_audio_path.is_none()
            && self.remote_audio_path.is_empty()
    }
}

/// Identity of one pipeline invocation, fixed once the run starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    run_id: String,
    download_dir: PathBuf
}

impl RunContext {
    pub fn new(run_id: impl Into<String>, download_dir: impl AsRef<Path>) -> Self {
        Self {
            run_id: run_id.into(),
            download_dir: download_dir.as_ref().to_path_buf()
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Scheduler style `ts_nodash` stamp, used when no run id is given
    pub fn default_run_id() -> String {
        chrono::Utc::now().format("%Y%m%dT%H%M%S").to_string()
    }
}
