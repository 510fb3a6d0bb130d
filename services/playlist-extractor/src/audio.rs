//!
//! src/audio.rs
//!
//! Resolves a "title artist" query to the first video search hit and
//! downloads its audio stream by running the `yt-dlp` binary.
//!

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::AudioConfig;
use crate::errors::ExtractorError;

#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Downloads the first search result into dest_dir, None when nothing matched
    async fn download_best(&self, query: &str, dest_dir: &Path) ->
        Result<Option<PathBuf>, ExtractorError>;
}

pub struct YtDlp {
    binary: String,
    extension: String
}

impl YtDlp {
    pub fn new(cfg: &AudioConfig) -> Self {
        Self { binary: cfg.binary.clone(), extension: cfg.extension.clone() }
    }

    fn command(&self, query: &str, dest_dir: &Path) -> Command {
        let template = dest_dir.join(format!("%(title)s.{}", self.extension));

        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "--format", "bestaudio/best",
            "--no-playlist",
            "--no-check-certificates",
            "--geo-bypass",
            "--add-metadata",
            "--quiet",
            "--no-warnings",
            // print the final path but still download
            "--no-simulate",
            "--print", "after_move:filepath",
        ]);
        cmd.arg("--output").arg(template);
        cmd.arg(format!("ytsearch1:{query}"));
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd
    }
}

/// Last non-empty stdout line, the path yt-dlp printed
fn printed_path(stdout: &str) -> Option<PathBuf> {
    stdout.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(PathBuf::from)
}

#[async_trait]
impl MediaDownloader for YtDlp {
    async fn download_best(&self, query: &str, dest_dir: &Path) ->
        Result<Option<PathBuf>, ExtractorError> {
        let output = self.command(query, dest_dir)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound =>
                    ExtractorError::Provider(format!("{} not found in PATH", self.binary)),
                _ => ExtractorError::Provider(format!("{} failed to start: {e}", self.binary))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractorError::Provider(
                format!("yt-dlp failed: (status: {}) (stderr: {:?})", output.status, stderr.trim())
            ));
        }

        Ok(printed_path(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Search query for a track, stripped of characters that break file names
pub fn build_query(title_and_artist: &str, suffix: &str) -> String {
    format!("{title_and_artist}{suffix}")
        .replace(':', "")
        .replace('"', "")
}

pub struct AudioLocator {
    downloader: Arc<dyn MediaDownloader>,
    suffix: String
}

impl AudioLocator {
    pub fn new(downloader: Arc<dyn MediaDownloader>, suffix: impl Into<String>) -> Self {
        Self { downloader, suffix: suffix.into() }
    }

    /// Local file of the downloaded audio; errors are logged, never raised
    pub async fn locate(&self, query: &str, dest_dir: &Path) -> Option<PathBuf> {
        let query = build_query(query, &self.suffix);
        match self.downloader.download_best(&query, dest_dir).await {
            Ok(Some(path)) => {
                debug!(query = %query, path = %path.display(), "audio.downloaded");
                Some(path)
            }
            Ok(None) => {
                warn!(query = %query, "audio.not_found");
                None
            }
            Err(e) => {
                warn!(query = %query, error = %e, "audio.failed");
                None
            }
        }
    }
}
