//!
//! src/remote.rs
//!
//! Maps a downloaded file to the path it will have once the run
//! directory is uploaded: <base>/<run_id>/mp3/<file name>
//!

/// File name of a path written with either separator convention
pub fn file_name(local_path: &str) -> &str {
    local_path.rsplit(['/', '\\']).next().unwrap_or(local_path)
}

/// Remote path for a local download, "" when there is no local file
pub fn remote_audio_path(local_path: &str, remote_base: &str, run_id: &str) -> String {
    let name = file_name(local_path);
    if local_path.is_empty() || name.is_empty() {
        return String::new();
    }
    format!("{}/{run_id}/mp3/{name}", remote_base.trim_end_matches('/'))
}
