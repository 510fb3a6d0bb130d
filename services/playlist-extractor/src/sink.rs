//!
//! src/sink.rs
//!
//! CSV output of an extraction run and concatenation of several run
//! tables into one. Files are written to a temp file beside the target
//! and persisted once complete.
//!

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::errors::ExtractorError;
use crate::types::TrackRecord;

fn create_parent(path: &Path) -> Result<PathBuf, ExtractorError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from(".")
    };
    fs::create_dir_all(&parent).map_err(|e| ExtractorError::Io(
        std::io::Error::new(e.kind(), format!("create dir {}: {e}", parent.display()))
    ))?;
    Ok(parent)
}

fn persist(temp: NamedTempFile, path: &Path) -> Result<(), ExtractorError> {
    temp.persist(path).map_err(|e| ExtractorError::Io(
        std::io::Error::new(e.error.kind(), format!("persist {}: {}", path.display(), e.error))
    ))?;
    Ok(())
}

/// Writes one header row then one row per record, in order
pub fn write_table(path: &Path, records: &[TrackRecord]) -> Result<(), ExtractorError> {
    let parent = create_parent(path)?;
    let temp = NamedTempFile::new_in(&parent)?;

    {
        let mut writer = csv::Writer::from_writer(temp.as_file());
        writer.write_record(TrackRecord::header())?;
        for record in records {
            writer.write_record(record.to_row())?;
        }
        writer.flush()?;
    }

    persist(temp, path)?;
    info!(path = %path.display(), rows = records.len(), "sink.written");
    Ok(())
}

/// `*.csv` files directly inside `folder`, sorted by name
fn csv_files(folder: &Path) -> Result<Vec<PathBuf>, ExtractorError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        let is_csv = path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Concatenates every table in `folder` under a single header.
/// All inputs must share the first file's header.
pub fn join_csv(folder: &Path, out_path: &Path) -> Result<usize, ExtractorError> {
    let files = csv_files(folder)?;
    if files.is_empty() {
        return Err(ExtractorError::NotFound(
            format!("no csv files in {}", folder.display())
        ));
    }

    let parent = create_parent(out_path)?;
    let temp = NamedTempFile::new_in(&parent)?;
    let mut rows = 0usize;

    {
        let mut writer = csv::Writer::from_writer(temp.as_file());
        let mut header: Option<csv::StringRecord> = None;

        for file in &files {
            // the output may live inside the folder being joined
            if fs::canonicalize(file).ok() == fs::canonicalize(out_path).ok() {
                continue;
            }

            let mut reader = csv::Reader::from_path(file)?;
            let current = reader.headers()?.clone();
            match &header {
                None => {
                    writer.write_record(&current)?;
                    header = Some(current);
                }
                Some(expected) if *expected != current => {
                    return Err(ExtractorError::Parse(
                        format!("header of {} does not match", file.display())
                    ));
                }
                Some(_) => {}
            }

            let mut count = 0usize;
            for record in reader.records() {
                writer.write_record(&record?)?;
                count += 1;
            }
            debug!(file = %file.display(), rows = count, "sink.joined_file");
            rows += count;
        }
        writer.flush()?;
    }

    persist(temp, out_path)?;
    info!(out = %out_path.display(), files = files.len(), rows, "sink.joined");
    Ok(rows)
}
