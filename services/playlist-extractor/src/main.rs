//!
//! src/main.rs
//!
//! Entry point of the playlist extractor. Parses the command line,
//! starts logging and dispatches to extract, join, upload or names.
//! Live test benches for the provider clients live at the bottom.
//!

mod config;
mod errors;
mod logging;
mod types;

mod fetch;
mod catalog;
mod paginate;
mod features;
mod lyrics;
mod audio;
mod remote;
mod extractor;
mod sink;
mod storage;

#[cfg(test)]
mod fakes;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::errors::ExtractorError;
use crate::extractor::{Clients, Extractor, ExtractorLimits, MAX_CHUNK_SIZE};
use crate::types::RunContext;

#[derive(Parser, Debug)]
#[command(name = "playlist-extractor", version, about = "Playlist track, feature, lyrics and audio extraction")]
struct Cli {
    #[command(subcommand)]
    command: Command
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract one playlist into a csv table, downloading audio on the way
    Extract {
        #[arg(long)]
        playlist: String,
        #[arg(long, default_value_t = MAX_CHUNK_SIZE,
              value_parser = clap::value_parser!(u32).range(1..=MAX_CHUNK_SIZE as i64))]
        chunk_size: u32,
        #[arg(long)]
        download_dir: PathBuf,
        #[arg(long)]
        run_id: Option<String>,
        #[arg(long)]
        output: PathBuf
    },
    /// Concatenate every csv table in a folder
    Join {
        #[arg(long)]
        csv_folder: PathBuf,
        #[arg(long)]
        out_path: PathBuf
    },
    /// Copy a local run directory to the remote store
    Upload {
        #[arg(long)]
        local_dir: PathBuf,
        #[arg(long)]
        remote_dir: String
    },
    /// Print "artist - title" for every playlist item
    Names {
        #[arg(long)]
        playlist: String,
        #[arg(long, default_value_t = MAX_CHUNK_SIZE,
              value_parser = clap::value_parser!(u32).range(1..=MAX_CHUNK_SIZE as i64))]
        chunk_size: u32
    }
}

fn build_extractor(cfgs: &config::AppConfig) -> Result<Extractor, ExtractorError> {
    let remote_base = cfgs.storage.require_remote_base()?;
    let limits = ExtractorLimits {
        query_suffix: cfgs.audio.query_suffix.clone(),
        ..ExtractorLimits::default()
    };
    Ok( Extractor::new(Clients::from_config(cfgs)?, &limits, remote_base) )
}

async fn extract(
    playlist: &str,
    chunk_size: u32,
    download_dir: PathBuf,
    run_id: Option<String>,
    output: PathBuf
) -> Result<(), ExtractorError> {
    let cfgs = config::load_config()?;
    let extractor = build_extractor(&cfgs)?;

    std::fs::create_dir_all(&download_dir)?;
    let run_id = run_id.unwrap_or_else(RunContext::default_run_id);
    let ctx = RunContext::new(run_id, &download_dir);

    let table = extractor.run(playlist, chunk_size, &ctx).await?;
    sink::write_table(&output, &table.rows)?;

    tracing::info!(
        run_id = %ctx.run_id(), output = %output.display(), rows = table.rows.len(),
        "extract.done"
    );
    Ok(())
}

async fn names(playlist: &str, chunk_size: u32) -> Result<(), ExtractorError> {
    let catalog = extractor::spotify_catalog(
        &config::build_spotify()?,
        &config::HttpConfig::default()
    )?;

    for (artist, title) in extractor::list_names(catalog.as_ref(), playlist, chunk_size).await? {
        match (artist, title) {
            (None, None) => println!("<removed>"),
            (artist, title) => println!(
                "{} - {}", artist.unwrap_or_default(), title.unwrap_or_default()
            )
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), ExtractorError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let _guard = logging::init_logging(&config::build_logging())?;

    tracing::info!(
        service="playlist-extractor",
        version=%env!("CARGO_PKG_VERSION"),
        "starting"
    );

    let result = match cli.command {
        Command::Extract { playlist, chunk_size, download_dir, run_id, output } =>
            extract(&playlist, chunk_size, download_dir, run_id, output).await,
        Command::Join { csv_folder, out_path } =>
            sink::join_csv(&csv_folder, &out_path).map(|_| ()),
        Command::Upload { local_dir, remote_dir } =>
            storage::upload(&local_dir, &remote_dir, &config::build_storage()).await,
        Command::Names { playlist, chunk_size } =>
            names(&playlist, chunk_size).await
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "failed");
    }
    result
}
