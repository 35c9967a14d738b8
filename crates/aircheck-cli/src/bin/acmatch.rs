//! acmatch - recognize a query recording against the store
//!
//! Usage:
//!   acmatch <query_audio>
//!   acmatch --config <path> --song-id 3 --song-id 7 <query_audio>

use anyhow::Result;
use clap::Parser;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use aircheck_cli::output::{print_json_chunks, print_json_report};
use aircheck_core::{AppConfig, Engine, PgIndex, RecognizeOptions};

#[derive(Parser, Debug)]
#[command(name = "acmatch")]
#[command(about = "Recognize segments of a query recording", long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, default_value = "aircheck.toml")]
    config: String,

    /// Query audio file
    query: String,

    /// Restrict matching to these song ids (repeatable)
    #[arg(long = "song-id")]
    song_ids: Vec<i32>,

    /// Override the configured detection threshold
    #[arg(long)]
    threshold: Option<f64>,

    /// Override the configured timeline bin width in seconds
    #[arg(long)]
    bin_seconds: Option<f64>,

    /// Also print the per-chunk detections
    #[arg(long)]
    chunks: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Warn)
            .init();
    }

    let query_path = Path::new(&args.query);
    if !query_path.exists() {
        anyhow::bail!("query file not found: {}", query_path.display());
    }

    let config = AppConfig::load(Path::new(&args.config))?;
    let index = PgIndex::connect(&config.store, config.engine.lookup_batch_size).await?;
    let engine = Engine::with_spectral_extractor(
        config.engine.clone(),
        config.extractor.clone(),
        Arc::new(index),
    )?;

    let options = RecognizeOptions {
        song_filter: if args.song_ids.is_empty() {
            None
        } else {
            Some(args.song_ids.iter().copied().collect::<HashSet<i32>>())
        },
        threshold: args.threshold,
        bin_seconds: args.bin_seconds,
        cancel: None,
    };

    let report = engine.recognize_file(query_path, &options).await?;
    log::info!(
        "{} detections in {:.2}s",
        report.results.len(),
        report.total_time_s
    );

    if args.chunks {
        print_json_chunks(&report);
    }
    print_json_report(&report);

    Ok(())
}
