//! acingest - fingerprint reference recordings into the store
//!
//! Usage:
//!   acingest <audio_file>...
//!   acingest --config <path> --name "Some Song" <audio_file>

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;

use aircheck_cli::output::print_json_song;
use aircheck_core::{AppConfig, Engine, HashIndex, PgIndex};

#[derive(Parser, Debug)]
#[command(name = "acingest")]
#[command(about = "Fingerprint reference audio files into the store", long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, default_value = "aircheck.toml")]
    config: String,

    /// Reference audio files to ingest
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Song name; only valid with a single input, defaults to the file stem
    #[arg(short, long)]
    name: Option<String>,

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

    if args.name.is_some() && args.inputs.len() > 1 {
        anyhow::bail!("--name only applies when ingesting a single file");
    }

    let config = AppConfig::load(Path::new(&args.config))?;
    let index = PgIndex::connect(&config.store, config.engine.lookup_batch_size).await?;
    let engine = Engine::with_spectral_extractor(
        config.engine.clone(),
        config.extractor.clone(),
        Arc::new(index),
    )?;

    for input in &args.inputs {
        log::info!("ingesting {}", input);
        let song_id = engine
            .ingest_file(Path::new(input), args.name.as_deref())
            .await?;
        if let Some(song) = engine.index().get_song(song_id).await? {
            print_json_song(&song);
        }
    }

    Ok(())
}
