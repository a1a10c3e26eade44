//! tiku-ingest - Worksheet text extraction backfill
//!
//! Walks the exercise catalog, extracts the selected field from each
//! worksheet photo with a hosted vision model, votes repeated attempts to a
//! consensus value and checkpoints accepted values until the catalog
//! converges. Safe to interrupt at any point: re-running resumes from the
//! checkpoint file.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tiku_ingest::config::IngestConfig;
use tiku_ingest::models::ExtractionField;
use tiku_ingest::services::{
    AssetResolver, CheckpointStore, ConsensusVoter, ConvergenceDriver, DriverConfig, Normalizer,
    VisionClient,
};

#[derive(Parser, Debug)]
#[command(
    name = "tiku-ingest",
    about = "Backfill worksheet exercise text from photos",
    version
)]
struct Args {
    /// Which worksheet field to converge
    #[arg(long, value_enum, default_value_t = ExtractionField::Description)]
    field: ExtractionField,

    /// Root folder holding the image corpus and checkpoint files
    #[arg(long)]
    root_folder: Option<String>,

    /// Path to the TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Starting tiku-ingest");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Field: {}", args.field);

    // Step 1: Resolve configuration (CLI → ENV → TOML → defaults)
    let config = IngestConfig::resolve(args.root_folder.as_deref(), args.config.as_deref())?;
    info!("Root folder: {}", config.root_folder.display());

    // Step 2: Open the checkpoint store for the selected field
    let store_path = config.root_folder.join(args.field.store_file());
    let store = CheckpointStore::load(&store_path, config.engine.flush_every)?;
    info!(
        "Checkpoint store: {} ({} entries)",
        store_path.display(),
        store.len()
    );

    // Step 3: Wire the engine
    let client = VisionClient::new(config.api_key.clone(), config.vision.clone())?;
    let normalizer = Normalizer::new(args.field, config.engine.min_length);
    let voter = ConsensusVoter::new(
        Arc::new(client),
        normalizer.clone(),
        config.engine.initial_votes,
    );
    let resolver = AssetResolver::new(&config.root_folder, config.catalog.clone());

    let driver = ConvergenceDriver::new(
        args.field,
        config.catalog.clone(),
        resolver,
        store,
        voter,
        normalizer,
        DriverConfig {
            batch_size: config.engine.batch_size,
            stall_rounds: config.engine.stall_rounds,
            max_rounds: config.engine.max_rounds,
            shuffle: config.engine.shuffle,
        },
    );

    // Step 4: Run to a terminal state; stalled is a normal outcome
    let report = driver.run().await?;

    println!("Run {} stopped: {:?}", report.session_id, report.stop_reason);
    println!(
        "Accepted {} values over {} rounds ({}/{} items complete)",
        report.accepted_total,
        report.rounds,
        report.complete_items(),
        report.total_items()
    );
    for group in &report.groups {
        println!(
            "  level {:>2}: {}/{}",
            group.group, group.complete, group.total
        );
    }
    if !report.fallback_keys.is_empty() {
        println!(
            "{} values accepted without consensus, review suggested: {}",
            report.fallback_keys.len(),
            report.fallback_keys.join(", ")
        );
    }

    Ok(())
}
