//! SegStore CLI
//!
//! Command-line access to a local SegStore data directory.

use clap::{Parser, Subcommand};
use segstore::{Config, Db, StoreError};
use tracing_subscriber::{fmt, EnvFilter};

/// SegStore CLI
#[derive(Parser, Debug)]
#[command(name = "segstore-cli")]
#[command(about = "CLI for the SegStore segmented-log key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./segstore_data")]
    data_dir: String,

    /// Segment size limit in bytes before rotation
    #[arg(short, long, default_value = "10485760")]
    segment_size: u64,

    /// Segment count that triggers a background merge
    #[arg(short, long, default_value = "3")]
    merge_threshold: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Print the total on-disk size in bytes
    Size,

    /// Merge all closed segments now
    Compact,

    /// Print segment and index statistics
    Stats,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,segstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .segment_size_limit(args.segment_size)
        .merge_threshold(args.merge_threshold)
        .build();

    let db = match Db::open(config) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let outcome = run(&db, args.command);

    // Close even on failure so the merge thread and workers stop cleanly
    if let Err(e) = db.close() {
        tracing::error!("Failed to close database: {}", e);
    }

    match outcome {
        Ok(()) => {}
        Err(StoreError::KeyNotFound) => {
            eprintln!("(not found)");
            std::process::exit(2);
        }
        Err(e) => {
            tracing::error!("Command failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(db: &Db, command: Commands) -> segstore::Result<()> {
    match command {
        Commands::Get { key } => {
            println!("{}", db.get(&key)?);
        }
        Commands::Put { key, value } => {
            db.put(&key, &value)?;
            db.wait_for_merges();
            println!("OK");
        }
        Commands::Size => {
            println!("{}", db.size()?);
        }
        Commands::Compact => {
            let stats = db.compact()?;
            println!(
                "merged {} segments: kept {} of {} records, {} -> {} bytes",
                stats.segments_merged,
                stats.records_kept,
                stats.records_scanned,
                stats.bytes_before,
                stats.bytes_after
            );
        }
        Commands::Stats => {
            let stats = db.stats()?;
            println!("segments:        {}", stats.segment_count);
            let passive: Vec<u64> = stats.passive_segments.iter().map(|id| id.0).collect();
            println!("passive:         {:?}", passive);
            println!("active:          {}", stats.active_segment);
            println!("active size:     {}", stats.active_size);
            println!("keys:            {}", stats.key_count);
            println!("read workers:    {}", stats.worker_count);
        }
    }
    Ok(())
}
