//! tierstore binary: validate a configuration and report the tier layout.

use clap::Parser;
use std::path::PathBuf;
use tierstore::config::{Config, DEFAULT_CONFIG};
use tierstore::logging;

#[derive(Parser)]
#[command(name = "tierstore")]
#[command(about = "Tiered block store layout and eviction configuration checker")]
struct Args {
    /// Path to configuration file
    config: Option<PathBuf>,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn main() {
    let args = Args::parse();

    if args.print_config {
        print!("{}", DEFAULT_CONFIG);
        return;
    }

    let config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            eprintln!("No config file specified. Use tierstore <path> or --print-config");
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(&config) {
        tracing::error!(error = %e, "Block store error");
        std::process::exit(1);
    }
}

fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = config.build_store()?;
    tracing::info!(
        evictor = %store.evictor().kind(),
        cascading = config.evictor.cascading,
        plan_retries = config.store.plan_retries,
        "block store ready"
    );

    let meta = store.block_store_meta();
    println!("{:<28} {:<40} {:>16}", "location", "path", "capacity");
    for dir in &meta.dirs {
        println!(
            "{:<28} {:<40} {:>16}",
            dir.location.to_string(),
            dir.path.display().to_string(),
            dir.capacity_bytes
        );
    }
    for (alias, capacity) in &meta.capacity_bytes_on_tiers {
        println!("tier {}: {} bytes", alias, capacity);
    }
    println!("total: {} bytes", meta.capacity_bytes());
    Ok(())
}
