//! mapstore CLI
//!
//! Command-line tools for exploring authorization data held in mapstore
//! storages. Each command loads a JSON seed of resource servers and
//! resources into in-memory storages and works against them.
//!
//! # Commands
//!
//! - `query` - Search resources with the resource store's filters
//! - `stats` - Summarize servers, resources and owners

mod commands;

use clap::{Parser, Subcommand};
use commands::query::QueryArgs;
use commands::Format;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// mapstore command-line tools.
#[derive(Parser)]
#[command(name = "mapstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON seed file
    #[arg(global = true, long)]
    seed: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search resources
    Query(QueryArgs),

    /// Summarize the seed
    Stats {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Query(args) => {
            let seed = cli.seed.ok_or("Seed file required for query")?;
            commands::query::run(&seed, &args)?;
        }
        Commands::Stats { format } => {
            let seed = cli.seed.ok_or("Seed file required for stats")?;
            commands::stats::run(&seed, format)?;
        }
        Commands::Version => {
            println!("mapstore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("mapstore core v{}", mapstore_core::VERSION);
        }
    }

    Ok(())
}
