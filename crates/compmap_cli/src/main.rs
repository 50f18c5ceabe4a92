//! Compmap CLI
//!
//! Command-line tools for exploring compaction map behavior.
//!
//! # Commands
//!
//! - `simulate` - Run a synthetic compaction workload and report telemetry
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Compaction map command-line tools.
#[derive(Parser)]
#[command(name = "compmap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synthetic compaction workload
    Simulate {
        /// Number of compaction generations to run
        #[arg(short, long, default_value = "10")]
        generations: u32,

        /// Input segments per generation
        #[arg(short, long, default_value = "16")]
        segments: u32,

        /// Relocated records per input segment
        #[arg(short, long, default_value = "256")]
        records: u32,

        /// Prune reclaimed segments every K generations (0 disables)
        #[arg(short, long, default_value = "0")]
        prune_every: u32,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Simulate {
            generations,
            segments,
            records,
            prune_every,
            format,
        } => {
            let options = commands::simulate::SimulateOptions {
                generations,
                segments,
                records,
                prune_every,
            };
            commands::simulate::run(&options, &format)?;
        }
        Commands::Version => {
            println!("compmap CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("compmap core v{}", compmap_core::VERSION);
        }
    }

    Ok(())
}
