//! linksync CLI
//!
//! Command-line tools for schemas and data sets kept in sync by linksync.
//!
//! # Commands
//!
//! - `inspect` - Validate a schema and display its relations
//! - `check` - Report one-sided links in a data set, optionally repairing them
//! - `apply` - Run a batch of mutations through the engine
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// linksync command-line tools.
#[derive(Parser)]
#[command(name = "linksync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the schema file (JSON array of entity types)
    #[arg(global = true, short, long)]
    schema: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a schema and display its relations
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Report one-sided links in a data set
    Check {
        /// Data file: a JSON object mapping entity types to document arrays
        #[arg(short, long)]
        data: PathBuf,

        /// Repair the links found
        #[arg(short, long)]
        repair: bool,

        /// Write the (repaired) data set here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a batch of mutations through the engine
    Apply {
        /// Data file to start from; empty if omitted
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Mutations file: a JSON array of create, update, and delete steps
        #[arg(short, long)]
        mutations: PathBuf,

        /// Write the resulting data set here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum inverse writes in flight per mutation
        #[arg(long, default_value = "16")]
        max_concurrent_writes: usize,

        /// Skip inverse writes to missing documents instead of failing
        #[arg(long)]
        lenient: bool,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
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
        Commands::Inspect { format } => {
            let schema = cli.schema.ok_or("Schema path required for inspect")?;
            commands::inspect::run(&schema, &format)?;
        }
        Commands::Check {
            data,
            repair,
            output,
        } => {
            let schema = cli.schema.ok_or("Schema path required for check")?;
            let consistent = commands::check::run(&schema, &data, repair, output.as_deref()).await?;
            if !consistent {
                std::process::exit(1);
            }
        }
        Commands::Apply {
            data,
            mutations,
            output,
            max_concurrent_writes,
            lenient,
        } => {
            let schema = cli.schema.ok_or("Schema path required for apply")?;
            let config = linksync_core::Config::new()
                .max_concurrent_writes(max_concurrent_writes)
                .verify_targets(!lenient);
            commands::apply::run(
                &schema,
                data.as_deref(),
                &mutations,
                output.as_deref(),
                config,
            )
            .await?;
        }
        Commands::Version => {
            println!("linksync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
