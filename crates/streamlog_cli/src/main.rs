//! streamlog CLI
//!
//! Command-line tools for streamlog event logs.
//!
//! # Commands
//!
//! - `write` - Append one event
//! - `import` - Append a file of events as one atomic batch
//! - `read` - Print committed events
//! - `flood` - Hammer the single-event path from many threads
//! - `basic-test` - Import, flood and verify that nothing was lost
//! - `inspect` - Display log metadata

mod commands;
mod settings;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// streamlog command-line tools.
#[derive(Parser)]
#[command(name = "streamlog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Backend connection string (file://<dir>, blob+dir://<dir>?container=<name>, blob+mem://<name>)
    #[arg(global = true, short, long)]
    backend: Option<String>,

    /// JSON settings file with `backend` and `log` sections
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append one event
    Write {
        /// Stream tag
        stream: String,

        /// Payload text (reads stdin if omitted)
        message: Option<String>,
    },

    /// Append every line of a file as one atomic batch
    Import {
        /// Stream tag
        stream: String,

        /// File with one payload per line (`-` for stdin)
        file: PathBuf,
    },

    /// Print committed events
    Read {
        /// Start from this offset
        #[arg(short, long, default_value = "0")]
        start: i64,

        /// Maximum number of events to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only print events of this stream
        #[arg(long)]
        stream: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Write unique events from many threads and check they all arrived
    Flood {
        /// Number of writer threads
        #[arg(short, long, default_value = "10")]
        threads: usize,

        /// Events per thread
        #[arg(short = 'n', long, default_value = "1000")]
        count: usize,

        /// Stream tag
        #[arg(long, default_value = "flood")]
        stream: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Import batches, flood single events, then verify every one is read back once
    BasicTest {
        /// Number of batches
        #[arg(long, default_value = "10")]
        batch_count: usize,

        /// Events per batch
        #[arg(long, default_value = "10000")]
        batch_size: usize,

        /// Number of flood threads
        #[arg(long, default_value = "10")]
        threads: usize,

        /// Events per flood thread
        #[arg(long, default_value = "1000")]
        flood_size: usize,
    },

    /// Display log metadata
    Inspect {
        /// Count events per stream
        #[arg(short, long)]
        streams: bool,

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
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("streamlog CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("streamlog core v{}", streamlog_core::VERSION);
        return Ok(());
    }

    let settings = settings::Settings::resolve(cli.backend.as_deref(), cli.config.as_deref())?;
    let log = settings.open()?;

    match cli.command {
        Commands::Write { stream, message } => {
            commands::write::run(&log, &stream, message)?;
        }
        Commands::Import { stream, file } => {
            commands::import::run(&log, &stream, &file)?;
        }
        Commands::Read {
            start,
            limit,
            stream,
            format,
        } => {
            commands::read::run(&log, start, limit, stream.as_deref(), &format)?;
        }
        Commands::Flood {
            threads,
            count,
            stream,
            format,
        } => {
            commands::flood::run(&log, &stream, threads, count, &format)?;
        }
        Commands::BasicTest {
            batch_count,
            batch_size,
            threads,
            flood_size,
        } => {
            let config = streamlog_testkit::StressConfig {
                batch_count,
                batch_size,
                threads,
                flood_size,
            };
            commands::basic_test::run(&log, &config)?;
        }
        Commands::Inspect { streams, format } => {
            commands::inspect::run(&log, streams, &format)?;
        }
        Commands::Version => {}
    }

    Ok(())
}
