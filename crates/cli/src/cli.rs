//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// VDS Sync - stitch detector module files into one output while they grow
#[derive(Parser, Debug)]
#[command(
    name = "vds-sync",
    author,
    version,
    about = "Live stitching of multi-module detector files",
    long_about = "Creates the stitched output container for a detector acquisition and keeps\n\
                  its unique-id and sum arrays up to date while every detector module\n\
                  appends to its own raw file."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "VDS_SYNC_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "VDS_SYNC_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the output and synchronize it until the scan completes
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration and the datasets it produces
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "acquisition.toml", env = "VDS_SYNC_CONFIG")]
    pub config: PathBuf,

    /// Override the output directory from configuration
    #[arg(long, env = "VDS_SYNC_DIRECTORY")]
    pub directory: Option<PathBuf>,

    /// Override the missed-observation tolerance
    #[arg(long, env = "VDS_SYNC_TOLERANCE")]
    pub tolerance: Option<u32>,

    /// Scan points already completed before this run
    #[arg(long, default_value = "0")]
    pub completed_steps: u64,

    /// Scan points to synchronize (default: the rest of the scan)
    #[arg(long)]
    pub steps: Option<u64>,

    /// Replace an existing output file
    #[arg(long)]
    pub overwrite: bool,

    /// Write the raw module files too, one point per interval
    #[arg(long)]
    pub simulate: bool,

    /// Interval between simulated points in milliseconds
    #[arg(long, default_value = "100", requires = "simulate")]
    pub simulate_interval_ms: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "VDS_SYNC_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "acquisition.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "acquisition.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show the dataset descriptors the output will carry
    #[arg(long)]
    pub datasets: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
