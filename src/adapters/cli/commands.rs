//! CLI Command Definitions
//!
//! Argument structures for the flowscope binary, using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Flowscope - Institutional order-flow detection engine
#[derive(Parser, Debug)]
#[command(
    name = "flowscope",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Institutional order-flow detection engine for options order books",
    long_about = "Flowscope ingests an order-level event stream for an options chain, \
                  aggregates directional pressure per strike, scores it against a \
                  multi-session baseline and emits confidence-scored institutional \
                  flow signals."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the detection engine
    Run(RunCmd),

    /// Validate the configuration and exit
    Check(CheckCmd),

    /// Print the persisted baseline snapshot for one instrument
    Baseline(BaselineCmd),
}

/// Start the detection engine
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/flowscope.toml")]
    pub config: PathBuf,

    /// Replay a JSONL event capture instead of a live connection
    #[arg(long, value_name = "FILE")]
    pub replay: Option<PathBuf>,

    /// Override the subscribed underlying symbol
    #[arg(long, value_name = "SYMBOL")]
    pub underlying: Option<String>,
}

/// Validate configuration
#[derive(Parser, Debug)]
pub struct CheckCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/flowscope.toml")]
    pub config: PathBuf,
}

/// Inspect one instrument's baseline
#[derive(Parser, Debug)]
pub struct BaselineCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/flowscope.toml")]
    pub config: PathBuf,

    /// Underlying symbol (e.g., ES)
    #[arg(long, value_name = "SYMBOL")]
    pub underlying: String,

    /// Strike price
    #[arg(long, value_name = "STRIKE")]
    pub strike: String,

    /// Option type: call or put
    #[arg(long, value_name = "TYPE")]
    pub option_type: String,
}
