//! CLI Adapter
//!
//! Command-line interface for the flowscope engine.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{BaselineCmd, CheckCmd, CliApp, Command, RunCmd};
