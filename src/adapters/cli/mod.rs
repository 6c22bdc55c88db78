//! CLI Adapter
//!
//! Command-line interface for the sync-client binary.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{ChainsCmd, CliApp, Command, DemoCmd, PairArgs, QuoteCmd, WatchCmd};

use anyhow::Result;

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    commands::execute(app).await
}
