//! # terminal-persist
//!
//! Command-line inspector for saved terminal sessions.
//!
//! ## Overview
//!
//! Reads the session envelope that a host persisted into a file store and
//! can:
//! - Summarize it or print statistics
//! - Export it as decoded JSON
//! - Clear it, or purge it once expired
//! - Print the JSON Schema of exported envelopes
//!
//! ## Architecture
//!
//! This is the top layer - a thin binary over:
//! - terminal-persist-core: Core types and settings
//! - terminal-persist-storage: Codec and file store

use std::io::Write;

use clap::Parser;
use terminal_persist::{Cli, Inspector};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = cli.settings()?;
    let store_dir = cli.store_dir()?;
    tracing::debug!("Using store directory {}", store_dir.display());

    let inspector = Inspector::open(&store_dir, settings);
    let output = inspector.run(&cli.command).await.map_err(|e| {
        tracing::error!("Command failed: {:#}", e);
        e
    })?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;

    Ok(())
}
