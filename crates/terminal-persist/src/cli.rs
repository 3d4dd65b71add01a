//! Command-line arguments.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use terminal_persist_core::{PersistenceSettings, StorageScope};

/// Inspect and manage saved terminal sessions
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding saved sessions
    #[arg(long, global = true)]
    pub store_dir: Option<PathBuf>,

    /// Workspace whose session to use (omit for the global session)
    #[arg(short, long, global = true)]
    pub workspace: Option<String>,

    /// Path to a YAML settings file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Summarize the saved session
    Info {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show statistics over the saved session and settings
    Stats {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Write the decoded session as JSON
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Export the session even if it has expired
        #[arg(long)]
        include_expired: bool,
    },
    /// Delete the saved session
    Clear,
    /// Delete the saved session if it has expired
    Cleanup,
    /// Print the JSON Schema of exported sessions
    Schema {
        /// Emit draft-07 instead of draft 2020-12
        #[arg(long)]
        draft07: bool,
    },
}

impl Cli {
    /// Settings from `--config` with `--workspace` applied.
    pub fn settings(&self) -> Result<PersistenceSettings> {
        let mut settings = match &self.config {
            Some(path) => PersistenceSettings::from_file(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))?,
            None => PersistenceSettings::default(),
        };
        if let Some(id) = &self.workspace {
            settings.storage.scope = StorageScope::Workspace { id: id.clone() };
            settings.validate()?;
        }
        Ok(settings)
    }

    /// Store directory, defaulting to the platform data directory.
    pub fn store_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.store_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join("terminal-persist"))
            .context("no platform data directory; pass --store-dir")
    }
}
