//! Subcommand implementations.
//!
//! Every command reads the store directly; none of them needs live
//! terminals. Output is returned as a string so the caller decides where
//! it goes.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use terminal_persist_core::{PersistenceSettings, SessionStats, SessionSummary};
use terminal_persist_storage::{FileStore, SessionStore};

use crate::cli::Command;
use crate::schema::{envelope_schema, SchemaDraft};

/// Runs subcommands against one storage scope.
#[derive(Debug, Clone)]
pub struct Inspector {
    store: SessionStore,
    settings: PersistenceSettings,
}

impl Inspector {
    /// Open the session of `settings`' scope in a file store at `dir`.
    pub fn open(dir: &Path, settings: PersistenceSettings) -> Self {
        let store = SessionStore::from_settings(Arc::new(FileStore::new(dir)), &settings);
        debug!("Inspecting {} in {}", store.key(), dir.display());
        Self { store, settings }
    }

    /// The session store being inspected.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Run a subcommand and return its output.
    pub async fn run(&self, command: &Command) -> Result<String> {
        match command {
            Command::Info { json } => self.info(*json).await,
            Command::Stats { json } => self.stats(*json).await,
            Command::Export {
                output,
                include_expired,
            } => {
                let exported = self.export(*include_expired).await?;
                match output {
                    Some(path) => {
                        tokio::fs::write(path, &exported)
                            .await
                            .with_context(|| format!("failed to write {}", path.display()))?;
                        Ok(format!("Exported session to {}\n", path.display()))
                    }
                    None => Ok(exported),
                }
            }
            Command::Clear => self.clear().await,
            Command::Cleanup => self.cleanup().await,
            Command::Schema { draft07 } => {
                let draft = if *draft07 {
                    SchemaDraft::Draft07
                } else {
                    SchemaDraft::Draft2020
                };
                let schema = envelope_schema(draft)?;
                Ok(format!("{}\n", serde_json::to_string_pretty(&schema)?))
            }
        }
    }

    async fn summary(&self) -> Result<Option<SessionSummary>> {
        let envelope = self.store.load().await?;
        Ok(envelope.map(|e| {
            SessionSummary::from_envelope(&e, Utc::now(), self.settings.session.max_age())
        }))
    }

    async fn info(&self, json: bool) -> Result<String> {
        let summary = self.summary().await?;
        if json {
            return Ok(format!("{}\n", serde_json::to_string_pretty(&summary)?));
        }

        let Some(summary) = summary else {
            return Ok(format!("No saved session under {}\n", self.store.key()));
        };

        let mut out = String::new();
        writeln!(out, "Session {} (format {})", self.store.key(), summary.version)?;
        writeln!(
            out,
            "Saved {} ({}){}",
            summary.timestamp.to_rfc3339(),
            format_age(summary.age_seconds),
            if summary.expired { ", expired" } else { "" }
        )?;
        writeln!(out, "{} terminal(s):", summary.terminal_count())?;
        for terminal in &summary.terminals {
            write!(
                out,
                "  {}{:>3}  {:<20} {:>6} line(s)",
                if terminal.is_active { '*' } else { ' ' },
                terminal.ordinal_number,
                terminal.name,
                terminal.scrollback_lines
            )?;
            if !terminal.working_directory.is_empty() {
                write!(out, "  {}", terminal.working_directory)?;
            }
            if let Some(kind) = terminal.companion_process_type {
                write!(out, "  [{}]", kind.label())?;
            }
            out.push('\n');
        }
        Ok(out)
    }

    async fn stats(&self, json: bool) -> Result<String> {
        let envelope = self.store.load().await?;
        let stats = SessionStats::collect(envelope.as_ref(), &self.settings.session, Utc::now());
        if json {
            return Ok(format!("{}\n", serde_json::to_string_pretty(&stats)?));
        }

        let mut out = String::new();
        writeln!(out, "enabled:          {}", stats.enabled)?;
        writeln!(out, "has session:      {}", stats.has_session)?;
        writeln!(out, "expired:          {}", stats.is_expired)?;
        writeln!(out, "terminals:        {}", stats.terminal_count)?;
        writeln!(out, "scrollback lines: {}", stats.total_scrollback_lines)?;
        writeln!(out, "companions:       {}", stats.companion_terminals)?;
        if let Some(saved) = stats.last_saved {
            writeln!(out, "last saved:       {}", saved.to_rfc3339())?;
        }
        writeln!(out, "scrollback limit: {}", stats.scrollback_limit)?;
        writeln!(out, "revive policy:    {:?}", stats.revive_process_policy)?;
        Ok(out)
    }

    async fn export(&self, include_expired: bool) -> Result<String> {
        let envelope = self
            .store
            .load()
            .await?
            .with_context(|| format!("no saved session under {}", self.store.key()))?;
        if envelope.is_expired_at(Utc::now(), self.settings.session.max_age()) {
            if !include_expired {
                bail!(
                    "session from {} has expired; pass --include-expired to export it anyway",
                    envelope.timestamp.to_rfc3339()
                );
            }
            warn!(
                "Exporting expired session from {}",
                envelope.timestamp.to_rfc3339()
            );
        }
        Ok(format!("{}\n", serde_json::to_string_pretty(&envelope)?))
    }

    async fn clear(&self) -> Result<String> {
        let existed = self.store.exists().await?;
        self.store.clear().await?;
        if existed {
            info!("Cleared {}", self.store.key());
            Ok(format!("Cleared saved session {}\n", self.store.key()))
        } else {
            Ok(format!("No saved session under {}\n", self.store.key()))
        }
    }

    async fn cleanup(&self) -> Result<String> {
        let Some(envelope) = self.store.load().await? else {
            return Ok(format!("No saved session under {}\n", self.store.key()));
        };
        if !envelope.is_expired_at(Utc::now(), self.settings.session.max_age()) {
            return Ok(format!(
                "Session from {} has not expired\n",
                envelope.timestamp.to_rfc3339()
            ));
        }
        self.store.clear().await?;
        info!("Purged expired session {}", self.store.key());
        Ok(format!(
            "Purged session from {}\n",
            envelope.timestamp.to_rfc3339()
        ))
    }
}

fn format_age(seconds: i64) -> String {
    match seconds {
        s if s < 60 => format!("{s}s ago"),
        s if s < 3600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3600),
        s => format!("{}d ago", s / 86_400),
    }
}
