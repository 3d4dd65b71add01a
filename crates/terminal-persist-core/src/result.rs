//! Result shapes returned to callers of the persistence service.
//!
//! Callers never see raw errors for expected failure modes; they get one of
//! these values with `success` and an optional typed [`Error`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SessionSettings;
use crate::session::{CompanionKind, ReviveProcessPolicy, SessionEnvelope, TerminalId};
use crate::Error;

/// Outcome of a save or clear operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceResult {
    /// Whether the operation succeeded
    pub success: bool,
    /// Number of terminals written
    pub terminal_count: usize,
    /// Error, when the operation failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
}

impl PersistenceResult {
    /// Successful save of `terminal_count` terminals.
    pub fn saved(terminal_count: usize) -> Self {
        Self {
            success: true,
            terminal_count,
            error: None,
        }
    }

    /// Successful operation that wrote nothing.
    pub fn empty() -> Self {
        Self::saved(0)
    }

    /// Failed operation.
    pub fn failed(error: Error) -> Self {
        Self {
            success: false,
            terminal_count: 0,
            error: Some(error),
        }
    }
}

/// Outcome of a restore operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResult {
    /// Whether the operation succeeded
    pub success: bool,
    /// Number of terminals recreated
    pub restored_count: usize,
    /// Number of saved terminals not recreated
    pub skipped_count: usize,
    /// Error, when the operation failed or degraded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
}

impl RestoreResult {
    /// Nothing to restore.
    pub fn noop() -> Self {
        Self::completed(0, 0)
    }

    /// Restore skipped entirely; `skipped_count` saved terminals left alone.
    pub fn skipped(skipped_count: usize) -> Self {
        Self::completed(0, skipped_count)
    }

    /// Restore ran to completion.
    pub fn completed(restored_count: usize, skipped_count: usize) -> Self {
        Self {
            success: true,
            restored_count,
            skipped_count,
            error: None,
        }
    }

    /// Restore failed before any terminal was recreated.
    pub fn failed(error: Error) -> Self {
        Self {
            success: false,
            restored_count: 0,
            skipped_count: 0,
            error: Some(error),
        }
    }

    /// Restore stopped part way; terminals already recreated stay counted.
    pub fn interrupted(restored_count: usize, skipped_count: usize, error: Error) -> Self {
        Self {
            success: false,
            restored_count,
            skipped_count,
            error: Some(error),
        }
    }

    /// Attach a non-fatal error to an otherwise completed restore.
    pub fn with_error(mut self, error: Error) -> Self {
        self.error = Some(error);
        self
    }
}

/// Outcome of an expiry cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResult {
    /// Whether the operation succeeded
    pub success: bool,
    /// Whether an expired envelope was removed
    pub removed: bool,
    /// Error, when the operation failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
}

impl CleanupResult {
    /// Cleanup finished; `removed` tells whether anything was purged.
    pub fn done(removed: bool) -> Self {
        Self {
            success: true,
            removed,
            error: None,
        }
    }

    /// Cleanup failed.
    pub fn failed(error: Error) -> Self {
        Self {
            success: false,
            removed: false,
            error: Some(error),
        }
    }
}

/// Summary of one saved terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalSummary {
    /// Terminal identifier at save time
    pub id: TerminalId,
    /// Display name
    pub name: String,
    /// Ordinal number
    pub ordinal_number: u32,
    /// Working directory
    pub working_directory: String,
    /// Whether it was active
    pub is_active: bool,
    /// Scrollback lines saved
    pub scrollback_lines: usize,
    /// Companion process, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companion_process_type: Option<CompanionKind>,
}

/// Read-only projection of the stored envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Envelope format version
    pub version: String,
    /// When the envelope was written
    pub timestamp: DateTime<Utc>,
    /// Age in whole seconds at projection time
    pub age_seconds: i64,
    /// Whether the envelope is past the retention window
    pub expired: bool,
    /// Active terminal at save time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_terminal_id: Option<TerminalId>,
    /// Saved terminals
    pub terminals: Vec<TerminalSummary>,
}

impl SessionSummary {
    /// Project an envelope as seen at `now`.
    pub fn from_envelope(
        envelope: &SessionEnvelope,
        now: DateTime<Utc>,
        max_age: chrono::Duration,
    ) -> Self {
        Self {
            version: envelope.version.clone(),
            timestamp: envelope.timestamp,
            age_seconds: envelope.age_at(now).num_seconds(),
            expired: envelope.is_expired_at(now, max_age),
            active_terminal_id: envelope.active_terminal_id.clone(),
            terminals: envelope
                .terminals
                .iter()
                .map(|t| TerminalSummary {
                    id: t.id.clone(),
                    name: t.name.clone(),
                    ordinal_number: t.ordinal_number,
                    working_directory: t.working_directory.clone(),
                    is_active: t.is_active,
                    scrollback_lines: t.scrollback_len(),
                    companion_process_type: t.companion_process_type,
                })
                .collect(),
        }
    }

    /// Number of saved terminals.
    pub fn terminal_count(&self) -> usize {
        self.terminals.len()
    }
}

/// Aggregate statistics over the stored envelope and current settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    /// Whether persistence is enabled
    pub enabled: bool,
    /// Whether an envelope is stored
    pub has_session: bool,
    /// Whether the stored envelope is expired
    pub is_expired: bool,
    /// Saved terminals
    pub terminal_count: usize,
    /// Saved scrollback lines across all terminals
    pub total_scrollback_lines: usize,
    /// Saved terminals with a companion process
    pub companion_terminals: usize,
    /// When the envelope was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_saved: Option<DateTime<Utc>>,
    /// Configured scrollback limit
    pub scrollback_limit: usize,
    /// Configured revive policy
    pub revive_process_policy: ReviveProcessPolicy,
}

impl SessionStats {
    /// Collect statistics for an optional envelope as seen at `now`.
    pub fn collect(
        envelope: Option<&SessionEnvelope>,
        settings: &SessionSettings,
        now: DateTime<Utc>,
    ) -> Self {
        let mut stats = Self {
            enabled: settings.enable_persistent_sessions,
            has_session: false,
            is_expired: false,
            terminal_count: 0,
            total_scrollback_lines: 0,
            companion_terminals: 0,
            last_saved: None,
            scrollback_limit: settings.persistent_session_scrollback,
            revive_process_policy: settings.persistent_session_revive_process,
        };

        if let Some(envelope) = envelope {
            stats.has_session = true;
            stats.is_expired = envelope.is_expired_at(now, settings.max_age());
            stats.terminal_count = envelope.terminals.len();
            stats.total_scrollback_lines = envelope
                .terminals
                .iter()
                .map(|t| t.scrollback_len())
                .sum();
            stats.companion_terminals = envelope
                .terminals
                .iter()
                .filter(|t| t.companion_process_type.is_some())
                .count();
            stats.last_saved = Some(envelope.timestamp);
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{EnvelopeConfig, TerminalSessionRecord};

    fn sample_envelope(timestamp: DateTime<Utc>) -> SessionEnvelope {
        let mut a = TerminalSessionRecord::new("a", "zsh", 1);
        a.scrollback = Some(vec!["one".into(), "two".into()]);
        a.is_active = true;
        let mut b = TerminalSessionRecord::new("b", "claude", 2);
        b.scrollback = Some(vec!["three".into()]);
        b.companion_process_type = Some(CompanionKind::Claude);

        SessionEnvelope::new(
            vec![a, b],
            Some("a".into()),
            EnvelopeConfig::default(),
            timestamp,
        )
    }

    #[test]
    fn test_persistence_result_constructors() {
        let ok = PersistenceResult::saved(3);
        assert!(ok.success);
        assert_eq!(ok.terminal_count, 3);
        assert!(ok.error.is_none());

        let err = PersistenceResult::failed(Error::StorageFull("disk".into()));
        assert!(!err.success);
        assert_eq!(err.terminal_count, 0);
    }

    #[test]
    fn test_restore_result_with_error_keeps_counts() {
        let result = RestoreResult::completed(2, 1)
            .with_error(Error::SurfaceCommunicationFailed("detached".into()));
        assert!(result.success);
        assert_eq!(result.restored_count, 2);
        assert_eq!(result.skipped_count, 1);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_restore_result_json() {
        let json = serde_json::to_value(RestoreResult::skipped(4)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["restoredCount"], 0);
        assert_eq!(json["skippedCount"], 4);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_summary_projection() {
        let now = Utc::now();
        let envelope = sample_envelope(now - chrono::Duration::hours(2));
        let summary = SessionSummary::from_envelope(&envelope, now, chrono::Duration::days(7));

        assert_eq!(summary.terminal_count(), 2);
        assert!(!summary.expired);
        assert_eq!(summary.age_seconds, 7200);
        assert_eq!(summary.terminals[0].scrollback_lines, 2);
        assert_eq!(
            summary.terminals[1].companion_process_type,
            Some(CompanionKind::Claude)
        );
    }

    #[test]
    fn test_stats_without_envelope() {
        let settings = SessionSettings::default();
        let stats = SessionStats::collect(None, &settings, Utc::now());
        assert!(stats.enabled);
        assert!(!stats.has_session);
        assert_eq!(stats.terminal_count, 0);
        assert_eq!(stats.scrollback_limit, 1000);
        assert!(stats.last_saved.is_none());
    }

    #[test]
    fn test_stats_with_expired_envelope() {
        let now = Utc::now();
        let envelope = sample_envelope(now - chrono::Duration::days(8));
        let stats = SessionStats::collect(Some(&envelope), &SessionSettings::default(), now);

        assert!(stats.has_session);
        assert!(stats.is_expired);
        assert_eq!(stats.terminal_count, 2);
        assert_eq!(stats.total_scrollback_lines, 3);
        assert_eq!(stats.companion_terminals, 1);
    }
}
