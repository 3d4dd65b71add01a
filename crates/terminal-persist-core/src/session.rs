//! Session types for terminal session persistence.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Version string stamped on every envelope written by this crate.
pub const ENVELOPE_VERSION: &str = "1.0.0";

/// Opaque identifier of a terminal, assigned by the terminal manager.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct TerminalId(String);

impl TerminalId {
    /// Create a terminal ID from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TerminalId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TerminalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TerminalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of companion process (CLI agent) detected in a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CompanionKind {
    /// Claude CLI
    Claude,
    /// Gemini CLI
    Gemini,
    /// Codex CLI
    Codex,
    /// GitHub Copilot CLI
    Copilot,
    /// Any tag this version does not recognize
    #[serde(other)]
    Unknown,
}

impl CompanionKind {
    /// Display label used in restore notices.
    pub fn label(&self) -> &'static str {
        match self {
            CompanionKind::Claude => "Claude",
            CompanionKind::Gemini => "Gemini",
            CompanionKind::Codex => "Codex",
            CompanionKind::Copilot => "Copilot",
            CompanionKind::Unknown => "Agent",
        }
    }

    /// Command a user can run to resume the companion session, if known.
    pub fn resume_command(&self) -> Option<&'static str> {
        match self {
            CompanionKind::Claude => Some("claude --continue"),
            CompanionKind::Codex => Some("codex resume"),
            CompanionKind::Gemini => Some("gemini"),
            CompanionKind::Copilot => Some("copilot"),
            CompanionKind::Unknown => None,
        }
    }
}

/// What the host does with a terminal's process when the window goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ReviveProcessPolicy {
    /// Revive after the host exits
    OnExit,
    /// Revive after the host exits or the window closes
    #[default]
    OnExitAndWindowClose,
    /// Never revive
    Never,
}

/// Configuration snapshot stored alongside the terminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeConfig {
    /// Maximum scrollback lines kept per terminal
    pub scrollback_lines: usize,
    /// Process revive policy in effect when the envelope was written
    pub revive_process_policy: ReviveProcessPolicy,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            scrollback_lines: 1000,
            revive_process_policy: ReviveProcessPolicy::default(),
        }
    }
}

/// Saved state of a single terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TerminalSessionRecord {
    /// Terminal identifier at save time
    pub id: TerminalId,
    /// Display name
    pub name: String,
    /// Ordinal number shown in the UI
    pub ordinal_number: u32,
    /// Working directory (empty when unknown)
    #[serde(default)]
    pub working_directory: String,
    /// Whether this was the active terminal
    #[serde(default)]
    pub is_active: bool,
    /// Scrollback lines, oldest first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrollback: Option<Vec<String>>,
    /// Detected companion process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companion_process_type: Option<CompanionKind>,
    /// Last time the terminal saw activity
    pub last_activity: DateTime<Utc>,
}

impl TerminalSessionRecord {
    /// Create a record with no scrollback and no companion process.
    pub fn new(id: impl Into<TerminalId>, name: impl Into<String>, ordinal_number: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ordinal_number,
            working_directory: String::new(),
            is_active: false,
            scrollback: None,
            companion_process_type: None,
            last_activity: Utc::now(),
        }
    }

    /// Number of scrollback lines carried by this record.
    pub fn scrollback_len(&self) -> usize {
        self.scrollback.as_ref().map(Vec::len).unwrap_or(0)
    }
}

/// Top-level persisted session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionEnvelope {
    /// Envelope format version
    pub version: String,
    /// Creation instant
    pub timestamp: DateTime<Utc>,
    /// Terminal that was active at save time
    #[serde(default)]
    pub active_terminal_id: Option<TerminalId>,
    /// Saved terminals, in display order
    pub terminals: Vec<TerminalSessionRecord>,
    /// Configuration snapshot
    pub config: EnvelopeConfig,
}

impl SessionEnvelope {
    /// Create a new envelope stamped with the current format version.
    pub fn new(
        terminals: Vec<TerminalSessionRecord>,
        active_terminal_id: Option<TerminalId>,
        config: EnvelopeConfig,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            version: ENVELOPE_VERSION.to_string(),
            timestamp,
            active_terminal_id,
            terminals,
            config,
        }
    }

    /// Age of the envelope relative to `now`.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    /// Whether the envelope is older than `max_age` at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age_at(now) > max_age
    }

    /// The record flagged active, if any. The first one wins.
    pub fn active_record(&self) -> Option<&TerminalSessionRecord> {
        self.terminals.iter().find(|t| t.is_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope_at(timestamp: DateTime<Utc>) -> SessionEnvelope {
        let mut first = TerminalSessionRecord::new("t1", "Terminal 1", 1);
        first.is_active = true;
        first.scrollback = Some(vec!["$ ls".to_string(), "Cargo.toml".to_string()]);
        let second = TerminalSessionRecord::new("t2", "Terminal 2", 2);

        SessionEnvelope::new(
            vec![first, second],
            Some(TerminalId::from("t1")),
            EnvelopeConfig::default(),
            timestamp,
        )
    }

    #[test]
    fn test_terminal_id_display() {
        let id = TerminalId::new("term-42");
        assert_eq!(format!("{id}"), "term-42");
        assert_eq!(id.as_str(), "term-42");
    }

    #[test]
    fn test_envelope_not_expired_within_window() {
        let now = Utc::now();
        let envelope = envelope_at(now - Duration::days(6));
        assert!(!envelope.is_expired_at(now, Duration::days(7)));
    }

    #[test]
    fn test_envelope_expired_after_window() {
        let now = Utc::now();
        let envelope = envelope_at(now - Duration::days(7) - Duration::seconds(1));
        assert!(envelope.is_expired_at(now, Duration::days(7)));
    }

    #[test]
    fn test_envelope_exactly_at_boundary_is_not_expired() {
        let now = Utc::now();
        let envelope = envelope_at(now - Duration::days(7));
        assert!(!envelope.is_expired_at(now, Duration::days(7)));
    }

    #[test]
    fn test_active_record() {
        let envelope = envelope_at(Utc::now());
        assert_eq!(envelope.active_record().unwrap().id.as_str(), "t1");
    }

    #[test]
    fn test_envelope_json_shape() {
        let envelope = envelope_at(Utc::now());
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["version"], ENVELOPE_VERSION);
        assert_eq!(json["activeTerminalId"], "t1");
        assert_eq!(json["terminals"][0]["ordinalNumber"], 1);
        assert_eq!(json["terminals"][0]["isActive"], true);
        assert_eq!(json["config"]["scrollbackLines"], 1000);
        assert_eq!(json["config"]["reviveProcessPolicy"], "onExitAndWindowClose");
        // Absent optionals are omitted
        assert!(json["terminals"][1].get("scrollback").is_none());
    }

    #[test]
    fn test_unknown_companion_tag_deserializes() {
        let kind: CompanionKind = serde_json::from_str("\"aider\"").unwrap();
        assert_eq!(kind, CompanionKind::Unknown);
        assert_eq!(kind.resume_command(), None);

        let kind: CompanionKind = serde_json::from_str("\"claude\"").unwrap();
        assert_eq!(kind, CompanionKind::Claude);
    }

    #[test]
    fn test_record_scrollback_len() {
        let mut record = TerminalSessionRecord::new("t1", "Terminal 1", 1);
        assert_eq!(record.scrollback_len(), 0);
        record.scrollback = Some(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(record.scrollback_len(), 3);
    }
}
