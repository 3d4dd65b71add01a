//! Configuration types for terminal session persistence.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{EnvelopeConfig, ReviveProcessPolicy};

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading the configuration file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error
    #[error("Parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Persistence configuration loaded from a YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PersistenceSettings {
    /// Host-facing session settings
    pub session: SessionSettings,
    /// Storage settings
    pub storage: StorageSettings,
    /// Batch restore settings
    pub restore: RestoreSettings,
    /// Rendering surface settings
    pub surface: SurfaceSettings,
    /// Codec settings
    pub codec: CodecSettings,
}

impl PersistenceSettings {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let settings: PersistenceSettings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.max_age_days == 0 {
            return Err(ConfigError::Invalid(
                "session.max_age_days must be > 0".to_string(),
            ));
        }

        if self.storage.max_size_bytes == 0 {
            return Err(ConfigError::Invalid(
                "storage.max_size_bytes must be > 0".to_string(),
            ));
        }

        if let StorageScope::Workspace { id } = &self.storage.scope {
            if id.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "storage.scope workspace id cannot be empty".to_string(),
                ));
            }
        }

        if self.restore.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "restore.batch_size must be > 0".to_string(),
            ));
        }

        if self.surface.cache_capacity == 0 {
            return Err(ConfigError::Invalid(
                "surface.cache_capacity must be > 0".to_string(),
            ));
        }

        if self.surface.restore_lines_per_tick == 0 {
            return Err(ConfigError::Invalid(
                "surface.restore_lines_per_tick must be > 0".to_string(),
            ));
        }

        if self.surface.auto_save_interval_secs == 0 || self.surface.cleanup_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "surface timer intervals must be > 0".to_string(),
            ));
        }

        if self.surface.channel_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "surface.channel_timeout_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Where the orchestrator obtains scrollback while saving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollbackSource {
    /// Ask the terminal manager (`getScrollbackData`)
    #[default]
    TerminalManager,
    /// Ask the rendering surface over the serialization channel
    Surface,
}

/// Host-facing session settings.
///
/// Accepts both the snake_case keys used in YAML files and the camelCase
/// keys hosts use for their own settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Master switch for persistence
    #[serde(alias = "enablePersistentSessions")]
    pub enable_persistent_sessions: bool,
    /// Scrollback lines kept per terminal
    #[serde(alias = "persistentSessionScrollback")]
    pub persistent_session_scrollback: usize,
    /// Process revive policy
    #[serde(alias = "persistentSessionReviveProcess")]
    pub persistent_session_revive_process: ReviveProcessPolicy,
    /// Envelope retention window in days
    pub max_age_days: u32,
    /// Scrollback source used while saving
    pub scrollback_source: ScrollbackSource,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            enable_persistent_sessions: true,
            persistent_session_scrollback: 1000,
            persistent_session_revive_process: ReviveProcessPolicy::default(),
            max_age_days: 7,
            scrollback_source: ScrollbackSource::default(),
        }
    }
}

impl SessionSettings {
    /// Retention window as a chrono duration.
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.max_age_days))
    }

    /// Snapshot stored in each envelope.
    pub fn envelope_config(&self) -> EnvelopeConfig {
        EnvelopeConfig {
            scrollback_lines: self.persistent_session_scrollback,
            revive_process_policy: self.persistent_session_revive_process,
        }
    }
}

/// Storage scope of a session envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageScope {
    /// One envelope per workspace
    Workspace {
        /// Workspace identifier
        id: String,
    },
    /// A single envelope shared by every workspace
    #[default]
    Global,
}

impl StorageScope {
    /// Storage key holding this scope's envelope.
    pub fn key(&self) -> String {
        match self {
            StorageScope::Workspace { id } => format!("terminal-sessions/workspace/{id}"),
            StorageScope::Global => "terminal-sessions/global".to_string(),
        }
    }
}

/// Storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Envelope scope
    pub scope: StorageScope,
    /// Size ceiling for one serialized envelope
    pub max_size_bytes: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            scope: StorageScope::default(),
            max_size_bytes: 20 * 1024 * 1024,
        }
    }
}

/// Batch restore settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreSettings {
    /// Records restored concurrently per batch
    pub batch_size: usize,
    /// Pause between batches in milliseconds
    pub batch_pacing_ms: u64,
    /// Settle delay per restored terminal in milliseconds
    pub settle_per_terminal_ms: u64,
    /// Replay continuation notices into terminals with a companion process
    pub companion_notice: bool,
}

impl Default for RestoreSettings {
    fn default() -> Self {
        Self {
            batch_size: 3,
            batch_pacing_ms: 10,
            settle_per_terminal_ms: 500,
            companion_notice: true,
        }
    }
}

impl RestoreSettings {
    /// Pause between batches.
    pub fn batch_pacing(&self) -> Duration {
        Duration::from_millis(self.batch_pacing_ms)
    }

    /// Settle delay after restoring `count` terminals.
    pub fn settle_delay(&self, count: usize) -> Duration {
        Duration::from_millis(self.settle_per_terminal_ms.saturating_mul(count as u64))
    }
}

/// Rendering surface settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceSettings {
    /// Maximum live entries in the surface cache
    pub cache_capacity: usize,
    /// Auto-save period in seconds
    pub auto_save_interval_secs: u64,
    /// Stale-entry cleanup period in seconds
    pub cleanup_interval_secs: u64,
    /// Entries untouched for longer than this are evicted, in seconds
    pub stale_after_secs: u64,
    /// Lines written per tick when restoring content
    pub restore_lines_per_tick: usize,
    /// Serialization round-trip timeout in milliseconds
    pub channel_timeout_ms: u64,
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self {
            cache_capacity: 10,
            auto_save_interval_secs: 120,
            cleanup_interval_secs: 600,
            stale_after_secs: 24 * 60 * 60,
            restore_lines_per_tick: 50,
            channel_timeout_ms: 10_000,
        }
    }
}

impl SurfaceSettings {
    /// Auto-save period.
    pub fn auto_save_interval(&self) -> Duration {
        Duration::from_secs(self.auto_save_interval_secs)
    }

    /// Cleanup period.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Staleness threshold.
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    /// Serialization round-trip timeout.
    pub fn channel_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_timeout_ms)
    }
}

/// Compression algorithm applied above the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// gzip, base64-wrapped
    #[default]
    Gzip,
    /// No compression
    None,
}

/// Codec settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecSettings {
    /// Content longer than this many characters is compressed
    pub compression_threshold: usize,
    /// Algorithm used above the threshold
    pub algorithm: CompressionAlgorithm,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            compression_threshold: 1000,
            algorithm: CompressionAlgorithm::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PersistenceSettings::default();
        assert!(config.session.enable_persistent_sessions);
        assert_eq!(config.session.persistent_session_scrollback, 1000);
        assert_eq!(config.session.max_age_days, 7);
        assert_eq!(config.storage.max_size_bytes, 20 * 1024 * 1024);
        assert_eq!(config.restore.batch_size, 3);
        assert_eq!(config.restore.batch_pacing_ms, 10);
        assert_eq!(config.surface.cache_capacity, 10);
        assert_eq!(config.surface.restore_lines_per_tick, 50);
        assert_eq!(config.codec.compression_threshold, 1000);
    }

    #[test]
    fn test_config_validation() {
        let config = PersistenceSettings::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_batch_size() {
        let mut config = PersistenceSettings::default();
        config.restore.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_cache_capacity() {
        let mut config = PersistenceSettings::default();
        config.surface.cache_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_workspace_id() {
        let mut config = PersistenceSettings::default();
        config.storage.scope = StorageScope::Workspace { id: "  ".into() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
session:
  enable_persistent_sessions: true
  persistent_session_scrollback: 500
  persistent_session_revive_process: never
  max_age_days: 3
  scrollback_source: surface

storage:
  scope:
    type: workspace
    id: "my-project"
  max_size_bytes: 1048576

restore:
  batch_size: 4
  batch_pacing_ms: 25

surface:
  cache_capacity: 5
  channel_timeout_ms: 2000

codec:
  compression_threshold: 2048
  algorithm: none
"#;

        let config = PersistenceSettings::from_yaml(yaml).unwrap();
        assert_eq!(config.session.persistent_session_scrollback, 500);
        assert_eq!(
            config.session.persistent_session_revive_process,
            ReviveProcessPolicy::Never
        );
        assert_eq!(config.session.scrollback_source, ScrollbackSource::Surface);
        assert_eq!(
            config.storage.scope.key(),
            "terminal-sessions/workspace/my-project"
        );
        assert_eq!(config.restore.batch_size, 4);
        // Unspecified fields keep their defaults
        assert_eq!(config.restore.settle_per_terminal_ms, 500);
        assert_eq!(config.surface.cache_capacity, 5);
        assert_eq!(config.surface.channel_timeout(), Duration::from_secs(2));
        assert_eq!(config.codec.algorithm, CompressionAlgorithm::None);
    }

    #[test]
    fn test_host_style_keys() {
        let yaml = r#"
session:
  enablePersistentSessions: false
  persistentSessionScrollback: 200
  persistentSessionReviveProcess: onExit
"#;

        let config = PersistenceSettings::from_yaml(yaml).unwrap();
        assert!(!config.session.enable_persistent_sessions);
        assert_eq!(config.session.persistent_session_scrollback, 200);
        assert_eq!(
            config.session.envelope_config().revive_process_policy,
            ReviveProcessPolicy::OnExit
        );
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let result = PersistenceSettings::from_yaml("session: [unclosed");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_global_scope_key() {
        assert_eq!(StorageScope::Global.key(), "terminal-sessions/global");
    }

    #[test]
    fn test_settle_delay_scales_with_count() {
        let restore = RestoreSettings::default();
        assert_eq!(restore.settle_delay(0), Duration::ZERO);
        assert_eq!(restore.settle_delay(3), Duration::from_millis(1500));
    }
}
