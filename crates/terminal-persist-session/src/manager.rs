//! Interface to the host's terminal lifecycle manager.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use terminal_persist_core::{CompanionKind, Result, TerminalId, TerminalSessionRecord};

/// Options for creating a terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateTerminalOptions {
    /// Display name
    pub name: String,

    /// Ordinal number shown in the UI
    pub ordinal_number: u32,

    /// Working directory, if known
    pub working_directory: Option<String>,
}

impl CreateTerminalOptions {
    /// Options that recreate a saved terminal.
    pub fn from_record(record: &TerminalSessionRecord) -> Self {
        Self {
            name: record.name.clone(),
            ordinal_number: record.ordinal_number,
            working_directory: (!record.working_directory.is_empty())
                .then(|| record.working_directory.clone()),
        }
    }
}

/// Options for deleting a terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Kill the process without asking
    pub force: bool,
}

/// Outcome of a delete request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Whether the terminal is gone
    pub success: bool,

    /// Why it is not
    pub reason: Option<String>,
}

impl DeleteOutcome {
    /// Terminal deleted.
    pub fn deleted() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    /// Terminal not deleted.
    pub fn refused(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
        }
    }
}

/// Options for reading scrollback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollbackOptions {
    /// Maximum lines to return, newest kept
    pub scrollback: Option<usize>,
}

/// A live terminal as reported by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalInfo {
    /// Terminal identifier
    pub id: TerminalId,

    /// Display name
    pub name: String,

    /// Ordinal number
    pub ordinal_number: u32,

    /// Working directory (empty when unknown)
    pub working_directory: String,

    /// Whether this is the active terminal
    pub is_active: bool,

    /// Detected companion process
    pub companion_process_type: Option<CompanionKind>,

    /// Last activity
    pub last_activity: DateTime<Utc>,
}

impl TerminalInfo {
    /// Build the saved record for this terminal.
    pub fn into_record(self, is_active: bool, scrollback: Option<Vec<String>>) -> TerminalSessionRecord {
        TerminalSessionRecord {
            id: self.id,
            name: self.name,
            ordinal_number: self.ordinal_number,
            working_directory: self.working_directory,
            is_active,
            scrollback,
            companion_process_type: self.companion_process_type,
            last_activity: self.last_activity,
        }
    }
}

/// The host's terminal lifecycle manager.
///
/// Creating, deleting and driving terminal processes is owned by the host;
/// the persistence service only talks to it through this trait.
#[async_trait]
pub trait TerminalManager: Send + Sync + fmt::Debug {
    /// Create a terminal. `None` means the host could not create one.
    async fn create_terminal(&self, options: CreateTerminalOptions) -> Option<TerminalId>;

    /// Delete a terminal.
    async fn delete_terminal(&self, id: &TerminalId, options: DeleteOptions) -> DeleteOutcome;

    /// Make a terminal the active one.
    async fn set_active_terminal(&self, id: &TerminalId);

    /// Live terminals, in display order.
    async fn terminals(&self) -> Vec<TerminalInfo>;

    /// The active terminal, if any.
    async fn active_terminal_id(&self) -> Option<TerminalId>;

    /// Write text into a terminal as if typed.
    async fn send_input(&self, id: &TerminalId, text: &str) -> Result<()>;

    /// Scrollback text of a terminal, newline separated.
    async fn scrollback_data(&self, id: &TerminalId, options: ScrollbackOptions) -> Option<String>;
}
