//! Status notifications published by the persistence service.

use terminal_persist_core::Error;

/// Something the persistence service did.
///
/// Delivered in the order the service performed the operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceEvent {
    /// An envelope was written
    SessionSaved {
        /// Terminals written
        terminal_count: usize,
        /// Serialized size
        bytes: usize,
    },
    /// A restore finished
    SessionRestored {
        /// Terminals recreated
        restored_count: usize,
        /// Saved terminals not recreated
        skipped_count: usize,
    },
    /// An expired envelope was purged
    SessionExpired,
    /// The envelope was cleared on request
    SessionCleared,
    /// An operation failed
    OperationFailed {
        /// Operation name
        operation: &'static str,
        /// What went wrong
        error: Error,
    },
}
