//! Error types for terminal session persistence.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for persistence operations.
///
/// Every variant corresponds to one entry of the error taxonomy and carries a
/// human-readable message. The type is `Clone` and serializable so it can
/// travel inside [`crate::PersistenceResult`] and [`crate::RestoreResult`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Error {
    /// Session data could not be serialized
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Stored session data could not be deserialized
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// The session store rejected a read, write or delete
    #[error("Storage access failed: {0}")]
    StorageAccessFailed(String),

    /// The rendering surface is detached, timed out or rejected a message
    #[error("Surface communication failed: {0}")]
    SurfaceCommunicationFailed(String),

    /// The stored session is older than the retention window
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Terminal not found by identifier
    #[error("Terminal not found: {0}")]
    TerminalNotFound(String),

    /// Data has an unexpected shape
    #[error("Invalid data format: {0}")]
    InvalidDataFormat(String),

    /// Content could not be compressed or decompressed
    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    /// The storage backend has no space left
    #[error("Storage full: {0}")]
    StorageFull(String),

    /// The operation was abandoned through its cancellation token
    #[error("Operation cancelled: {0}")]
    OperationCancelled(String),
}

impl Error {
    /// Get the taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SerializationFailed(_) => ErrorKind::SerializationFailed,
            Error::DeserializationFailed(_) => ErrorKind::DeserializationFailed,
            Error::StorageAccessFailed(_) => ErrorKind::StorageAccessFailed,
            Error::SurfaceCommunicationFailed(_) => ErrorKind::SurfaceCommunicationFailed,
            Error::SessionExpired(_) => ErrorKind::SessionExpired,
            Error::TerminalNotFound(_) => ErrorKind::TerminalNotFound,
            Error::InvalidDataFormat(_) => ErrorKind::InvalidDataFormat,
            Error::CompressionFailed(_) => ErrorKind::CompressionFailed,
            Error::StorageFull(_) => ErrorKind::StorageFull,
            Error::OperationCancelled(_) => ErrorKind::OperationCancelled,
        }
    }

    /// Get the message carried by this error.
    pub fn message(&self) -> &str {
        match self {
            Error::SerializationFailed(m)
            | Error::DeserializationFailed(m)
            | Error::StorageAccessFailed(m)
            | Error::SurfaceCommunicationFailed(m)
            | Error::SessionExpired(m)
            | Error::TerminalNotFound(m)
            | Error::InvalidDataFormat(m)
            | Error::CompressionFailed(m)
            | Error::StorageFull(m)
            | Error::OperationCancelled(m) => m,
        }
    }
}

/// Error taxonomy without payload, for matching and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// See [`Error::SerializationFailed`]
    SerializationFailed,
    /// See [`Error::DeserializationFailed`]
    DeserializationFailed,
    /// See [`Error::StorageAccessFailed`]
    StorageAccessFailed,
    /// See [`Error::SurfaceCommunicationFailed`]
    SurfaceCommunicationFailed,
    /// See [`Error::SessionExpired`]
    SessionExpired,
    /// See [`Error::TerminalNotFound`]
    TerminalNotFound,
    /// See [`Error::InvalidDataFormat`]
    InvalidDataFormat,
    /// See [`Error::CompressionFailed`]
    CompressionFailed,
    /// See [`Error::StorageFull`]
    StorageFull,
    /// See [`Error::OperationCancelled`]
    OperationCancelled,
}

impl ErrorKind {
    /// Stable code string, e.g. `STORAGE_FULL`.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::SerializationFailed => "SERIALIZATION_FAILED",
            ErrorKind::DeserializationFailed => "DESERIALIZATION_FAILED",
            ErrorKind::StorageAccessFailed => "STORAGE_ACCESS_FAILED",
            ErrorKind::SurfaceCommunicationFailed => "SURFACE_COMMUNICATION_FAILED",
            ErrorKind::SessionExpired => "SESSION_EXPIRED",
            ErrorKind::TerminalNotFound => "TERMINAL_NOT_FOUND",
            ErrorKind::InvalidDataFormat => "INVALID_DATA_FORMAT",
            ErrorKind::CompressionFailed => "COMPRESSION_FAILED",
            ErrorKind::StorageFull => "STORAGE_FULL",
            ErrorKind::OperationCancelled => "OPERATION_CANCELLED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
