//! # terminal-persist-core
//!
//! Core types for terminal session persistence.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other terminal-persist crates. It provides:
//!
//! - Session types (TerminalId, TerminalSessionRecord, SessionEnvelope)
//! - Serialization payload types exchanged with the rendering surface
//! - Result shapes returned to callers (PersistenceResult, RestoreResult)
//! - The message protocol between the session authority and the surface
//! - Configuration types
//! - Error types
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other terminal-persist crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod payload;
pub mod protocol;
pub mod result;
pub mod session;

// Re-export commonly used types
pub use config::{
    CodecSettings, CompressionAlgorithm, ConfigError, PersistenceSettings, RestoreSettings,
    ScrollbackSource, SessionSettings, StorageScope, StorageSettings, SurfaceSettings,
};
pub use error::{Error, ErrorKind, Result};
pub use payload::{PayloadMetadata, SerializationPayload, SerializedTerminal, PAYLOAD_SCHEMA_VERSION};
pub use protocol::{HostMessage, RestoreTerminal, SessionInfoTerminal, SurfaceMessage};
pub use result::{
    CleanupResult, PersistenceResult, RestoreResult, SessionStats, SessionSummary, TerminalSummary,
};
pub use session::{
    CompanionKind, EnvelopeConfig, ReviveProcessPolicy, SessionEnvelope, TerminalId,
    TerminalSessionRecord, ENVELOPE_VERSION,
};
