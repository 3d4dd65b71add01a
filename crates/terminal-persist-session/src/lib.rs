//! # terminal-persist-session
//!
//! Session persistence orchestration.
//!
//! This crate provides:
//! - `PersistenceService`, which saves live terminals and restores them
//! - `PersistenceHandle`, a cloneable handle to a spawned service
//! - The batch restore engine
//! - The `TerminalManager` trait the host implements
//! - Scripted test doubles for hosts and surfaces
//!
//! ## Architecture
//!
//! This is Layer 3 in the architecture - it depends on terminal-persist-core,
//! terminal-persist-storage and terminal-persist-surface.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod events;
pub mod handle;
pub mod manager;
pub mod persistence;
pub mod testing;

// Re-export commonly used types
pub use batch::{companion_notice, BatchOutcome, BatchRestorer, RestoredTerminal};
pub use events::PersistenceEvent;
pub use handle::{PersistenceHandle, ServiceClosed};
pub use manager::{
    CreateTerminalOptions, DeleteOptions, DeleteOutcome, ScrollbackOptions, TerminalInfo,
    TerminalManager,
};
pub use persistence::PersistenceService;
