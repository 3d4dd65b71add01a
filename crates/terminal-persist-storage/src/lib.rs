//! # terminal-persist-storage
//!
//! Storage layer for terminal session persistence.
//!
//! This crate provides:
//! - The session codec (compression above a threshold, scrollback trimming)
//! - The stored representation of a session envelope
//! - Key-value store backends (file and in-memory)
//! - `SessionStore`, which binds a backend to a storage scope and size ceiling
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on terminal-persist-core
//! and is used by both the surface and the session crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod file;
pub mod memory;
pub mod store;
pub mod stored;

// Re-export commonly used types
pub use codec::{
    optimize_scrollback, split_lines, ContentCodec, EncodedContent, GzipCodec, PassthroughCodec,
    SessionCodec, GZIP_BASE64_ENCODING, IDENTITY_ENCODING,
};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::{KeyValueStore, SessionStore};
pub use stored::{StoredEnvelope, StoredRecord, StoredScrollback};
