//! # terminal-persist-surface
//!
//! Rendering-surface side of terminal session persistence.
//!
//! This crate provides:
//! - `CacheManager`: a bounded LRU cache of live terminal buffers with
//!   auto-save and stale-entry cleanup timers
//! - `SerializationChannel`: the host-side single-slot request/response
//!   correlator used to pull buffer content from the surface
//! - `SurfaceEndpoint`: serves the host protocol against a cache
//!
//! ## Architecture
//!
//! This is Layer 2 - it depends on terminal-persist-core and
//! terminal-persist-storage, and is used by terminal-persist-session.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod cache;
pub mod channel;
pub mod endpoint;

// Re-export commonly used types
pub use buffer::{ScrollbackBuffer, TerminalBuffer};
pub use cache::{
    cache_key, AutoSaveReport, BufferHandle, CacheManager, RestoreOptions, SerializeOptions,
};
pub use channel::{SerializationChannel, SurfaceSender};
pub use endpoint::{AnnouncedSession, SurfaceEndpoint, SurfaceLink};
