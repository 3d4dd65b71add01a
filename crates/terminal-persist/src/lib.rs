//! Terminal session inspection library.
//!
//! This library contains the argument parser and subcommands behind the
//! `terminal-persist` binary. The binary itself is in main.rs.

pub mod cli;
pub mod commands;
pub mod schema;

// Re-export commonly used types
pub use cli::{Cli, Command};
pub use commands::Inspector;
pub use schema::{envelope_schema, SchemaDraft};
