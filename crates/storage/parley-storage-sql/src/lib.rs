//! Parley SQL storage
//!
//! SQLite implementation of the memory store contract.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-exports
pub use parley_core;

pub mod sqlite;

pub use sqlite::SqliteMemoryStore;
