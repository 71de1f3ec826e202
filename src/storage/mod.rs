//! Local persistence layer.
//!
//! This module provides the portal's local storage:
//!
//! - A pluggable [`KeyValueStore`] interface (memory, file, SQLite)
//! - The [`RuleStore`] holding the automation rule collection
//!
//! All SQLite access runs via `tokio::task::spawn_blocking` to stay off the
//! async runtime threads.

mod kv;
mod rules;
mod sqlite;

pub use kv::{FileStore, KeyValueStore, MemoryStore, Result, StorageError};
pub use rules::{RuleStore, DEFAULT_RULES_KEY};
pub use sqlite::SqliteStore;
