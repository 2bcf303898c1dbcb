//! Persistent key-value storage.
//!
//! The detector and the audit log only ever see the [`KeyValueStore`] trait:
//! single-key string reads and writes, last writer wins. Two backends ship
//! with the crate:
//!
//! - [`SqliteStore`]: durable, WAL-mode SQLite via tokio-rusqlite
//! - [`MemoryStore`]: process-local map for tests and ephemeral runs

pub mod connection;
pub mod memory;
pub mod migrations;

pub use crate::Error;

pub use connection::SqliteStore;
pub use memory::MemoryStore;

/// Names of the keys the detector and audit log persist under.
pub mod keys {
    /// Last version the client acknowledged.
    pub const STORED_VERSION: &str = "site_version";
    /// Auto-refresh preference (`"true"` / `"false"` / absent).
    pub const AUTO_REFRESH: &str = "auto_refresh";
    /// JSON array of update entries, newest first.
    pub const UPDATE_LOG: &str = "update_log";
    /// JSON array of error entries, newest first.
    pub const ERROR_LOG: &str = "error_log";
    /// RFC 3339 timestamp of the last completed metadata fetch.
    pub const LAST_CHECK: &str = "last_check_time";
}

/// String key-value store backing all durable state.
///
/// Every write is a single atomic set; there are no transactions across keys.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value. `Ok(None)` when the key was never set or was removed.
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<(), Error>;

    /// Remove a key. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), Error>;
}
