//! Append-only, capacity-bounded audit trail.
//!
//! Two independently bounded lists live in the key-value store as JSON
//! arrays, newest entry first:
//!
//! - update entries, at most [`UPDATE_LOG_CAPACITY`]
//! - error entries, at most [`ERROR_LOG_CAPACITY`]
//!
//! Appends evict the oldest entries and persist immediately. Reads never
//! fail: a missing, unreadable or corrupt list reads as empty, and single
//! entries that do not parse are skipped without losing the rest.

pub mod entry;

pub use entry::{AuditEntry, EntryKind, ErrorEntry, PageContext, UpdateAction, UpdateEntry};

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::Error;
use crate::store::{KeyValueStore, keys};

/// Maximum number of retained update entries.
pub const UPDATE_LOG_CAPACITY: usize = 50;

/// Maximum number of retained error entries.
pub const ERROR_LOG_CAPACITY: usize = 20;

/// Typed access to the persisted update and error lists.
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn KeyValueStore>,
    /// Serializes read-modify-write cycles on the lists.
    write_lock: Arc<Mutex<()>>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store, write_lock: Arc::new(Mutex::new(())) }
    }

    /// Record an update at the front of the update list.
    pub async fn append_update(&self, entry: UpdateEntry) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        let mut list: Vec<UpdateEntry> = self.read_list(keys::UPDATE_LOG).await;
        tracing::info!(version = %entry.version, action = %entry.action, "recording update");
        push_bounded(&mut list, entry, UPDATE_LOG_CAPACITY);
        self.write_list(keys::UPDATE_LOG, &list).await
    }

    /// Record a failure at the front of the error list.
    pub async fn append_error(&self, entry: ErrorEntry) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        let mut list: Vec<ErrorEntry> = self.read_list(keys::ERROR_LOG).await;
        tracing::error!(context = %entry.context, error = %entry.error_message, "recording error");
        push_bounded(&mut list, entry, ERROR_LOG_CAPACITY);
        self.write_list(keys::ERROR_LOG, &list).await
    }

    /// Update entries, newest first.
    pub async fn list_updates(&self) -> Vec<UpdateEntry> {
        self.read_list(keys::UPDATE_LOG).await
    }

    /// Error entries, newest first.
    pub async fn list_errors(&self) -> Vec<ErrorEntry> {
        self.read_list(keys::ERROR_LOG).await
    }

    /// Delete both lists. Irreversible; callers confirm with the user first.
    pub async fn clear_all(&self) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        self.store.remove(keys::UPDATE_LOG).await?;
        self.store.remove(keys::ERROR_LOG).await?;
        tracing::info!("audit log cleared");
        Ok(())
    }

    async fn read_list<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read audit list, treating as empty");
                return Vec::new();
            }
        };

        let elements: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(elements) => elements,
            Err(e) => {
                tracing::warn!(key, error = %e, "corrupt audit list, treating as empty");
                return Vec::new();
            }
        };

        let total = elements.len();
        let list: Vec<T> = elements
            .into_iter()
            .filter_map(|element| serde_json::from_value(element).ok())
            .collect();
        if list.len() < total {
            tracing::warn!(key, skipped = total - list.len(), "skipping unreadable audit entries");
        }
        list
    }

    async fn write_list<T: Serialize>(&self, key: &str, list: &[T]) -> Result<(), Error> {
        let json = serde_json::to_string(list).map_err(|e| Error::Storage(e.to_string()))?;
        self.store.set(key, &json).await
    }
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}

/// Insert at the front and drop whatever falls past `capacity`.
fn push_bounded<T>(list: &mut Vec<T>, entry: T, capacity: usize) {
    list.insert(0, entry);
    list.truncate(capacity);
}
