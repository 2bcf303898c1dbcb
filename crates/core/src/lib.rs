//! Core types and shared functionality for freshwatch.
//!
//! This crate provides:
//! - The update detection state machine
//! - Bounded audit log and its viewer
//! - Key-value persistence with SQLite and in-memory backends
//! - Unified error types
//! - Configuration structures

pub mod audit;
pub mod config;
pub mod detector;
pub mod error;
pub mod store;
pub mod version;
pub mod viewer;

pub use audit::{AuditLog, ErrorEntry, PageContext, UpdateAction, UpdateEntry};
pub use config::AppConfig;
pub use detector::{CheckOutcome, Collaborators, DetectorSettings, DetectorState, UpdateDetector};
pub use error::{Error, ErrorCategory};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use version::{UpdatePreference, VersionRecord, VersionStore};
pub use viewer::{LogExport, LogStats, LogViewer};
