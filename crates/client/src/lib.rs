//! Client code for freshwatch.
//!
//! This crate provides the HTTP version metadata source and the
//! directory-backed cache storage the CLI hands to the detector.

pub mod cache;
pub mod fetch;

pub use cache::DirCacheStorage;
pub use fetch::{FetchConfig, HttpVersionSource};
