//! Collaborator traits the detector drives.
//!
//! Each external capability (transport, cache storage, reload, user-facing
//! surfaces) sits behind one narrow trait so the state machine never depends
//! on a concrete runtime.

use crate::Error;
use crate::version::{UpdatePreference, VersionRecord};

/// Source of the current remote version metadata.
#[async_trait::async_trait]
pub trait VersionSource: Send + Sync {
    /// Fetch fresh metadata, bypassing any intermediate caches.
    async fn fetch(&self) -> Result<VersionRecord, Error>;
}

/// Named client-side cache buckets.
#[async_trait::async_trait]
pub trait CacheStorage: Send + Sync {
    /// Names of all existing buckets.
    async fn keys(&self) -> Result<Vec<String>, Error>;

    /// Delete one bucket. Returns `false` if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, Error>;
}

/// Cache storage for runtimes that have none. Invalidation is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCacheStorage;

#[async_trait::async_trait]
impl CacheStorage for NoCacheStorage {
    async fn keys(&self) -> Result<Vec<String>, Error> {
        Ok(Vec::new())
    }

    async fn delete(&self, _name: &str) -> Result<bool, Error> {
        Ok(false)
    }
}

/// Host able to reload the content after caches were invalidated.
#[async_trait::async_trait]
pub trait PageHost: Send + Sync {
    async fn reload(&self) -> Result<(), Error>;
}

/// The three answers the confirm dialog offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshChoice {
    RefreshNow,
    AlwaysAutoRefresh,
    Defer,
}

/// The user's answer to "new content is available, refresh?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub choice: RefreshChoice,
    /// Persist the answer as the refresh preference.
    pub remember: bool,
}

impl Confirmation {
    pub fn new(choice: RefreshChoice, remember: bool) -> Self {
        Self { choice, remember }
    }

    pub fn wants_refresh(&self) -> bool {
        !matches!(self.choice, RefreshChoice::Defer)
    }

    /// Preference to store, if the user asked to remember the answer.
    pub fn remembered_preference(&self) -> Option<UpdatePreference> {
        if !self.remember {
            return None;
        }
        Some(match self.choice {
            RefreshChoice::AlwaysAutoRefresh => UpdatePreference::AlwaysAutoRefresh,
            RefreshChoice::RefreshNow | RefreshChoice::Defer => UpdatePreference::AlwaysManual,
        })
    }
}

/// User-facing surfaces: banner, confirm dialog, progress and error panels.
#[async_trait::async_trait]
pub trait UpdateSurface: Send + Sync {
    /// Show the "new content available" banner.
    async fn notify_update(&self, record: &VersionRecord);

    /// Ask whether to refresh now, always, or later.
    async fn confirm_refresh(&self, record: &VersionRecord) -> Result<Confirmation, Error>;

    /// Show the blocking "refreshing" indicator.
    async fn show_refresh_indicator(&self);

    async fn hide_refresh_indicator(&self) {}

    /// Offer retry / manual reload after a failed refresh.
    async fn show_refresh_error(&self, message: &str);
}
