//! Version metadata and the durable version/preference store.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::store::{KeyValueStore, keys};

/// Version metadata served by the content host.
///
/// Fetched fresh on every check and dropped when the check ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub version: String,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl VersionRecord {
    pub fn new(version: impl Into<String>) -> Self {
        Self { version: version.into(), last_updated: None }
    }
}

/// Whether a remote version counts as new content.
///
/// No baseline means everything is new. Otherwise any textual difference is
/// new, downgrades included.
pub fn has_new_content(remote: &str, stored: Option<&str>) -> bool {
    match stored {
        None => true,
        Some(local) => remote != local,
    }
}

/// Persisted answer to "refresh automatically when new content appears?".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdatePreference {
    #[default]
    Unset,
    AlwaysAutoRefresh,
    AlwaysManual,
}

impl UpdatePreference {
    fn from_stored(value: Option<&str>) -> Self {
        match value {
            Some("true") => UpdatePreference::AlwaysAutoRefresh,
            Some("false") => UpdatePreference::AlwaysManual,
            _ => UpdatePreference::Unset,
        }
    }

    fn as_stored(self) -> Option<&'static str> {
        match self {
            UpdatePreference::Unset => None,
            UpdatePreference::AlwaysAutoRefresh => Some("true"),
            UpdatePreference::AlwaysManual => Some("false"),
        }
    }
}

impl fmt::Display for UpdatePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UpdatePreference::Unset => "unset",
            UpdatePreference::AlwaysAutoRefresh => "always-auto-refresh",
            UpdatePreference::AlwaysManual => "always-manual",
        })
    }
}

/// Stored version, refresh preference and last-check time.
#[derive(Clone)]
pub struct VersionStore {
    store: Arc<dyn KeyValueStore>,
}

impl VersionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Last acknowledged version, `None` when no baseline exists yet.
    pub async fn stored_version(&self) -> Result<Option<String>, Error> {
        self.store.get(keys::STORED_VERSION).await
    }

    pub async fn set_stored_version(&self, version: &str) -> Result<(), Error> {
        self.store.set(keys::STORED_VERSION, version).await?;
        tracing::debug!(version, "stored version updated");
        Ok(())
    }

    pub async fn clear_stored_version(&self) -> Result<(), Error> {
        self.store.remove(keys::STORED_VERSION).await
    }

    /// Unrecognized stored values read as `Unset`.
    pub async fn preference(&self) -> Result<UpdatePreference, Error> {
        let raw = self.store.get(keys::AUTO_REFRESH).await?;
        Ok(UpdatePreference::from_stored(raw.as_deref()))
    }

    pub async fn set_preference(&self, preference: UpdatePreference) -> Result<(), Error> {
        match preference.as_stored() {
            Some(value) => self.store.set(keys::AUTO_REFRESH, value).await?,
            None => self.store.remove(keys::AUTO_REFRESH).await?,
        }
        tracing::debug!(%preference, "refresh preference updated");
        Ok(())
    }

    /// Time of the last completed metadata fetch. Unparseable values read as `None`.
    pub async fn last_check(&self) -> Result<Option<DateTime<Utc>>, Error> {
        let raw = self.store.get(keys::LAST_CHECK).await?;
        Ok(raw
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    pub async fn set_last_check(&self, at: DateTime<Utc>) -> Result<(), Error> {
        self.store.set(keys::LAST_CHECK, &at.to_rfc3339()).await
    }

    /// Forget the stored version, preference and last-check time.
    pub async fn reset(&self) -> Result<(), Error> {
        self.store.remove(keys::STORED_VERSION).await?;
        self.store.remove(keys::LAST_CHECK).await?;
        self.store.remove(keys::AUTO_REFRESH).await?;
        Ok(())
    }
}

impl fmt::Debug for VersionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionStore").finish_non_exhaustive()
    }
}
