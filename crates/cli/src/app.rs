//! Wiring from configuration to store, detector and viewer.

use std::sync::Arc;

use freshwatch_client::{DirCacheStorage, FetchConfig, HttpVersionSource};
use freshwatch_core::detector::{CacheStorage, NoCacheStorage, UpdateSurface};
use freshwatch_core::viewer::LogFilter;
use freshwatch_core::{
    AppConfig, AuditLog, Collaborators, DetectorSettings, Error, KeyValueStore, LogViewer, SqliteStore,
    UpdateDetector, VersionStore,
};

use crate::reload::CommandReloader;

/// Everything a command needs, built once per invocation.
pub struct App {
    config: AppConfig,
    versions: VersionStore,
    audit: AuditLog,
}

impl App {
    /// Open the SQLite store at `config.db_path`.
    pub async fn open(config: AppConfig) -> Result<Self, Error> {
        let store = SqliteStore::open(&config.db_path).await?;
        tracing::debug!(db_path = %config.db_path.display(), "opened store");
        Ok(Self::with_store(config, Arc::new(store)))
    }

    pub fn with_store(config: AppConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self { config, versions: VersionStore::new(Arc::clone(&store)), audit: AuditLog::new(store) }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    pub fn detector(&self, surface: Arc<dyn UpdateSurface>) -> Result<Arc<UpdateDetector>, Error> {
        let source = HttpVersionSource::new(&self.config.version_url, FetchConfig::from_app_config(&self.config))?;
        let caches: Arc<dyn CacheStorage> = match &self.config.cache_dir {
            Some(dir) => Arc::new(DirCacheStorage::new(dir)),
            None => Arc::new(NoCacheStorage),
        };
        let collaborators = Collaborators {
            source: Arc::new(source),
            caches,
            host: Arc::new(CommandReloader::new(self.config.reload_command.clone())),
            surface,
        };

        Ok(Arc::new(UpdateDetector::new(
            self.versions.clone(),
            self.audit.clone(),
            collaborators,
            DetectorSettings::from_config(&self.config),
        )))
    }

    pub fn viewer(&self, filter: LogFilter) -> LogViewer {
        LogViewer::new(self.audit.clone()).with_filter(filter)
    }
}
