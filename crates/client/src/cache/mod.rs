//! Directory-backed cache buckets.
//!
//! Every immediate subdirectory of the root is one named bucket. Deleting a
//! bucket removes its directory tree. A missing root means there are no buckets.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use freshwatch_core::Error;
use freshwatch_core::detector::CacheStorage;

#[derive(Debug, Clone)]
pub struct DirCacheStorage {
    root: PathBuf,
}

impl DirCacheStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_path(&self, name: &str) -> Result<PathBuf, Error> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(Error::InvalidInput(format!("invalid cache bucket name: {name:?}")));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait::async_trait]
impl CacheStorage for DirCacheStorage {
    async fn keys(&self) -> Result<Vec<String>, Error> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::CacheInvalidation(format!("{}: {e}", self.root.display()))),
        };

        let mut names = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(Error::CacheInvalidation(format!("{}: {e}", self.root.display()))),
            };
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        let path = self.bucket_path(name)?;
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                tracing::debug!(bucket = name, "removed cache bucket {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::CacheInvalidation(format!("{}: {e}", path.display()))),
        }
    }
}
