//! Object storage for exported project files and reports
//!
//! Keys are `/`-separated paths whose first segment is the bucket. Prefix
//! operations treat a key prefix as a directory.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid object key '{0}'")]
    InvalidKey(String),

    #[error("Object store I/O error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Exception type recorded on a failed execution
    pub fn kind_name(&self) -> &'static str {
        match self {
            StorageError::InvalidKey(_) => "ObjectStoreInvalidKey",
            StorageError::Io { .. } => "ObjectStoreIoError",
        }
    }
}

/// Object operations the export tasks need
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Remove every object under `prefix`; a missing prefix is not an error
    async fn delete_prefix(&self, prefix: &str) -> Result<(), StorageError>;

    /// Move every object under `from` to the same relative key under `to`
    ///
    /// Objects already under `to` are replaced. A missing `from` is a no-op.
    async fn move_prefix(&self, from: &str, to: &str) -> Result<(), StorageError>;

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn healthy(&self) -> bool;
}

/// Object store rooted in a local (or mounted) directory
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Filesystem path of a key, rejecting keys that escape the root
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key.trim_start_matches('/'));
        let mut path = self.root.clone();
        let mut segments = 0;

        for component in relative.components() {
            match component {
                Component::Normal(segment) => {
                    path.push(segment);
                    segments += 1;
                }
                Component::CurDir => {}
                _ => return Err(StorageError::InvalidKey(key.to_string())),
            }
        }

        if segments == 0 {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        Ok(path)
    }
}

fn io_error(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        key: key.to_string(),
        source,
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn delete_prefix(&self, prefix: &str) -> Result<(), StorageError> {
        let path = self.resolve(prefix)?;

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&path)
                .await
                .map_err(io_error(prefix))?,
            Ok(_) => tokio::fs::remove_file(&path).await.map_err(io_error(prefix))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(prefix)(e)),
        }

        debug!("Deleted objects under {}", prefix);
        Ok(())
    }

    async fn move_prefix(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;

        if !tokio::fs::try_exists(&source).await.map_err(io_error(from))? {
            debug!("Nothing to move under {}", from);
            return Ok(());
        }

        self.delete_prefix(to).await?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error(to))?;
        }
        tokio::fs::rename(&source, &target).await.map_err(io_error(from))?;

        debug!("Moved objects under {} to {}", from, to);
        Ok(())
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error(key))?;
        }
        tokio::fs::write(&path, body).await.map_err(io_error(key))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(key)(e)),
        }
    }

    async fn healthy(&self) -> bool {
        match tokio::fs::create_dir_all(&self.root).await {
            Ok(()) => {
                let marker = self.root.join(".ferry-health");
                if let Err(e) = tokio::fs::write(&marker, b"ok").await {
                    debug!("Object store root not writable: {}", e);
                    return false;
                }
                if let Err(e) = tokio::fs::remove_file(&marker).await {
                    warn!("Failed to remove health marker {}: {}", marker.display(), e);
                }
                true
            }
            Err(e) => {
                debug!("Object store root unavailable: {}", e);
                false
            }
        }
    }
}
