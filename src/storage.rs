use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Flat string key-value storage, the stand-in for device storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
    async fn remove(&self, key: &str) -> Result<(), PersistenceError>;
}

/// All keys live in one JSON object on disk.
#[derive(Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, PersistenceError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(PersistenceError::Io(err)),
        };
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    /// Like [`Self::load`], but an unparsable file counts as empty so the
    /// next write replaces it.
    async fn load_for_write(&self) -> Result<BTreeMap<String, String>, PersistenceError> {
        match self.load().await {
            Err(PersistenceError::Json(error)) => {
                warn!(%error, path = %self.path.display(), "state file is not valid json, overwriting");
                Ok(BTreeMap::new())
            }
            other => other,
        }
    }

    async fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent).await?;
        }
        let payload = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, payload).await?;
        set_permissions(&self.path, 0o600).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let mut entries = self.load().await?;
        Ok(entries.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let mut entries = self.load_for_write().await?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        let mut entries = self.load_for_write().await?;
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.save(&entries).await
    }
}

/// Creates `path` private to the user. An existing directory keeps its mode.
async fn ensure_dir(path: &Path) -> Result<(), io::Error> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }
    if fs::metadata(path).await.is_ok_and(|meta| meta.is_dir()) {
        return Ok(());
    }
    fs::create_dir_all(path).await?;
    set_permissions(path, 0o700).await?;
    Ok(())
}

#[cfg(unix)]
async fn set_permissions(path: &Path, mode: u32) -> Result<(), io::Error> {
    use std::os::unix::fs::PermissionsExt;
    let perm = std::fs::Permissions::from_mode(mode);
    fs::set_permissions(path, perm).await
}

#[cfg(not(unix))]
async fn set_permissions(_path: &Path, _mode: u32) -> Result<(), io::Error> {
    Ok(())
}
