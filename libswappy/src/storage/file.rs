//! JSON file backed key-value store
//!
//! # File Format
//!
//! - Location: `storage.path` from the config (default `~/.local/share/swappy/session.json`)
//! - Contents: one JSON object mapping keys to string values
//! - Permissions: 600 (owner read/write only) on Unix systems
//!
//! Every mutation rewrites the whole file through a temporary sibling and
//! an atomic rename, so readers see either the old or the new contents.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{Result, StorageError};
use crate::storage::KeyValueStore;

type Entries = BTreeMap<String, String>;

pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Entries> {
        match tokio::fs::symlink_metadata(&self.path).await {
            Ok(metadata) if metadata.is_symlink() => {
                return Err(StorageError::Symlink(self.path.display().to_string()).into());
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => return Err(StorageError::Io(e).into()),
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(StorageError::Io)?;
        if content.trim().is_empty() {
            return Ok(Entries::new());
        }
        let entries = serde_json::from_str(&content).map_err(StorageError::Serialization)?;
        Ok(entries)
    }

    async fn persist(&self, entries: &Entries) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(StorageError::Io)?;
            }
        }

        let json = serde_json::to_vec_pretty(entries).map_err(StorageError::Serialization)?;
        let tmp_path = self.tmp_path();

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&tmp_path).await.map_err(StorageError::Io)?;

        // `mode` only applies on creation; a leftover temp file keeps its own
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(StorageError::Io)?;
        }

        file.write_all(&json).await.map_err(StorageError::Io)?;
        file.sync_all().await.map_err(StorageError::Io)?;
        drop(file);

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(StorageError::Io)?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "store".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Apply `mutate` under the write lock; persist only if it reports a change
    async fn update<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Entries) -> bool + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        if mutate(&mut entries) {
            self.persist(&entries).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.load().await?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string()).as_deref() != Some(value)
        })
        .await?;
        tracing::debug!("Stored '{}' in {:?}", key, self.path);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| entries.remove(key).is_some()).await?;
        tracing::debug!("Removed '{}' from {:?}", key, self.path);
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<()> {
        self.update(|entries| {
            let mut changed = false;
            for key in keys {
                changed |= entries.remove(*key).is_some();
            }
            changed
        })
        .await?;
        tracing::debug!("Removed {} keys from {:?}", keys.len(), self.path);
        Ok(())
    }

    async fn set_many(&self, pairs: &[(&str, &str)]) -> Result<()> {
        self.update(|entries| {
            for (key, value) in pairs {
                entries.insert(key.to_string(), value.to_string());
            }
            !pairs.is_empty()
        })
        .await
    }

    fn backend_name(&self) -> &str {
        "file"
    }
}
