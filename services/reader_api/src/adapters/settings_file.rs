//! services/reader_api/src/adapters/settings_file.rs
//!
//! A `KeyValueStore` backed by one JSON file per key, scoped to a single
//! user's device directory.

use async_trait::async_trait;
use reading_session_core::ports::{KeyValueStore, PortError, PortResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The store for one user under the shared settings root.
    pub fn for_user(root: &Path, user_id: Uuid) -> Self {
        Self::new(root.join(user_id.to_string()))
    }

    fn path_for(&self, key: &str) -> PortResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(PortError::Unexpected(format!("Invalid storage key '{}'", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PortError::Unexpected(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        let path = self.path_for(key)?;
        let write_error =
            |e: std::io::Error| PortError::Unexpected(format!("Failed to write {}: {}", path.display(), e));

        tokio::fs::create_dir_all(&self.dir).await.map_err(write_error)?;
        // Write beside the target and rename so readers never see a half-written record.
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, value).await.map_err(write_error)?;
        tokio::fs::rename(&staging, &path).await.map_err(write_error)?;
        Ok(())
    }
}
