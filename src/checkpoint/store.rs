//! Checkpoint store trait and local backends

use super::object::ObjectStoreCheckpointStore;
use super::types::ParameterFile;
use crate::config::CheckpointConfig;
use crate::error::{Error, Result};
use crate::source::Cursor;
use crate::storage::ObjectLocation;
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;

/// Durable storage for one feed's cursor
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Stored cursor; `Ok(None)` only when the backend reports not-found
    async fn get_cursor(&self) -> Result<Option<Cursor>>;

    /// Overwrite the stored cursor; returns once the backend has persisted it
    async fn set_cursor(&self, cursor: &Cursor) -> Result<()>;

    /// Where the cursor lives, for logs
    fn describe(&self) -> String;
}

/// Build the store for one checkpoint parameter
pub fn checkpoint_store(
    config: &CheckpointConfig,
    parameter: &str,
) -> Result<Arc<dyn CheckpointStore>> {
    Ok(match config {
        CheckpointConfig::File { path } => Arc::new(FileCheckpointStore::new(path, parameter)),
        CheckpointConfig::ObjectStore { url } => Arc::new(ObjectStoreCheckpointStore::new(
            ObjectLocation::parse(url)?,
            parameter,
        )),
    })
}

// ============================================================================
// Memory
// ============================================================================

/// In-memory checkpoint (lost on exit)
#[derive(Debug, Default, Clone)]
pub struct MemoryCheckpointStore {
    cursor: Arc<RwLock<Option<Cursor>>>,
}

impl MemoryCheckpointStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding a cursor
    pub fn with_cursor(cursor: impl Into<String>) -> Self {
        Self {
            cursor: Arc::new(RwLock::new(Some(Cursor::new(cursor)))),
        }
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get_cursor(&self) -> Result<Option<Cursor>> {
        Ok(self.cursor.read().await.clone())
    }

    async fn set_cursor(&self, cursor: &Cursor) -> Result<()> {
        *self.cursor.write().await = Some(cursor.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

// ============================================================================
// File
// ============================================================================

/// One named parameter inside a JSON parameter file
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
    parameter: String,
}

impl FileCheckpointStore {
    /// Create a store for `parameter` inside the file at `path`
    pub fn new(path: impl AsRef<Path>, parameter: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            parameter: parameter.into(),
        }
    }

    /// Path of the parameter file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<ParameterFile> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ParameterFile::new()),
            Err(e) => {
                return Err(Error::store(format!(
                    "Failed to read checkpoint file {}: {e}",
                    self.path.display()
                )))
            }
        };

        serde_json::from_str(&contents).map_err(|e| {
            Error::store(format!(
                "Failed to parse checkpoint file {}: {e}",
                self.path.display()
            ))
        })
    }

    async fn save(&self, file: &ParameterFile) -> Result<()> {
        let contents = serde_json::to_string_pretty(file)
            .map_err(|e| Error::store(format!("Failed to serialize checkpoints: {e}")))?;

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::store(format!("Failed to create {}: {e}", parent.display())))?;

        // Write and flush a temp file, then rename over the old one
        let temp_path = self.path.with_extension("tmp");
        let mut temp = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::store(format!("Failed to create checkpoint file: {e}")))?;
        temp.write_all(contents.as_bytes())
            .await
            .map_err(|e| Error::store(format!("Failed to write checkpoint file: {e}")))?;
        temp.sync_all()
            .await
            .map_err(|e| Error::store(format!("Failed to sync checkpoint file: {e}")))?;
        drop(temp);

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::store(format!("Failed to rename checkpoint file: {e}")))?;

        // The rename is durable once the directory entry is
        #[cfg(unix)]
        tokio::fs::File::open(parent)
            .await
            .map_err(|e| Error::store(format!("Failed to open {}: {e}", parent.display())))?
            .sync_all()
            .await
            .map_err(|e| Error::store(format!("Failed to sync {}: {e}", parent.display())))?;

        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn get_cursor(&self) -> Result<Option<Cursor>> {
        let file = self.load().await?;
        Ok(file.get(&self.parameter).map(Cursor::new))
    }

    async fn set_cursor(&self, cursor: &Cursor) -> Result<()> {
        let mut file = self.load().await?;
        file.set(&self.parameter, cursor.as_str(), Utc::now());
        self.save(&file).await?;

        debug!(parameter = %self.parameter, path = %self.path.display(), "Checkpoint saved");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{}#{}", self.path.display(), self.parameter)
    }
}
