//! Object store checkpoint backend

use super::store::CheckpointStore;
use crate::error::{Error, Result};
use crate::source::Cursor;
use crate::storage::ObjectLocation;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

/// One object per parameter, holding the raw cursor string
#[derive(Debug, Clone)]
pub struct ObjectStoreCheckpointStore {
    location: ObjectLocation,
    parameter: String,
}

impl ObjectStoreCheckpointStore {
    /// Create a store for `parameter` under `location`
    pub fn new(location: ObjectLocation, parameter: impl Into<String>) -> Self {
        Self {
            location,
            parameter: parameter.into(),
        }
    }
}

#[async_trait]
impl CheckpointStore for ObjectStoreCheckpointStore {
    async fn get_cursor(&self) -> Result<Option<Cursor>> {
        let data = self.location.get(&self.parameter).await.map_err(|e| {
            Error::store(format!("Failed to read {}: {e}", self.describe()))
        })?;

        data.map(|bytes| {
            String::from_utf8(bytes.to_vec())
                .map(Cursor::new)
                .map_err(|e| Error::store(format!("Checkpoint {} is not UTF-8: {e}", self.describe())))
        })
        .transpose()
    }

    async fn set_cursor(&self, cursor: &Cursor) -> Result<()> {
        self.location
            .put(&self.parameter, Bytes::from(cursor.as_str().to_owned()))
            .await
            .map_err(|e| Error::store(format!("Failed to write {}: {e}", self.describe())))?;

        debug!(parameter = %self.parameter, "Checkpoint saved");
        Ok(())
    }

    fn describe(&self) -> String {
        self.location.display(&self.parameter)
    }
}
