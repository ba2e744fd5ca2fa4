//! Process-local tier, useful for tests and throwaway deployments

use super::{validate_id, ImageStorage, StorageResult};
use crate::error::StorageError;
use crate::types::ImageRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Keeps records in a map; they carry whatever format tag they were saved with
#[derive(Default)]
pub struct MemoryStorage {
    records: RwLock<HashMap<String, ImageRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tier pre-populated with records
    pub fn with_records(records: impl IntoIterator<Item = ImageRecord>) -> Self {
        let records = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ImageStorage for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn save(&self, record: &ImageRecord) -> StorageResult<()> {
        validate_id(&record.id)?;
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> StorageResult<ImageRecord> {
        validate_id(id)?;
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        validate_id(id)?;
        self.records
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn list(&self) -> StorageResult<Vec<String>> {
        let mut ids: Vec<String> = self.records.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
