//! Durable storage tiers
//!
//! Every backend implements [`ImageStorage`]; the service treats the primary
//! and secondary tier identically through it.

mod filesystem;
mod memory;
mod object;

pub use filesystem::FileSystemStorage;
pub use memory::MemoryStorage;
pub use object::{ObjectStorage, S3Config};

use crate::error::StorageError;
use crate::types::ImageRecord;
use async_trait::async_trait;

/// File extension used for durable records
pub(crate) const RECORD_EXTENSION: &str = "webp";

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Key/blob store backing one tier
#[async_trait]
pub trait ImageStorage: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Persist a record, overwriting any durable record with the same id
    async fn save(&self, record: &ImageRecord) -> StorageResult<()>;

    /// Fetch a record; absent ids yield [`StorageError::NotFound`]
    async fn get(&self, id: &str) -> StorageResult<ImageRecord>;

    /// Remove a record; absent ids may yield [`StorageError::NotFound`]
    async fn delete(&self, id: &str) -> StorageResult<()>;

    /// Ids of every durable record
    async fn list(&self) -> StorageResult<Vec<String>>;
}

/// Reject ids that cannot be used as a storage key
pub(crate) fn validate_id(id: &str) -> StorageResult<()> {
    if id.is_empty()
        || id.contains('/')
        || id.contains('\\')
        || id.contains("..")
        || id.chars().any(char::is_control)
    {
        return Err(StorageError::InvalidId(id.to_string()));
    }
    Ok(())
}
