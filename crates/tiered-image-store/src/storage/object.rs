//! S3-compatible object store tier (AWS S3, MinIO, R2, ...)

use super::{validate_id, ImageStorage, StorageResult, RECORD_EXTENSION};
use crate::types::{ImageRecord, CANONICAL_CONTENT_TYPE, CANONICAL_FORMAT};
use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload};
use std::sync::Arc;
use tracing::{debug, info};

/// Connection settings for an S3-compatible bucket
#[derive(Debug, Clone)]
pub struct S3Config {
    /// `host:port` or a full URL
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    pub use_ssl: bool,
    pub prefix: Option<String>,
}

impl S3Config {
    fn endpoint_url(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else if self.use_ssl {
            format!("https://{}", self.endpoint)
        } else {
            format!("http://{}", self.endpoint)
        }
    }
}

/// Stores each record as the object `<prefix>/<id>.webp`
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    prefix: ObjectPath,
}

impl ObjectStorage {
    /// Wrap any object store implementation
    pub fn new(store: Arc<dyn ObjectStore>, prefix: &str) -> Self {
        Self {
            store,
            prefix: ObjectPath::from(prefix),
        }
    }

    /// Connect to an S3-compatible bucket. The bucket must already exist.
    pub fn from_s3(config: &S3Config) -> StorageResult<Self> {
        let store = AmazonS3Builder::new()
            .with_endpoint(config.endpoint_url())
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_access_key_id(&config.access_key)
            .with_secret_access_key(&config.secret_key)
            .with_allow_http(!config.use_ssl)
            .build()?;

        info!(
            endpoint = %config.endpoint,
            bucket = %config.bucket,
            "Object storage initialized"
        );
        Ok(Self::new(
            Arc::new(store),
            config.prefix.as_deref().unwrap_or_default(),
        ))
    }

    fn object_path(&self, id: &str) -> StorageResult<ObjectPath> {
        validate_id(id)?;
        Ok(self
            .prefix
            .child(format!("{}.{}", id, RECORD_EXTENSION)))
    }
}

#[async_trait]
impl ImageStorage for ObjectStorage {
    fn name(&self) -> &'static str {
        "object-store"
    }

    async fn save(&self, record: &ImageRecord) -> StorageResult<()> {
        let path = self.object_path(&record.id)?;

        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(CANONICAL_CONTENT_TYPE),
        );
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&path, PutPayload::from(record.data.clone()), opts)
            .await?;

        debug!(id = %record.id, path = %path, "Stored record in object store");
        Ok(())
    }

    async fn get(&self, id: &str) -> StorageResult<ImageRecord> {
        let path = self.object_path(id)?;
        let data = self.store.get(&path).await?.bytes().await?;
        Ok(ImageRecord::new(id, data, CANONICAL_FORMAT))
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        let path = self.object_path(id)?;
        self.store.delete(&path).await?;
        Ok(())
    }

    async fn list(&self) -> StorageResult<Vec<String>> {
        let prefix = (!self.prefix.as_ref().is_empty()).then_some(&self.prefix);
        let objects: Vec<_> = self.store.list(prefix).try_collect().await?;

        let suffix = format!(".{}", RECORD_EXTENSION);
        let mut ids: Vec<String> = objects
            .iter()
            .filter_map(|meta| {
                let mut parts = meta.location.prefix_match(&self.prefix)?;
                let name = parts.next()?;
                // Records sit directly under the prefix
                if parts.next().is_some() {
                    return None;
                }
                let id = name.as_ref().strip_suffix(suffix.as_str())?.to_string();
                Some(id)
            })
            .collect();
        ids.sort();
        Ok(ids)
    }
}
