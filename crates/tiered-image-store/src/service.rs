//! Cache and tier orchestration
//!
//! [`ImageService`] answers add/get/delete/list by coordinating the bounded
//! cache, the normalizer and the primary/secondary storage tiers. The cache
//! lock is only ever held for in-memory work; tier I/O and format conversion
//! happen with the lock released.

use crate::cache::{strip_trailing_extension, BoundedCache};
use crate::error::{ImageStoreError, NormalizeError, Result, StorageError};
use crate::normalizer::{self, is_canonical};
use crate::storage::{ImageStorage, StorageResult};
use crate::types::{
    CacheStats, ImageRecord, Ingested, Lookup, ServiceConfig, TierKind, CANONICAL_FORMAT,
};
use bytes::Bytes;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Single shared entry point over cache, normalizer and storage tiers
pub struct ImageService {
    cache: RwLock<BoundedCache>,
    primary: Arc<dyn ImageStorage>,
    secondary: Option<Arc<dyn ImageStorage>>,
    tier_timeout: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ImageService {
    pub fn new(
        primary: Arc<dyn ImageStorage>,
        secondary: Option<Arc<dyn ImageStorage>>,
        config: ServiceConfig,
    ) -> Self {
        info!(
            primary = primary.name(),
            secondary = secondary.as_ref().map(|s| s.name()).unwrap_or("none"),
            max_count = config.limits.max_count,
            max_bytes = config.limits.max_bytes,
            "Image service initialized"
        );

        Self {
            cache: RwLock::new(BoundedCache::new(config.limits)),
            primary,
            secondary,
            tier_timeout: config.tier_timeout,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Admit a record into the cache, converting it to the canonical format
    /// first when it decodes as an image.
    ///
    /// This does not write through: nothing reaches a storage tier until the
    /// caller invokes [`ImageService::persist`], or until a later read-through
    /// from the secondary tier writes it back to primary.
    pub async fn add(&self, record: ImageRecord) -> Result<()> {
        let record = canonicalize(record).await?;
        let id = record.id.clone();
        let size = record.size();

        let evicted = self.cache.write().await.put(record)?;
        debug!(id = %id, size, evicted = evicted.len(), "Cached image");
        Ok(())
    }

    /// Ingest an uploaded file. The payload must be an image; its id is the
    /// file's base name without extension.
    pub async fn ingest(&self, file_name: &str, raw: Bytes) -> Result<Ingested> {
        let (record, ingested) = normalize_upload(file_name, raw).await?;
        self.add(record).await?;

        info!(id = %ingested.id, source_format = %ingested.source_format, "Ingested image");
        Ok(ingested)
    }

    /// [`ImageService::ingest`], then save the converted record to primary.
    ///
    /// The record saved is the one converted here, so a concurrent eviction
    /// from the cache cannot lose the upload.
    pub async fn ingest_persisted(&self, file_name: &str, raw: Bytes) -> Result<Ingested> {
        let (record, ingested) = normalize_upload(file_name, raw).await?;
        self.add(record.clone()).await?;

        self.within_deadline(self.primary.save(&record))
            .await
            .map_err(|e| ImageStoreError::from_tier(TierKind::Primary, &record.id, e))?;

        info!(
            id = %ingested.id,
            source_format = %ingested.source_format,
            "Ingested and persisted image"
        );
        Ok(ingested)
    }

    /// Explicitly save a cached record (exact id) to the primary tier
    pub async fn persist(&self, id: &str) -> Result<()> {
        let record = self
            .cache
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ImageStoreError::NotFound {
                id: id.to_string(),
                tier: TierKind::Cache,
            })?;

        self.within_deadline(self.primary.save(&record))
            .await
            .map_err(|e| ImageStoreError::from_tier(TierKind::Primary, id, e))?;
        debug!(id = %id, "Persisted image to primary storage");
        Ok(())
    }

    /// Look up an image: cache (extension-insensitive), then primary, then secondary.
    ///
    /// Tier hits are converted and cached. A secondary hit is also written back
    /// to primary on a best-effort basis.
    pub async fn get(&self, id: &str) -> Result<ImageRecord> {
        self.lookup(id).await.map(|found| found.record)
    }

    /// [`ImageService::get`], also reporting which layer answered
    pub async fn lookup(&self, id: &str) -> Result<Lookup> {
        let cached = self.cache.read().await.find_by_stem(id).cloned();
        if let Some(record) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(id = %id, cached_id = %record.id, "Cache hit");
            let record = self.refresh_cached(record).await?;
            return Ok(Lookup::new(record, TierKind::Cache));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let primary_err = match self.within_deadline(self.primary.get(id)).await {
            Ok(record) => {
                let record = self.admit_read_through(TierKind::Primary, record).await?;
                return Ok(Lookup::new(record, TierKind::Primary));
            }
            Err(e) => e,
        };
        debug!(id = %id, error = %primary_err, "Primary tier miss");

        let Some(secondary) = &self.secondary else {
            return Err(ImageStoreError::from_tier(TierKind::Primary, id, primary_err));
        };

        info!(id = %id, "Image not found in primary storage, trying secondary storage");
        let record = match self.within_deadline(secondary.get(id)).await {
            Ok(record) => record,
            Err(e) => {
                info!(id = %id, error = %e, "Image not found in secondary storage");
                return Err(ImageStoreError::from_tier(TierKind::Secondary, id, e));
            }
        };

        let record = self.admit_read_through(TierKind::Secondary, record).await?;
        if let Err(e) = self.within_deadline(self.primary.save(&record)).await {
            warn!(
                id = %id,
                error = %e,
                "Failed to save to primary storage after retrieving from secondary"
            );
        }
        Ok(Lookup::new(record, TierKind::Secondary))
    }

    /// Drop the cached copy, then delete from primary (surfaced) and
    /// secondary (logged only).
    ///
    /// The cache removal is not rolled back if primary fails. Deleting an id
    /// that no tier knows about succeeds.
    pub async fn delete(&self, id: &str) -> Result<()> {
        if let Some(removed) = self.cache.write().await.delete(id) {
            debug!(id = %id, size = removed.size(), "Removed image from cache");
        }

        match self.within_deadline(self.primary.delete(id)).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(id = %id, "Primary storage had nothing to delete");
            }
            Err(e) => return Err(ImageStoreError::from_tier(TierKind::Primary, id, e)),
        }

        if let Some(secondary) = &self.secondary {
            match self.within_deadline(secondary.delete(id)).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!(id = %id, "Secondary storage had nothing to delete");
                }
                Err(e) => {
                    warn!(
                        id = %id,
                        error = %e,
                        "Failed to delete image from secondary storage"
                    );
                }
            }
        }

        Ok(())
    }

    /// Snapshot of the cached records (not tier contents), newest first
    pub async fn list(&self) -> Vec<ImageRecord> {
        self.cache.read().await.records()
    }

    /// Ids known to one tier; [`TierKind::Cache`] lists the cache
    pub async fn list_tier(&self, tier: TierKind) -> Result<Vec<String>> {
        let storage = match tier {
            TierKind::Cache => return Ok(self.cache.read().await.list()),
            TierKind::Primary => &self.primary,
            TierKind::Secondary => self
                .secondary
                .as_ref()
                .ok_or(ImageStoreError::TierNotConfigured(TierKind::Secondary))?,
        };

        self.within_deadline(storage.list())
            .await
            .map_err(|source| ImageStoreError::Storage { tier, source })
    }

    pub async fn stats(&self) -> CacheStats {
        let cache = self.cache.read().await;
        let limits = cache.limits();
        CacheStats {
            entries: cache.len(),
            total_size: cache.total_bytes(),
            max_entries: limits.max_count,
            max_size: limits.max_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Convert a non-canonical cache hit and store the result back, unless the
    /// entry was replaced or removed while the conversion ran.
    async fn refresh_cached(&self, record: ImageRecord) -> Result<ImageRecord> {
        if record.is_canonical() {
            return Ok(record);
        }

        let original = record.data.clone();
        let converted = canonicalize(record).await?;
        if !converted.is_canonical() {
            return Ok(converted);
        }

        let mut cache = self.cache.write().await;
        let unchanged = cache
            .get(&converted.id)
            .is_some_and(|current| current.data == original);
        if unchanged {
            if let Err(e) = cache.put(converted.clone()) {
                debug!(
                    id = %converted.id,
                    error = %e,
                    "Converted image no longer fits in cache"
                );
            }
        }
        Ok(converted)
    }

    /// Convert a tier hit and cache it under both bounds. A record too large
    /// for the cache is still returned.
    async fn admit_read_through(
        &self,
        tier: TierKind,
        record: ImageRecord,
    ) -> Result<ImageRecord> {
        let record = canonicalize(record).await?;

        let admitted = self.cache.write().await.put(record.clone());
        match admitted {
            Ok(evicted) => debug!(
                id = %record.id,
                tier = %tier,
                evicted = evicted.len(),
                "Cached image from tier"
            ),
            Err(e) => debug!(
                id = %record.id,
                tier = %tier,
                error = %e,
                "Serving image without caching it"
            ),
        }
        Ok(record)
    }

    async fn within_deadline<T>(
        &self,
        call: impl Future<Output = StorageResult<T>>,
    ) -> StorageResult<T> {
        match self.tier_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or_else(|_| Err(StorageError::Timeout(limit))),
            None => call.await,
        }
    }
}

/// Derive the id from an upload's file name and convert the payload, which
/// must be an image.
async fn normalize_upload(file_name: &str, raw: Bytes) -> Result<(ImageRecord, Ingested)> {
    let base_name = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let id = strip_trailing_extension(base_name);
    if id.is_empty() {
        return Err(ImageStoreError::InvalidId(file_name.to_string()));
    }
    let id = id.to_string();

    let normalized = tokio::task::spawn_blocking(move || normalizer::normalize(raw)).await??;
    let record = ImageRecord::new(id.clone(), normalized.data, CANONICAL_FORMAT);
    Ok((
        record,
        Ingested {
            id,
            source_format: normalized.source_format,
        },
    ))
}

/// Convert to the canonical format unless already tagged canonical. Payloads
/// that are not images come back untouched.
async fn canonicalize(record: ImageRecord) -> Result<ImageRecord> {
    if is_canonical(&record.format) {
        return Ok(record);
    }

    let raw = record.data.clone();
    match tokio::task::spawn_blocking(move || normalizer::normalize(raw)).await? {
        Ok(normalized) => Ok(ImageRecord {
            data: normalized.data,
            format: CANONICAL_FORMAT.to_string(),
            ..record
        }),
        Err(NormalizeError::NotAnImage(reason)) => {
            debug!(
                id = %record.id,
                format = %record.format,
                reason = %reason,
                "File is not an image, keeping original format"
            );
            Ok(record)
        }
        Err(e) => {
            warn!(id = %record.id, error = %e, "Failed to convert image");
            Err(e.into())
        }
    }
}
