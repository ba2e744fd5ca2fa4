//! In-memory image cache bounded by item count and total byte size

use crate::error::CacheError;
use crate::types::{CacheLimits, ImageRecord};
use lru::LruCache;
use tracing::debug;

/// Drop a trailing extension (`.png`, `.tar`, ...) from the last path segment of an id.
///
/// `"photo.png"` and `"photo"` share the stem `"photo"`; `"a.tar.gz"` becomes `"a.tar"`.
pub fn strip_trailing_extension(id: &str) -> &str {
    let name_start = id.rfind('/').map_or(0, |i| i + 1);
    match id[name_start..].rfind('.') {
        Some(dot) => &id[..name_start + dot],
        None => id,
    }
}

/// Most-recently-written-first record cache.
///
/// Recency is refreshed by inserts and replacements only; lookups never reorder.
/// The tracked byte total always equals the sum of the cached payload sizes.
/// Callers provide the locking.
pub struct BoundedCache {
    entries: LruCache<String, ImageRecord>,
    limits: CacheLimits,
    total_bytes: u64,
}

impl BoundedCache {
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            entries: LruCache::unbounded(),
            limits,
            total_bytes: 0,
        }
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Exact-id lookup
    pub fn get(&self, id: &str) -> Option<&ImageRecord> {
        self.entries.peek(id)
    }

    /// Newest record whose id matches `id` once both have their extensions stripped
    pub fn find_by_stem(&self, id: &str) -> Option<&ImageRecord> {
        let stem = strip_trailing_extension(id);
        self.entries
            .iter()
            .map(|(_, record)| record)
            .find(|record| strip_trailing_extension(&record.id) == stem)
    }

    /// Insert or replace a record, then evict down to both bounds.
    ///
    /// A record larger than the whole byte budget is rejected before anything
    /// is touched, so a rejection never evicts. Returns the evicted ids,
    /// oldest first.
    pub fn put(&mut self, record: ImageRecord) -> Result<Vec<String>, CacheError> {
        let size = record.size();
        if size > self.limits.max_bytes {
            return Err(CacheError::TooLarge {
                size,
                max_bytes: self.limits.max_bytes,
            });
        }

        if let Some(old) = self.entries.pop(record.id.as_str()) {
            self.total_bytes -= old.size();
        }

        let mut evicted = Vec::new();
        while self.total_bytes + size > self.limits.max_bytes {
            match self.evict_oldest() {
                Some(id) => evicted.push(id),
                None => break,
            }
        }

        self.total_bytes += size;
        self.entries.put(record.id.clone(), record);

        while self.entries.len() > self.limits.max_count {
            match self.evict_oldest() {
                Some(id) => evicted.push(id),
                None => break,
            }
        }

        Ok(evicted)
    }

    /// Remove a record by exact id; absent ids are a no-op
    pub fn delete(&mut self, id: &str) -> Option<ImageRecord> {
        let removed = self.entries.pop(id)?;
        self.total_bytes -= removed.size();
        Some(removed)
    }

    /// Cached ids, newest first
    pub fn list(&self) -> Vec<String> {
        self.entries.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Snapshot of the cached records, newest first
    pub fn records(&self) -> Vec<ImageRecord> {
        self.entries.iter().map(|(_, r)| r.clone()).collect()
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (id, record) = self.entries.pop_lru()?;
        self.total_bytes -= record.size();
        debug!(id = %id, size = record.size(), "Evicted oldest cache entry");
        Some(id)
    }
}
