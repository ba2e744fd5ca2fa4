//! Shared types for the tiered image store

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Format tag carried by every record that went through the normalizer
pub const CANONICAL_FORMAT: &str = "webp";

/// MIME type served for canonical records
pub const CANONICAL_CONTENT_TYPE: &str = "image/webp";

/// Default item cap for the in-memory cache
pub const DEFAULT_MAX_COUNT: usize = 100;

/// Default byte budget for the in-memory cache (100 MiB)
pub const DEFAULT_MAX_BYTES: u64 = 100 * 1024 * 1024;

/// A stored blob: an image (or opaque payload) addressed by a caller-assigned id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub id: String,
    pub data: Bytes,
    pub format: String,
}

impl ImageRecord {
    pub fn new(id: impl Into<String>, data: impl Into<Bytes>, format: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
            format: format.into(),
        }
    }

    /// Size of the payload in bytes
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_canonical(&self) -> bool {
        crate::normalizer::is_canonical(&self.format)
    }
}

/// Where a record (or a failure) came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    Cache,
    Primary,
    Secondary,
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierKind::Cache => write!(f, "cache"),
            TierKind::Primary => write!(f, "primary"),
            TierKind::Secondary => write!(f, "secondary"),
        }
    }
}

/// Capacity bounds for the in-memory cache. Both are enforced independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheLimits {
    pub max_count: usize,
    pub max_bytes: u64,
}

impl CacheLimits {
    /// Build limits, replacing zero values with the defaults
    pub fn new(max_count: usize, max_bytes: u64) -> Self {
        Self {
            max_count: if max_count == 0 {
                DEFAULT_MAX_COUNT
            } else {
                max_count
            },
            max_bytes: if max_bytes == 0 {
                DEFAULT_MAX_BYTES
            } else {
                max_bytes
            },
        }
    }
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_count: DEFAULT_MAX_COUNT,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

/// Configuration for [`crate::ImageService`]
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub limits: CacheLimits,
    /// Deadline applied to every individual tier call
    pub tier_timeout: Option<Duration>,
}

/// Statistics about the in-memory cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub max_entries: usize,
    pub max_size: u64,
    pub hits: u64,
    pub misses: u64,
}

/// A record together with the layer that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub record: ImageRecord,
    pub source: TierKind,
}

impl Lookup {
    pub fn new(record: ImageRecord, source: TierKind) -> Self {
        Self { record, source }
    }
}

/// Result of ingesting an uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ingested {
    pub id: String,
    /// Encoding the upload arrived in, before conversion
    pub source_format: String,
}
