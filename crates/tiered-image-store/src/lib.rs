//! Tiered image store
//!
//! A bounded in-memory cache (item count and byte budget) in front of a
//! durable primary storage tier and an optional secondary (offload) tier.
//! Every image that passes through is normalized to lossless WebP.

pub mod cache;
pub mod error;
pub mod normalizer;
pub mod service;
pub mod storage;
pub mod types;

#[cfg(test)]
mod test_support;

pub use cache::{strip_trailing_extension, BoundedCache};
pub use error::{CacheError, ImageStoreError, NormalizeError, Result, StorageError};
pub use normalizer::{normalize, Normalized};
pub use service::ImageService;
pub use storage::{FileSystemStorage, ImageStorage, MemoryStorage, ObjectStorage, S3Config};
pub use types::{
    CacheLimits, CacheStats, ImageRecord, Ingested, Lookup, ServiceConfig, TierKind,
    CANONICAL_CONTENT_TYPE, CANONICAL_FORMAT,
};
