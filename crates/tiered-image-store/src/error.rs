//! Error types for the tiered image store

use crate::types::TierKind;
use std::fmt;
use std::time::Duration;

/// Failure reported by a storage tier backend
#[derive(Debug)]
pub enum StorageError {
    /// No durable record exists for the id
    NotFound(String),
    /// The id cannot be mapped to a storage key
    InvalidId(String),
    Io(Box<std::io::Error>),
    ObjectStore(Box<object_store::Error>),
    /// The tier call did not finish before the configured deadline
    Timeout(Duration),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(id) => write!(f, "Record not found: {}", id),
            StorageError::InvalidId(id) => write!(f, "Invalid record id: {:?}", id),
            StorageError::Io(err) => write!(f, "IO error: {}", err),
            StorageError::ObjectStore(err) => write!(f, "Object store error: {}", err),
            StorageError::Timeout(after) => {
                write!(f, "Tier call timed out after {} ms", after.as_millis())
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(err) => Some(err.as_ref()),
            StorageError::ObjectStore(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(Box::new(err))
    }
}

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => StorageError::NotFound(path),
            other => StorageError::ObjectStore(Box::new(other)),
        }
    }
}

/// Failure converting a payload to the canonical encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// The payload is not a recognized image encoding
    NotAnImage(String),
    /// Decoding worked but the canonical encoder failed
    Encode(String),
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeError::NotAnImage(msg) => write!(f, "Not an image: {}", msg),
            NormalizeError::Encode(msg) => write!(f, "Canonical encoding failed: {}", msg),
        }
    }
}

impl std::error::Error for NormalizeError {}

/// Rejection from the bounded cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A single record is bigger than the whole byte budget
    TooLarge { size: u64, max_bytes: u64 },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::TooLarge { size, max_bytes } => write!(
                f,
                "Image too large for cache (size: {} bytes, budget: {} bytes)",
                size, max_bytes
            ),
        }
    }
}

impl std::error::Error for CacheError {}

/// Caller-visible error from [`crate::ImageService`]
#[derive(Debug)]
pub enum ImageStoreError {
    /// Absent from the cache and every configured tier; `tier` is the last one consulted
    NotFound { id: String, tier: TierKind },
    TooLarge { size: u64, max_bytes: u64 },
    /// No usable id could be derived
    InvalidId(String),
    /// Payload had to be an image and was not
    Decode(String),
    Encode(String),
    Storage { tier: TierKind, source: StorageError },
    TierNotConfigured(TierKind),
    /// A blocking conversion task panicked or was cancelled
    Task(String),
}

impl ImageStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ImageStoreError::NotFound { .. })
    }

    pub(crate) fn from_tier(tier: TierKind, id: &str, err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => ImageStoreError::NotFound {
                id: id.to_string(),
                tier,
            },
            StorageError::InvalidId(id) => ImageStoreError::InvalidId(id),
            source => ImageStoreError::Storage { tier, source },
        }
    }
}

impl fmt::Display for ImageStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageStoreError::NotFound { id, tier } => {
                write!(f, "Image not found: {} (last checked: {})", id, tier)
            }
            ImageStoreError::TooLarge { size, max_bytes } => write!(
                f,
                "Image too large for cache (size: {} bytes, budget: {} bytes)",
                size, max_bytes
            ),
            ImageStoreError::InvalidId(name) => write!(f, "Invalid image id: {:?}", name),
            ImageStoreError::Decode(msg) => write!(f, "Invalid image format: {}", msg),
            ImageStoreError::Encode(msg) => write!(f, "Canonical encoding failed: {}", msg),
            ImageStoreError::Storage { tier, source } => {
                write!(f, "{} tier error: {}", tier, source)
            }
            ImageStoreError::TierNotConfigured(tier) => {
                write!(f, "{} tier is not configured", tier)
            }
            ImageStoreError::Task(msg) => write!(f, "Conversion task failed: {}", msg),
        }
    }
}

impl std::error::Error for ImageStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImageStoreError::Storage { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<CacheError> for ImageStoreError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::TooLarge { size, max_bytes } => {
                ImageStoreError::TooLarge { size, max_bytes }
            }
        }
    }
}

impl From<NormalizeError> for ImageStoreError {
    fn from(err: NormalizeError) -> Self {
        match err {
            NormalizeError::NotAnImage(msg) => ImageStoreError::Decode(msg),
            NormalizeError::Encode(msg) => ImageStoreError::Encode(msg),
        }
    }
}

impl From<tokio::task::JoinError> for ImageStoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        ImageStoreError::Task(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ImageStoreError>;
