use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tiered_image_store::{CacheLimits, S3Config, ServiceConfig};

const DEFAULT_MAX_CACHE_FILES: usize = 100;
const DEFAULT_MAX_CACHE_SIZE_MB: u64 = 100;

/// Service configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub bind_address: String,
    pub storage_path: PathBuf,
    pub max_cache_files: usize,
    pub max_cache_size_mb: u64,
    pub tier_timeout: Option<Duration>,
    /// Save uploads to the primary tier right away instead of only caching them
    pub persist_uploads: bool,
    /// Secondary tier; present only when S3_ENDPOINT is set
    pub s3: Option<S3Config>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            storage_path: PathBuf::from("./data"),
            max_cache_files: DEFAULT_MAX_CACHE_FILES,
            max_cache_size_mb: DEFAULT_MAX_CACHE_SIZE_MB,
            tier_timeout: None,
            persist_uploads: false,
            s3: None,
        }
    }
}

impl ProviderConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let bind_address = lookup("BIND_ADDRESS")
            .map(|addr| {
                // ":8080" means every interface
                if addr.starts_with(':') {
                    format!("0.0.0.0{}", addr)
                } else {
                    addr
                }
            })
            .unwrap_or(defaults.bind_address);

        let storage_path = lookup("STORAGE_PATH")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.storage_path);

        let max_cache_files = lookup("MAX_CACHE_FILES")
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_cache_files);

        let max_cache_size_mb = lookup("MAX_CACHE_SIZE_MB")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_cache_size_mb);

        let tier_timeout = lookup("TIER_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|n| *n > 0)
            .map(Duration::from_secs);

        let persist_uploads = lookup("PERSIST_UPLOADS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let s3 = lookup("S3_ENDPOINT")
            .filter(|e| !e.is_empty())
            .map(|endpoint| S3Config {
                endpoint,
                access_key: lookup("S3_ACCESS_KEY").unwrap_or_default(),
                secret_key: lookup("S3_SECRET_KEY").unwrap_or_default(),
                bucket: lookup("S3_BUCKET").unwrap_or_default(),
                region: lookup("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                use_ssl: lookup("S3_USE_SSL").is_some_and(|v| v == "true"),
                prefix: lookup("S3_PREFIX").filter(|p| !p.is_empty()),
            });

        Self {
            bind_address,
            storage_path,
            max_cache_files,
            max_cache_size_mb,
            tier_timeout,
            persist_uploads,
            s3,
        }
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            limits: CacheLimits::new(self.max_cache_files, self.max_cache_size_mb * 1024 * 1024),
            tier_timeout: self.tier_timeout,
        }
    }

    /// Request body limit for uploads; matches the cache byte budget
    pub fn max_upload_bytes(&self) -> usize {
        usize::try_from(self.max_cache_size_mb * 1024 * 1024).unwrap_or(usize::MAX)
    }
}
