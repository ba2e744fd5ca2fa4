//! Image Provider - HTTP image service over a tiered image store
//!
//! Uploads are normalized to lossless WebP and held in a bounded in-memory
//! cache in front of filesystem storage and an optional S3-compatible tier.

mod config;
mod error;
mod server;
mod types;

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::server::{start_server, ServerState, SharedState};
use std::sync::Arc;
use tiered_image_store::{FileSystemStorage, ImageService, ImageStorage, ObjectStorage};
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive("image_provider=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting image provider...");

    let config = ProviderConfig::from_env();
    info!("Bind address: {}", config.bind_address);
    info!("Storage path: {:?}", config.storage_path);
    info!(
        "Cache limits: {} files, {} MB",
        config.max_cache_files, config.max_cache_size_mb
    );
    if let Some(timeout) = config.tier_timeout {
        info!("Tier timeout: {:?}", timeout);
    }

    let primary = FileSystemStorage::new(&config.storage_path).await?;

    let secondary: Option<Arc<dyn ImageStorage>> = match &config.s3 {
        Some(s3) => match ObjectStorage::from_s3(s3) {
            Ok(storage) => {
                info!(endpoint = %s3.endpoint, bucket = %s3.bucket, "Secondary storage enabled");
                Some(Arc::new(storage))
            }
            Err(e) => {
                warn!(error = %e, "Failed to initialize secondary storage, continuing without it");
                None
            }
        },
        None => None,
    };

    let images = ImageService::new(Arc::new(primary), secondary, config.service_config());
    let state: SharedState = Arc::new(ServerState::new(
        images,
        config.persist_uploads,
        config.max_upload_bytes(),
    ));

    start_server(state, &config.bind_address)
        .await
        .map_err(|e| ProviderError::Config(format!("Server error: {}", e)))?;

    Ok(())
}
