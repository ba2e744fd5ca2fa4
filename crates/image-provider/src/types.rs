//! Request and response bodies for the image provider

use serde::{Deserialize, Serialize};
use tiered_image_store::{CacheStats, TierKind};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}

/// Body returned after a successful upload
#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: String,
    /// Encoding the upload arrived in
    pub format: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub images: Vec<String>,
}

/// `GET /images?source=primary`
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub source: Option<TierKind>,
}
