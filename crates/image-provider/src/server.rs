//! HTTP server for image endpoints
//!
//! Provides /health, /images (upload, list) and /images/{id} (fetch, delete).

use crate::error::AppError;
use crate::types::{CreatedResponse, HealthResponse, ListQuery, ListResponse};
use axum::{
    body::Body,
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tiered_image_store::{ImageService, TierKind, CANONICAL_CONTENT_TYPE};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

const UPLOAD_FIELD: &str = "image";
const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Shared state for the HTTP server
pub struct ServerState {
    pub images: ImageService,
    /// Save each upload to the primary tier as well as caching it
    pub persist_uploads: bool,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(images: ImageService, persist_uploads: bool, max_upload_bytes: usize) -> Self {
        Self {
            images,
            persist_uploads,
            max_upload_bytes,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .route("/health", get(health))
        .route("/images", get(list_images).post(create_image))
        .route("/images/{id}", get(get_image).delete(delete_image))
        .layer(body_limit)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, bind_address: &str) -> std::io::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("Starting HTTP server on {}", listener.local_addr()?);

    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let cache_stats = state.images.stats().await;
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        cache: cache_stats,
    })
}

/// Upload an image (multipart field `image`); it is converted and cached
async fn create_image(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        upload = Some((file_name, data));
        break;
    }

    let Some((file_name, data)) = upload else {
        return Err(AppError::BadRequest("No file uploaded".into()));
    };

    let ingested = if state.persist_uploads {
        state.images.ingest_persisted(&file_name, data).await
    } else {
        state.images.ingest(&file_name, data).await
    }
    .map_err(|e| {
        warn!(file_name = %file_name, error = %e, "Rejected upload");
        AppError::from(e)
    })?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            id: ingested.id,
            format: ingested.source_format,
        }),
    ))
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::BadRequest(format!("Failed to read upload: {}", err.body_text()))
    }
}

/// Get an image by id, from the cache or either storage tier
async fn get_image(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let found = state.images.lookup(&id).await.map_err(|e| {
        warn!(id = %id, error = %e, "Failed to fetch image");
        AppError::from(e)
    })?;

    let content_type = if found.record.is_canonical() {
        CANONICAL_CONTENT_TYPE
    } else {
        "application/octet-stream"
    };
    let cache_header = if found.source == TierKind::Cache {
        "HIT"
    } else {
        "MISS"
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=86400"),
            (X_CACHE, cache_header),
        ],
        Body::from(found.record.data),
    )
        .into_response())
}

/// Delete an image from the cache and the storage tiers
async fn delete_image(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.images.delete(&id).await.map_err(|e| {
        warn!(id = %id, error = %e, "Failed to delete image");
        AppError::from(e)
    })?;
    Ok(StatusCode::NO_CONTENT)
}

/// List cached ids, or a tier's durable ids with `?source=`
async fn list_images(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    let images = match query.source {
        None => state
            .images
            .list()
            .await
            .into_iter()
            .map(|record| record.id)
            .collect(),
        Some(tier) => state.images.list_tier(tier).await?,
    };
    Ok(Json(ListResponse { images }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;
    use std::path::Path as FsPath;
    use tempfile::tempdir;
    use tiered_image_store::{CacheLimits, FileSystemStorage, ServiceConfig};
    use tower::ServiceExt;

    const BOUNDARY: &str = "image-provider-test-boundary";

    async fn create_test_state(storage_dir: &FsPath, persist_uploads: bool) -> SharedState {
        let primary = FileSystemStorage::new(storage_dir).await.unwrap();
        let config = ServiceConfig {
            limits: CacheLimits::new(10, 1024 * 1024),
            tier_timeout: None,
        };
        let images = ImageService::new(Arc::new(primary), None, config);
        Arc::new(ServerState::new(images, persist_uploads, 1024 * 1024))
    }

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_fn(4, 4, |x, y| image::Rgb([x as u8 * 40, y as u8 * 40, 90]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn upload_request(field: &str, file_name: &str, data: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
             filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/images")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempdir().unwrap();
        let router = create_router(create_test_state(dir.path(), false).await);

        let response = router.oneshot(get_request("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["uptime_secs"].as_u64().is_some());
        assert_eq!(json["cache"]["entries"], 0);
        assert_eq!(json["cache"]["max_entries"], 10);
    }

    #[tokio::test]
    async fn test_upload_then_fetch() {
        let dir = tempdir().unwrap();
        let router = create_router(create_test_state(dir.path(), false).await);

        let response = router
            .clone()
            .oneshot(upload_request("image", "cat.png", &png_bytes()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = json_body(response).await;
        assert_eq!(json["id"], "cat");
        assert_eq!(json["format"], "png");

        let response = router
            .clone()
            .oneshot(get_request("/images/cat"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            CANONICAL_CONTENT_TYPE
        );
        assert_eq!(response.headers()["x-cache"], "HIT");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(image::guess_format(&body).unwrap(), ImageFormat::WebP);

        let response = router.oneshot(get_request("/images")).await.unwrap();
        let json = json_body(response).await;
        assert_eq!(json["images"], serde_json::json!(["cat"]));
    }

    #[tokio::test]
    async fn test_upload_is_not_persisted_by_default() {
        let dir = tempdir().unwrap();
        let router = create_router(create_test_state(dir.path(), false).await);

        router
            .clone()
            .oneshot(upload_request("image", "cat.png", &png_bytes()))
            .await
            .unwrap();

        let response = router
            .oneshot(get_request("/images?source=primary"))
            .await
            .unwrap();
        let json = json_body(response).await;
        assert_eq!(json["images"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_upload_persisted_when_enabled() {
        let dir = tempdir().unwrap();
        let router = create_router(create_test_state(dir.path(), true).await);

        let response = router
            .clone()
            .oneshot(upload_request("image", "123456.png", &png_bytes()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        assert!(dir.path().join("12/34/56.webp").exists());
        let response = router
            .oneshot(get_request("/images?source=primary"))
            .await
            .unwrap();
        let json = json_body(response).await;
        assert_eq!(json["images"], serde_json::json!(["123456"]));
    }

    #[tokio::test]
    async fn test_upload_rejects_non_image() {
        let dir = tempdir().unwrap();
        let router = create_router(create_test_state(dir.path(), false).await);

        let response = router
            .oneshot(upload_request("image", "notes.txt", b"plain text"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"], "Invalid image format");
    }

    #[tokio::test]
    async fn test_upload_without_image_field() {
        let dir = tempdir().unwrap();
        let router = create_router(create_test_state(dir.path(), false).await);

        let response = router
            .oneshot(upload_request("avatar", "cat.png", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"], "No file uploaded");
    }

    #[tokio::test]
    async fn test_upload_over_body_limit() {
        let dir = tempdir().unwrap();
        let primary = FileSystemStorage::new(dir.path()).await.unwrap();
        let images = ImageService::new(Arc::new(primary), None, ServiceConfig::default());
        let router = create_router(Arc::new(ServerState::new(images, false, 64)));

        let response = router
            .oneshot(upload_request("image", "big.png", &[0u8; 4096]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_image_served_from_primary_is_a_miss() {
        let dir = tempdir().unwrap();
        let primary = FileSystemStorage::new(dir.path()).await.unwrap();
        let webp = tiered_image_store::normalize(png_bytes().into()).unwrap().data;
        tiered_image_store::ImageStorage::save(
            &primary,
            &tiered_image_store::ImageRecord::new("dog", webp, "webp"),
        )
        .await
        .unwrap();
        let images = ImageService::new(Arc::new(primary), None, ServiceConfig::default());
        let router = create_router(Arc::new(ServerState::new(images, false, 1024 * 1024)));

        let response = router
            .clone()
            .oneshot(get_request("/images/dog"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-cache"], "MISS");

        let response = router.oneshot(get_request("/images/dog")).await.unwrap();
        assert_eq!(response.headers()["x-cache"], "HIT");
    }

    #[tokio::test]
    async fn test_get_missing_image() {
        let dir = tempdir().unwrap();
        let router = create_router(create_test_state(dir.path(), false).await);

        let response = router
            .oneshot(get_request("/images/nonexistent"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = json_body(response).await;
        assert_eq!(json["error"], "Image not found");
    }

    #[tokio::test]
    async fn test_get_rejected_id_is_bad_request() {
        let dir = tempdir().unwrap();
        let router = create_router(create_test_state(dir.path(), false).await);

        let response = router.oneshot(get_request("/images/a..b")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_image() {
        let dir = tempdir().unwrap();
        let router = create_router(create_test_state(dir.path(), true).await);
        router
            .clone()
            .oneshot(upload_request("image", "cat.png", &png_bytes()))
            .await
            .unwrap();

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/images/cat")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = router.oneshot(get_request("/images/cat")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_unconfigured_secondary() {
        let dir = tempdir().unwrap();
        let router = create_router(create_test_state(dir.path(), false).await);

        let response = router
            .oneshot(get_request("/images?source=secondary"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_server_state_new() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path(), false).await;

        let diff = (Utc::now() - state.started_at).num_seconds();
        assert!((0..5).contains(&diff));
    }
}
