//! Error types for the image provider

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::fmt;
use tiered_image_store::{ImageStoreError, StorageError};

/// Startup failure
#[derive(Debug)]
pub enum ProviderError {
    Storage(StorageError),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Storage(err) => write!(f, "Storage error: {}", err),
            ProviderError::Io(err) => write!(f, "IO error: {}", err),
            ProviderError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProviderError::Storage(err) => Some(err),
            ProviderError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<StorageError> for ProviderError {
    fn from(err: StorageError) -> Self {
        ProviderError::Storage(err)
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        ProviderError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for ProviderError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ProviderError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Request failure that converts to an HTTP response
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    PayloadTooLarge(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                )
            }
        };

        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

impl From<ImageStoreError> for AppError {
    fn from(err: ImageStoreError) -> Self {
        match err {
            ImageStoreError::NotFound { .. } => AppError::NotFound("Image not found".into()),
            ImageStoreError::TooLarge { .. } => AppError::PayloadTooLarge(err.to_string()),
            ImageStoreError::Decode(_) => AppError::BadRequest("Invalid image format".into()),
            ImageStoreError::InvalidId(_) | ImageStoreError::TierNotConfigured(_) => {
                AppError::BadRequest(err.to_string())
            }
            ImageStoreError::Encode(_)
            | ImageStoreError::Storage { .. }
            | ImageStoreError::Task(_) => AppError::Internal(err.to_string()),
        }
    }
}
