use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use lib_telemetry::connections::StoreError;
use lib_telemetry::models::RoutingError;
use serde_json::json;
use tracing::{error, warn};

/// # Application Error
///
/// Everything a dashboard handler can fail with, rendered as a JSON body
/// with `error_type`, `message` and `detail`.
#[derive(Debug)]
pub enum AppError {
    /// Path names a recipient that is not registered.
    UnknownRecipient(String),
    /// Path segment is not a storage key.
    BadKey(String),
    /// Sink body addressed to another recipient than the path.
    RecipientMismatch { path: String, body: String },
    Store(StoreError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<RoutingError> for AppError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::UnknownRecipient(r) | RoutingError::DuplicateRecipient(r) => {
                AppError::UnknownRecipient(r)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message, detail) = match self {
            AppError::UnknownRecipient(r) => (
                StatusCode::NOT_FOUND,
                "UnknownRecipient",
                "No such recipient is registered.".to_string(),
                r,
            ),
            AppError::BadKey(k) => (
                StatusCode::BAD_REQUEST,
                "MalformedKey",
                "Expected a key of the form sensor:{type}:{id}:{capturedAt}.".to_string(),
                k,
            ),
            AppError::RecipientMismatch { path, body } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "RecipientMismatch",
                format!("Reading is addressed to {} but was posted to {}.", body, path),
                body,
            ),
            AppError::Store(StoreError::NotFound(key)) => (
                StatusCode::NOT_FOUND,
                "NotFound",
                "Reading does not exist or has expired.".to_string(),
                key,
            ),
            AppError::Store(StoreError::Closed) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "StoreClosed",
                "The store is shutting down.".to_string(),
                String::new(),
            ),
            AppError::Store(e @ StoreError::Transport(_)) => {
                warn!("Storage transport error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "StorageUnavailable",
                    "Error communicating with the storage backend.".to_string(),
                    e.to_string(),
                )
            }
            AppError::Store(e @ StoreError::Codec(_)) => {
                error!("Stored reading failed to decode: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CorruptEntry",
                    "Stored reading could not be decoded.".to_string(),
                    e.to_string(),
                )
            }
        };

        (
            status,
            Json(json!({
                "error_type": error_type,
                "message": message,
                "detail": detail
            })),
        )
            .into_response()
    }
}
