//! HTTP request handlers for the imgserv API.
//!
//! # Endpoints
//!
//! - `/<operations>/<key>` - Transform an image (any method, router fallback)
//! - `/upload?key=<k>` - Store the request body as a new image
//! - `/upload_file?key=<k>&filename=<path>` - Store a local file as a new image
//! - `/delete?key=<k>` - Remove an image from the origin and the cache
//! - `/stat` - Counters and gate occupancy
//! - `/health` - Health check endpoint

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{OriginalUri, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{IoError, ServeError, TransformError};
use crate::io::OriginStore;
use crate::stats::StatsSnapshot;
use crate::transform::{ImageService, UploadedInfo};

/// Non-standard status for requests abandoned before processing started.
pub const STATUS_CLIENT_CLOSED_REQUEST: u16 = 499;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the image service.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<O: OriginStore> {
    pub service: Arc<ImageService<O>>,

    /// Cache-Control max-age for transformed images, in seconds
    pub cache_max_age: u32,
}

impl<O: OriginStore> AppState<O> {
    pub fn new(service: ImageService<O>, cache_max_age: u32) -> Self {
        Self {
            service: Arc::new(service),
            cache_max_age,
        }
    }
}

impl<O: OriginStore> Clone for AppState<O> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for `/upload`, `/upload_file` and `/delete`.
#[derive(Debug, Default, Deserialize)]
pub struct KeyParams {
    #[serde(default)]
    pub key: Option<String>,

    /// Local path to read, `/upload_file` only
    #[serde(default)]
    pub filename: Option<String>,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "parse_error")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

fn client_closed_request() -> StatusCode {
    StatusCode::from_u16(STATUS_CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::REQUEST_TIMEOUT)
}

/// Convert ServeError to HTTP response.
///
/// - 5xx errors are logged at ERROR level
/// - 404 and 499 at DEBUG level (common and expected)
/// - other 4xx at WARN level
impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        // Signature failures carry their own mapping
        if let ServeError::Auth(err) = self {
            return err.into_response();
        }

        let (status, error_type) = match &self {
            ServeError::EmptyQuery => (StatusCode::BAD_REQUEST, "empty_query"),
            ServeError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ServeError::Auth(_) => (StatusCode::FORBIDDEN, "invalid_signature"),
            ServeError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ServeError::Rejected => (StatusCode::TOO_MANY_REQUESTS, "too_many_requests"),
            ServeError::Canceled => (client_closed_request(), "canceled"),
            ServeError::Parse(_) => (StatusCode::INTERNAL_SERVER_ERROR, "parse_error"),
            ServeError::Transform(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                match err {
                    TransformError::Decode { .. } => "decode_error",
                    TransformError::Encode { .. } => "encode_error",
                    TransformError::Watermark { .. } => "watermark_error",
                    TransformError::TooLarge { .. } | TransformError::SizeLimit { .. } => {
                        "image_too_large"
                    }
                    _ => "transform_error",
                },
            ),
            ServeError::Io(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                match err {
                    IoError::Cache(_) => "cache_error",
                    IoError::EmptyObject(_) => "empty_object",
                    _ => "storage_error",
                },
            ),
            ServeError::UploadFile { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "upload_error"),
        };
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND
            || status.as_u16() == STATUS_CLIENT_CLOSED_REQUEST
        {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Request not served: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle transform requests.
///
/// # Endpoint
///
/// `ANY /<operations>/<key>` (router fallback)
///
/// The raw path, including any signature prefix, is handed to the service
/// untouched. The `Accept` header drives format negotiation.
pub async fn image_handler<O: OriginStore>(
    State(state): State<AppState<O>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Result<Response, ServeError> {
    let raw = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok());

    let image = state.service.transform(raw, accept).await?;

    let mut response = Response::new(Body::from(image.data.clone()));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(image.content_type()),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(image.data.len()));
    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={}", state.cache_max_age)) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    if image.vary {
        headers.insert(header::VARY, HeaderValue::from_static("Accept"));
    }

    Ok(response)
}

/// Handle uploads of raw image bytes.
///
/// # Endpoint
///
/// `ANY /upload?key=<k>`
///
/// Without `key` the image gets a random name. Responds with
/// `{"name", "width", "height"}`.
pub async fn upload_handler<O: OriginStore>(
    State(state): State<AppState<O>>,
    Query(params): Query<KeyParams>,
    body: Bytes,
) -> Result<Json<UploadedInfo>, ServeError> {
    let info = state.service.upload(params.key.as_deref(), body).await?;
    Ok(Json(info))
}

/// Handle uploads of a file already on the server's disk.
///
/// # Endpoint
///
/// `ANY /upload_file?key=<k>&filename=<path>`
pub async fn upload_file_handler<O: OriginStore>(
    State(state): State<AppState<O>>,
    Query(params): Query<KeyParams>,
) -> Result<Json<UploadedInfo>, ServeError> {
    let filename = params
        .filename
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ServeError::BadRequest("empty filename arg".to_string()))?;

    let data = tokio::fs::read(&filename)
        .await
        .map_err(|e| ServeError::UploadFile {
            path: filename.clone(),
            message: e.to_string(),
        })?;

    let info = state
        .service
        .upload(params.key.as_deref(), Bytes::from(data))
        .await?;
    Ok(Json(info))
}

/// Handle deletions.
///
/// # Endpoint
///
/// `ANY /delete?key=<k>`
///
/// `200` on success, `404` when the image does not exist, `400` without a key.
pub async fn delete_handler<O: OriginStore>(
    State(state): State<AppState<O>>,
    Query(params): Query<KeyParams>,
) -> Result<StatusCode, ServeError> {
    let key = params.key.unwrap_or_default();
    state.service.delete(&key).await?;
    Ok(StatusCode::OK)
}

/// Handle stat requests.
///
/// # Endpoint
///
/// `ANY /stat`
pub async fn stat_handler<O: OriginStore>(
    State(state): State<AppState<O>>,
) -> Json<StatsSnapshot> {
    Json(state.service.stats())
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Browsers ask for this on every page; answer without touching the pipeline.
pub async fn favicon_handler() -> StatusCode {
    StatusCode::NOT_FOUND
}
