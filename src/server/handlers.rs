//! HTTP request handlers for the DIALS REST API.
//!
//! This module contains the Axum handlers for the analysis endpoints and the
//! health check.
//!
//! # Endpoints
//!
//! - `POST /find_spots` - Per-image spot-finding statistics
//! - `POST /export_bitmap` - Render a diffraction image as png/jpeg/tiff
//! - `GET /health` - Health check endpoint

use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Json, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use image::RgbImage;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backend::{
    AnalysisBackend, BitmapFormat, ExportBitmapParams, FindSpotsParams, RawBitmap,
    SpotfindingStats,
};
use crate::error::BackendError;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the analysis backend.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<B: AnalysisBackend> {
    /// The backend performing the actual computation
    pub backend: Arc<B>,
}

impl<B: AnalysisBackend> AppState<B> {
    /// Create a new application state with the given backend.
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }
}

impl<B: AnalysisBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_parameters")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a new error response with status code.
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
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert BackendError to HTTP response.
///
/// - 4xx errors are logged at debug/warn level (client errors)
/// - 5xx errors are logged at error level (server errors)
impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            BackendError::FileNotFound { path } => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("File not found: {}", path),
            ),

            BackendError::InvalidInput { message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_parameters",
                message.clone(),
            ),

            BackendError::Failed { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "analysis_failed",
                message.clone(),
            ),

            BackendError::Decode { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "decode_error",
                format!("Failed to interpret backend output: {}", message),
            ),

            BackendError::Io(io_err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "io_error",
                format!("Backend I/O error: {}", io_err),
            ),
        };

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
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

/// Handle spot-finding requests.
///
/// Validates the parameters, delegates the analysis to the backend and
/// returns the per-image statistics as JSON.
pub async fn find_spots_handler<B: AnalysisBackend>(
    State(state): State<AppState<B>>,
    Json(params): Json<FindSpotsParams>,
) -> Result<Json<SpotfindingStats>, BackendError> {
    params
        .validate()
        .map_err(|message| BackendError::InvalidInput { message })?;

    let start = Instant::now();
    let stats = state.backend.find_spots(&params).await?;
    info!(
        "Spotfinding took {:.2} seconds",
        start.elapsed().as_secs_f64()
    );

    Ok(Json(stats))
}

/// Handle bitmap export requests.
///
/// The backend renders the image to raw RGB pixels; this handler performs
/// the final encoding into the requested format and streams the bytes back
/// with the matching content type.
pub async fn export_bitmap_handler<B: AnalysisBackend>(
    State(state): State<AppState<B>>,
    Json(params): Json<ExportBitmapParams>,
) -> Result<Response, BackendError> {
    params
        .validate()
        .map_err(|message| BackendError::InvalidInput { message })?;

    let start = Instant::now();
    let bitmap = state.backend.export_bitmap(&params).await?;
    let body = encode_bitmap(&bitmap, params.format)?;
    info!(
        "Bitmap export took {:.2} seconds",
        start.elapsed().as_secs_f64()
    );

    Ok((
        [(header::CONTENT_TYPE, params.format.media_type())],
        body,
    )
        .into_response())
}

/// Health check handler.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Bitmap Encoding
// =============================================================================

/// Encode a raw RGB bitmap into the requested image format.
fn encode_bitmap(bitmap: &RawBitmap, format: BitmapFormat) -> Result<Vec<u8>, BackendError> {
    let expected = bitmap.width as usize * bitmap.height as usize * 3;
    if bitmap.pixels.len() != expected {
        return Err(BackendError::Decode {
            message: format!(
                "pixel buffer has {} bytes, expected {} for a {}x{} RGB image",
                bitmap.pixels.len(),
                expected,
                bitmap.width,
                bitmap.height
            ),
        });
    }

    let img = RgbImage::from_raw(bitmap.width, bitmap.height, bitmap.pixels.clone()).ok_or_else(
        || BackendError::Decode {
            message: "pixel buffer does not form a valid image".to_string(),
        },
    )?;

    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, format.image_format())
        .map_err(|e| BackendError::Decode {
            message: e.to_string(),
        })?;

    Ok(buffer.into_inner())
}

// =============================================================================
// Tests
// =============================================================================
