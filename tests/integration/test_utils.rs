//! Test utilities for integration tests.
//!
//! This module provides a mock analysis backend and helpers for issuing
//! tokens and driving the router with `tower::ServiceExt::oneshot`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use dials_rest::auth::TokenAuth;
use dials_rest::backend::{
    AnalysisBackend, ExportBitmapParams, FindSpotsParams, RawBitmap, SpotfindingStats,
};
use dials_rest::error::BackendError;
use dials_rest::server::{create_router, RouterConfig};

pub const TEST_SECRET: &str = "test-secret-key-for-jwt-signing";

// =============================================================================
// Mock Backend with Request Tracking
// =============================================================================

/// A mock analysis backend that tracks how many times it was invoked.
///
/// Tracking lets tests assert that rejected requests never reach the
/// protected operation.
#[derive(Clone)]
pub struct MockBackend {
    call_count: Arc<AtomicUsize>,
    missing_file: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            call_count: Arc::new(AtomicUsize::new(0)),
            missing_file: false,
        }
    }

    /// A backend whose input file never exists.
    pub fn file_not_found() -> Self {
        Self {
            call_count: Arc::new(AtomicUsize::new(0)),
            missing_file: true,
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisBackend for MockBackend {
    async fn find_spots(
        &self,
        params: &FindSpotsParams,
    ) -> Result<SpotfindingStats, BackendError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.missing_file {
            return Err(BackendError::FileNotFound {
                path: params.filename.display().to_string(),
            });
        }
        Ok(sample_stats())
    }

    async fn export_bitmap(
        &self,
        params: &ExportBitmapParams,
    ) -> Result<RawBitmap, BackendError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.missing_file {
            return Err(BackendError::FileNotFound {
                path: params.filename.display().to_string(),
            });
        }
        Ok(sample_bitmap())
    }
}

/// Representative per-image statistics.
pub fn sample_stats() -> SpotfindingStats {
    SpotfindingStats {
        n_spots_4a: 36,
        n_spots_no_ice: 44,
        n_spots_total: 49,
        total_intensity: 56848.0,
        d_min_distl_method_1: Some(4.234420130210043),
        d_min_distl_method_2: Some(4.053322019536269),
        estimated_d_min: Some(3.517157644985513),
        noisiness_method_1: Some(0.15019762845849802),
        noisiness_method_2: Some(0.46842105263157896),
    }
}

/// A small grey RGB bitmap.
pub fn sample_bitmap() -> RawBitmap {
    RawBitmap {
        width: 8,
        height: 8,
        pixels: vec![180; 8 * 8 * 3],
    }
}

// =============================================================================
// Router and Token Helpers
// =============================================================================

/// Build an authenticated router over the given backend.
pub fn test_router(backend: MockBackend) -> Router {
    create_router(backend, RouterConfig::new(TEST_SECRET).with_tracing(false))
}

/// Issue a token under the test secret, valid for `ttl`.
pub fn issue_token(ttl: Duration) -> String {
    TokenAuth::new(TEST_SECRET)
        .issue(Default::default(), None, Some(ttl))
        .unwrap()
}

/// Issue a token under the test secret that expired `age` ago.
pub fn issue_stale_token(age: Duration) -> String {
    TokenAuth::new(TEST_SECRET)
        .issue(Default::default(), Some(SystemTime::now() - age), None)
        .unwrap()
}

/// POST a JSON body to the router, optionally with a raw Authorization header.
pub async fn post_json(
    router: Router,
    uri: &str,
    authorization: Option<&str>,
    body: serde_json::Value,
) -> Response<Body> {
    let mut request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");

    if let Some(authorization) = authorization {
        request = request.header(header::AUTHORIZATION, authorization);
    }

    let request = request
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();

    router.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Collect a response body as raw bytes.
pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

/// Assert a 401 rejection with the given error type and reason.
pub async fn assert_rejected(response: Response<Body>, error_type: &str, message: &str) {
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let error = body_json(response).await;
    assert_eq!(error["error"], error_type);
    assert_eq!(error["message"], message);
}
