//! API integration tests for the analysis endpoints.
//!
//! Tests verify:
//! - Spot-finding statistics round trip, including default and string-form
//!   parameters
//! - Bitmap export encoding and content types
//! - Error handling (missing file, invalid parameters, malformed bodies)

use std::time::Duration;

use axum::http::{header, StatusCode};
use serde_json::json;

use super::test_utils::{
    body_bytes, body_json, issue_token, post_json, sample_stats, test_router, MockBackend,
};

fn authorization() -> String {
    format!("Bearer {}", issue_token(Duration::from_secs(600)))
}

// =============================================================================
// Spot-Finding
// =============================================================================

#[tokio::test]
async fn test_find_spots_returns_statistics() {
    let router = test_router(MockBackend::new());

    let response = post_json(
        router,
        "/find_spots",
        Some(&authorization()),
        json!({
            "filename": "/data/image_00001.cbf",
            "d_min": 3.5,
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );

    let body = body_json(response).await;
    assert_eq!(body, serde_json::to_value(sample_stats()).unwrap());
}

#[tokio::test]
async fn test_find_spots_accepts_scan_range_string() {
    let router = test_router(MockBackend::new());

    let response = post_json(
        router,
        "/find_spots",
        Some(&authorization()),
        json!({
            "filename": "/data/image_#####.cbf",
            "scan_range": "1,1",
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_find_spots_invalid_d_min_rejected() {
    let backend = MockBackend::new();
    let router = test_router(backend.clone());

    let response = post_json(
        router,
        "/find_spots",
        Some(&authorization()),
        json!({
            "filename": "/data/image_00001.cbf",
            "d_min": -1.0,
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let error = body_json(response).await;
    assert_eq!(error["error"], "invalid_parameters");

    // Validation failures never reach the backend
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_find_spots_missing_file_is_404() {
    let router = test_router(MockBackend::file_not_found());

    let response = post_json(
        router,
        "/find_spots",
        Some(&authorization()),
        json!({ "filename": "/data/no_such_image.cbf" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error = body_json(response).await;
    assert_eq!(error["error"], "not_found");
    assert!(error["message"]
        .as_str()
        .unwrap()
        .contains("/data/no_such_image.cbf"));
}

#[tokio::test]
async fn test_find_spots_malformed_body_rejected() {
    let router = test_router(MockBackend::new());

    // Missing the required filename field
    let response = post_json(router, "/find_spots", Some(&authorization()), json!({})).await;

    assert!(
        response.status() == StatusCode::BAD_REQUEST
            || response.status() == StatusCode::UNPROCESSABLE_ENTITY,
        "Expected 400 or 422, got {}",
        response.status()
    );
}

// =============================================================================
// Bitmap Export
// =============================================================================

#[tokio::test]
async fn test_export_bitmap_defaults_to_png() {
    let router = test_router(MockBackend::new());

    let response = post_json(
        router,
        "/export_bitmap",
        Some(&authorization()),
        json!({ "filename": "/data/image_00001.cbf" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/png"
    );

    let bytes = body_bytes(response).await;
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
}

#[tokio::test]
async fn test_export_bitmap_jpeg() {
    let router = test_router(MockBackend::new());

    let response = post_json(
        router,
        "/export_bitmap",
        Some(&authorization()),
        json!({
            "filename": "/data/image_00001.cbf",
            "format": "jpeg",
            "binning": 4,
            "colour_scheme": "inverse_greyscale",
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/jpeg"
    );

    let bytes = body_bytes(response).await;
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
}

#[tokio::test]
async fn test_export_bitmap_invalid_binning_rejected() {
    let backend = MockBackend::new();
    let router = test_router(backend.clone());

    let response = post_json(
        router,
        "/export_bitmap",
        Some(&authorization()),
        json!({
            "filename": "/data/image_00001.cbf",
            "binning": 0,
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_export_bitmap_invalid_unit_cell_rejected() {
    let router = test_router(MockBackend::new());

    let response = post_json(
        router,
        "/export_bitmap",
        Some(&authorization()),
        json!({
            "filename": "/data/image_00001.cbf",
            "ice_rings": {
                "show": true,
                "unit_cell": [0.0, 4.498, 7.338, 90.0, 90.0, 120.0],
            },
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let error = body_json(response).await;
    assert_eq!(error["error"], "invalid_parameters");
}

#[tokio::test]
async fn test_export_bitmap_missing_file_is_404() {
    let router = test_router(MockBackend::file_not_found());

    let response = post_json(
        router,
        "/export_bitmap",
        Some(&authorization()),
        json!({ "filename": "/data/no_such_image.cbf" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let router = test_router(MockBackend::new());

    let response = post_json(
        router,
        "/no_such_endpoint",
        Some(&authorization()),
        json!({}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
