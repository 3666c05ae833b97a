//! Router configuration for the DIALS REST API.
//!
//! This module defines the HTTP routes and applies middleware for bearer
//! authentication and CORS.
//!
//! # Route Structure
//!
//! ```text
//! /health          - Health check (public)
//! /find_spots      - Spot-finding statistics (protected)
//! /export_bitmap   - Bitmap export (protected)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use dials_rest::server::routes::{create_router, RouterConfig};
//! use dials_rest::backend::SubprocessBackend;
//!
//! let backend = SubprocessBackend::new("dials.rest.find_spots", "dials.rest.export_bitmap");
//!
//! let config = RouterConfig::new("my-secret-key")
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(backend, config);
//!
//! // Run the server
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{export_bitmap_handler, find_spots_handler, health_handler, AppState};
use crate::auth::{bearer_auth_middleware, TokenAuth};
use crate::backend::AnalysisBackend;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Clone)]
pub struct RouterConfig {
    /// Shared secret for JWT bearer authentication
    pub auth_secret: String,

    /// Whether authentication is enforced on the analysis routes
    pub auth_enabled: bool,

    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Create a new router configuration with the given auth secret.
    ///
    /// By default:
    /// - Authentication is enabled
    /// - CORS allows any origin
    /// - Tracing is enabled
    pub fn new(auth_secret: impl Into<String>) -> Self {
        Self {
            auth_secret: auth_secret.into(),
            auth_enabled: true,
            cors_origins: None, // Allow any origin by default
            enable_tracing: true,
        }
    }

    /// Create a configuration with authentication disabled.
    ///
    /// **Warning**: This should only be used for development/testing.
    pub fn without_auth() -> Self {
        Self {
            auth_secret: String::new(),
            auth_enabled: false,
            cors_origins: None,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass None (or don't call this method) to allow any origin.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Enable or disable authentication.
    pub fn with_auth_enabled(mut self, enabled: bool) -> Self {
        self.auth_enabled = enabled;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// This function builds the complete Axum router with:
/// - Public routes (health check)
/// - Protected routes (analysis API behind bearer authentication)
/// - CORS configuration
/// - Request tracing (optional)
pub fn create_router<B>(backend: B, config: RouterConfig) -> Router
where
    B: AnalysisBackend + 'static,
{
    let app_state = AppState::new(backend);

    let cors = build_cors_layer(&config);

    let analysis_routes = Router::new()
        .route("/find_spots", post(find_spots_handler::<B>))
        .route("/export_bitmap", post(export_bitmap_handler::<B>))
        .with_state(app_state);

    let analysis_routes = if config.auth_enabled {
        let auth = TokenAuth::new(&config.auth_secret);
        analysis_routes.layer(middleware::from_fn_with_state(auth, bearer_auth_middleware))
    } else {
        analysis_routes
    };

    let public_routes = Router::new().route("/health", get(health_handler));

    let router = Router::new()
        .merge(analysis_routes)
        .merge(public_routes)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => {
            // No origins allowed - this effectively disables CORS
            cors
        }
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
