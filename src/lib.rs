//! # DIALS REST API
//!
//! A RESTful API to a (limited) subset of DIALS diffraction-image analysis.
//!
//! This library provides a thin HTTP façade over the DIALS data-reduction
//! toolkit: per-image spot-finding statistics and bitmap export, protected
//! by JWT bearer authentication. The scientific computation itself happens
//! in the toolkit's helper executables; this crate contains the
//! authentication subsystem, the typed request/response models, the HTTP
//! layer and the administrative token-minting command.
//!
//! ## Authorization
//!
//! Requests to the analysis endpoints must carry an
//! `Authorization: Bearer <token>` header. Tokens are HMAC-SHA256 signed
//! JWTs carrying an expiry claim, minted out-of-band with the `token`
//! subcommand. For example:
//!
//! ```text
//! $ dials-rest token --expiry 2026-12-31T00:00:00Z
//! eyJ0eXAiOiJKV1QiLCJhbGciOiJIUzI1NiJ9...
//!
//! $ curl -X POST https://example-dials-rest.com/find_spots \
//!     -H "Authorization: Bearer $TOKEN" \
//!     -H "Content-Type: application/json" \
//!     -d '{"filename": "/path/to/image_00001.cbf", "d_min": 3.5}'
//! ```
//!
//! ## Architecture
//!
//! - [`auth`] - Token issuance, verification and the bearer middleware
//! - [`backend`] - Request/response models and the toolkit delegation seam
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//! - [`error`] - Backend error taxonomy

pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod server;

// Re-export commonly used types
pub use auth::{
    bearer_auth_middleware, parse_bearer_header, AuthError, BearerToken, Claims, TokenAuth,
    DEFAULT_TOKEN_TTL,
};
pub use backend::{
    AnalysisBackend, BitmapFormat, ColourScheme, DisplayMode, ExportBitmapParams, FindSpotsParams,
    IceRingsParams, RawBitmap, ResolutionRingsParams, SpaceGroup, SpotfindingStats,
    SubprocessBackend, ThresholdAlgorithm,
};
pub use config::{Cli, Command, SecretConfig, ServeConfig, TokenConfig};
pub use error::BackendError;
pub use server::{create_router, AppState, ErrorResponse, HealthResponse, RouterConfig};
