//! HTTP server layer for the DIALS REST API.
//!
//! This module provides the HTTP API over the analysis backend.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │        POST /find_spots        POST /export_bitmap              │
//! │                                                                 │
//! │  ┌─────────────┐  ┌──────────────┐  ┌────────────────────────┐  │
//! │  │  handlers   │  │  auth (JWT)  │  │        routes          │  │
//! │  │ (requests)  │  │  middleware  │  │   (router config)      │  │
//! │  └─────────────┘  └──────────────┘  └────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    export_bitmap_handler, find_spots_handler, health_handler, AppState, ErrorResponse,
    HealthResponse,
};
pub use routes::{create_router, RouterConfig};
