//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `health` - Service health checks
//! - `signal` - Signal statistics and quality metrics
//! - `connection` - Reader connection status, reset and probing
//! - `unknown_tags` - Unknown tag archive
//! - `vehicles` - Vehicle registration
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod connection;
pub mod error;
pub mod health;
pub mod openapi;
pub mod signal;
pub mod unknown_tags;
pub mod vehicles;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                - Health check
/// /api
/// ├── /signal            - Signal statistics and quality metrics
/// ├── /connection        - Reader connection status, reset, ping
/// ├── /unknown-tags      - Unknown tag archive (list, clear, export)
/// ├── /vehicles          - Vehicle registration
/// └── /openapi.json      - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/signal", signal::router())
                .nest("/connection", connection::router())
                .nest("/unknown-tags", unknown_tags::router())
                .nest("/vehicles", vehicles::router()),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
