//! Reader connection API endpoints.
//!
//! The connection is supervised in the background and retried forever;
//! these endpoints only observe it, reset its statistics, or probe the
//! reader address on demand.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use gatelog_core::{
    probe_reachability, ConnectionEvent, ConnectionState, HealthSnapshot, ReachabilityResult,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the connection router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_connection))
        .route("/reset", post(reset_connection_stats))
        .route("/ping", post(ping_reader))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Reader connection status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectionResponse {
    /// Reader address.
    #[schema(example = "10.10.100.254:49152")]
    pub address: String,

    /// Current connection state.
    pub state: ConnectionState,

    /// Connection statistics, history and alerts.
    pub health: HealthSnapshot,

    /// Latest reachability probe, if one has run.
    pub reachability: Option<ReachabilityResult>,
}

/// Response after resetting connection statistics.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "success": true }))]
pub struct ResetResponse {
    /// Always true.
    pub success: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get reader connection state and health.
#[utoipa::path(
    get,
    path = "/api/connection",
    tag = "connection",
    operation_id = "getConnection",
    summary = "Get reader connection status",
    description = "Returns the current connection state, connection statistics \
        (attempts, success rate, latency, failure streak), recent history, raised \
        alerts and the latest reachability probe.",
    responses(
        (status = 200, description = "Connection status", body = ConnectionResponse),
        (status = 503, description = "Engine not running")
    )
)]
pub async fn get_connection(
    State(state): State<SharedState>,
) -> ApiResult<Json<ConnectionResponse>> {
    let health = state.engine.health().await?;
    let reachability = state.engine.reachability().await?;

    Ok(Json(ConnectionResponse {
        address: state.config.reader.address(),
        state: *state.connection.borrow(),
        health,
        reachability,
    }))
}

/// Reset connection statistics.
#[utoipa::path(
    post,
    path = "/api/connection/reset",
    tag = "connection",
    operation_id = "resetConnectionStats",
    summary = "Reset connection statistics",
    description = "Clears attempt counters, latency samples, history and alerts. \
        The alert cooldown is cleared too.",
    responses(
        (status = 200, description = "Statistics reset", body = ResetResponse),
        (status = 503, description = "Engine not running")
    )
)]
pub async fn reset_connection_stats(
    State(state): State<SharedState>,
) -> ApiResult<Json<ResetResponse>> {
    state.engine.reset_health().await?;
    Ok(Json(ResetResponse { success: true }))
}

/// Probe the reader address now.
#[utoipa::path(
    post,
    path = "/api/connection/ping",
    tag = "connection",
    operation_id = "pingReader",
    summary = "Probe reader reachability",
    description = "Opens and closes a TCP connection to the reader address and \
        reports whether it succeeded and how long it took. The result also \
        replaces the latest periodic probe result.",
    responses(
        (status = 200, description = "Probe finished", body = ReachabilityResult)
    )
)]
pub async fn ping_reader(State(state): State<SharedState>) -> Json<ReachabilityResult> {
    let reader = &state.config.reader;
    let result =
        probe_reachability(&reader.host, reader.port, state.config.reachability.timeout()).await;

    if state
        .connection_events
        .send(ConnectionEvent::Reachability(result.clone()))
        .await
        .is_err()
    {
        tracing::warn!("Engine stopped; probe result not recorded");
    }

    Json(result)
}
