//! Signal quality API endpoints.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use gatelog_core::{SignalQualityMetrics, SignalSnapshot};

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the signal router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_signal_stats))
        .route("/quality", get(get_signal_quality))
}

/// Get running signal statistics.
#[utoipa::path(
    get,
    path = "/api/signal",
    tag = "signal",
    operation_id = "getSignalStats",
    summary = "Get signal statistics",
    description = "Returns the number of frames scored, reads per signal category, \
        the mean frame length and the most recent samples.",
    responses(
        (status = 200, description = "Signal statistics", body = SignalSnapshot),
        (status = 503, description = "Engine not running")
    )
)]
pub async fn get_signal_stats(State(state): State<SharedState>) -> ApiResult<Json<SignalSnapshot>> {
    Ok(Json(state.engine.signal_stats().await?))
}

/// Get derived signal quality metrics.
#[utoipa::path(
    get,
    path = "/api/signal/quality",
    tag = "signal",
    operation_id = "getSignalQuality",
    summary = "Get signal quality metrics",
    description = "Returns strong and weak read percentages and how many recent \
        frames carry interference flags. A high interference count usually means \
        tags are being read through glass or from a bad angle.",
    responses(
        (status = 200, description = "Signal quality metrics", body = SignalQualityMetrics),
        (status = 503, description = "Engine not running")
    )
)]
pub async fn get_signal_quality(
    State(state): State<SharedState>,
) -> ApiResult<Json<SignalQualityMetrics>> {
    Ok(Json(state.engine.signal_quality().await?))
}
