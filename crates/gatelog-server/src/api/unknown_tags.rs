//! Unknown tag archive API endpoints.
//!
//! Tags that were read but are not registered, and frames that carried no
//! recognizable tag, are kept in a bounded archive so an operator can
//! register new vehicles or spot a misbehaving reader.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use gatelog_core::UnknownTagRecord;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the unknown tags router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_unknown_tags).delete(clear_unknown_tags))
        .route("/export", get(export_unknown_tags))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Archived unknown tags.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UnknownTagsResponse {
    /// Number of records returned.
    #[schema(example = 1)]
    pub count: usize,

    /// Maximum number of records the archive keeps.
    #[schema(example = 1000)]
    pub capacity: usize,

    /// Records, newest first.
    pub tags: Vec<UnknownTagRecord>,
}

/// Response after clearing the archive.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "removed": 12 }))]
pub struct ClearUnknownTagsResponse {
    /// Number of records removed.
    pub removed: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// List archived unknown tags.
#[utoipa::path(
    get,
    path = "/api/unknown-tags",
    tag = "unknown-tags",
    operation_id = "listUnknownTags",
    summary = "List unknown tags",
    description = "Returns tags that were read but not registered, and frames \
        without a recognizable tag (placeholder `INVALID_PATTERN-...`), newest first.",
    responses(
        (status = 200, description = "Archived tags", body = UnknownTagsResponse),
        (status = 503, description = "Engine not running")
    )
)]
pub async fn list_unknown_tags(
    State(state): State<SharedState>,
) -> ApiResult<Json<UnknownTagsResponse>> {
    let tags = state.engine.unknown_tags().await?;
    Ok(Json(UnknownTagsResponse {
        count: tags.len(),
        capacity: state.config.archive.capacity,
        tags,
    }))
}

/// Clear the archive.
#[utoipa::path(
    delete,
    path = "/api/unknown-tags",
    tag = "unknown-tags",
    operation_id = "clearUnknownTags",
    summary = "Clear unknown tags",
    description = "Removes every archived record.",
    responses(
        (status = 200, description = "Archive cleared", body = ClearUnknownTagsResponse),
        (status = 503, description = "Engine not running")
    )
)]
pub async fn clear_unknown_tags(
    State(state): State<SharedState>,
) -> ApiResult<Json<ClearUnknownTagsResponse>> {
    let removed = state.engine.clear_unknown_tags().await?;
    Ok(Json(ClearUnknownTagsResponse { removed }))
}

/// Download the archive as a JSON file.
#[utoipa::path(
    get,
    path = "/api/unknown-tags/export",
    tag = "unknown-tags",
    operation_id = "exportUnknownTags",
    summary = "Export unknown tags",
    description = "Returns the archive as a pretty-printed JSON array, oldest \
        first, as a file attachment.",
    responses(
        (
            status = 200,
            description = "JSON export",
            body = Vec<UnknownTagRecord>,
            content_type = "application/json"
        ),
        (status = 503, description = "Engine not running")
    )
)]
pub async fn export_unknown_tags(
    State(state): State<SharedState>,
) -> ApiResult<impl IntoResponse> {
    let json = state.engine.export_unknown_tags().await?;
    let filename = format!(
        "attachment; filename=\"unknown_tags_{}.json\"",
        Utc::now().format("%Y%m%d_%H%M%S")
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        json,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_response_serialization() {
        let json = serde_json::to_string(&ClearUnknownTagsResponse { removed: 3 }).unwrap();
        assert_eq!(json, r#"{"removed":3}"#);
    }
}
