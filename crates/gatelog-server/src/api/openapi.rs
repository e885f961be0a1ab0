//! OpenAPI specification generation for the gatelog API.
//!
//! The document is served at `/api/openapi.json` and written to the
//! workspace root by the `gen-openapi` binary.

use axum::Json;
use utoipa::OpenApi;

use gatelog_core::{
    Alert, AlertLevel, CategoryCounts, ConnectionRecord, ConnectionState, HealthSnapshot,
    InterferenceFlags, NewVehicle, ReachabilityResult, SignalCategory, SignalQualityMetrics,
    SignalSample, SignalSnapshot, TrackedObject, UnknownTagRecord,
};

use super::connection::{ConnectionResponse, ResetResponse};
use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::unknown_tags::{ClearUnknownTagsResponse, UnknownTagsResponse};
use super::vehicles::{RegisterVehicleResponse, RegistrationStatus};

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as a pretty JSON string.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> serde_json::Result<String> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for gatelog.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "gatelog API",
        version = "0.1.0",
        description = r#"
# gatelog API

gatelog watches an RFID reader at a vehicle gate and logs when registered
vehicles enter and leave.

## Overview

The service keeps a connection to the reader open around the clock and:

1. **Decodes** tag identifiers from the reader's raw frames
2. **Deduplicates** repeated reads of a parked tag
3. **Resolves** each new read into an entry or an exit for the vehicle
4. **Archives** tags that are not registered, for later registration

This API exposes signal quality, connection health and the unknown tag
archive, and registers vehicles.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local gatelog server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "signal", description = "Signal quality of reader frames"),
        (name = "connection", description = "Reader connection status, statistics and probing"),
        (name = "unknown-tags", description = "Archive of unregistered and undecodable tags"),
        (name = "vehicles", description = "Vehicle registration")
    ),
    paths(
        super::health::health_check,
        super::signal::get_signal_stats,
        super::signal::get_signal_quality,
        super::connection::get_connection,
        super::connection::reset_connection_stats,
        super::connection::ping_reader,
        super::unknown_tags::list_unknown_tags,
        super::unknown_tags::clear_unknown_tags,
        super::unknown_tags::export_unknown_tags,
        super::vehicles::register_vehicle,
    ),
    components(
        schemas(
            // Error types
            ErrorResponse,
            // Health types
            HealthResponse,
            ConnectionState,
            // Signal types
            SignalSnapshot,
            SignalSample,
            SignalCategory,
            CategoryCounts,
            InterferenceFlags,
            SignalQualityMetrics,
            // Connection types
            ConnectionResponse,
            ResetResponse,
            HealthSnapshot,
            ConnectionRecord,
            Alert,
            AlertLevel,
            ReachabilityResult,
            // Unknown tag types
            UnknownTagRecord,
            UnknownTagsResponse,
            ClearUnknownTagsResponse,
            // Vehicle types
            NewVehicle,
            TrackedObject,
            RegisterVehicleResponse,
            RegistrationStatus,
        )
    )
)]
pub struct ApiDoc;
