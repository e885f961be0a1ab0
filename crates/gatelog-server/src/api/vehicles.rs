//! Vehicle registration API endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use gatelog_core::{NewVehicle, RegistrationOutcome, TrackedObject};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the vehicles router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", post(register_vehicle))
}

/// Whether the registration created a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    /// A new vehicle was stored.
    Registered,
    /// The tag was already registered; nothing changed.
    Exists,
}

/// Response after a registration request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterVehicleResponse {
    /// Outcome.
    pub status: RegistrationStatus,

    /// The stored vehicle.
    pub vehicle: TrackedObject,
}

/// Register a vehicle by tag identifier.
#[utoipa::path(
    post,
    path = "/api/vehicles",
    tag = "vehicles",
    operation_id = "registerVehicle",
    summary = "Register a vehicle",
    description = "Associates a tag identifier with a vehicle. Registering an \
        identifier that already exists returns the stored vehicle unchanged \
        with status `exists`.",
    request_body = NewVehicle,
    responses(
        (status = 201, description = "Vehicle registered", body = RegisterVehicleResponse),
        (status = 200, description = "Tag already registered", body = RegisterVehicleResponse),
        (status = 400, description = "Blank tag identifier")
    )
)]
pub async fn register_vehicle(
    State(state): State<SharedState>,
    Json(request): Json<NewVehicle>,
) -> ApiResult<(StatusCode, Json<RegisterVehicleResponse>)> {
    if request.epc.trim().is_empty() {
        return Err(ApiError::bad_request(
            "invalid_identifier",
            "epc must not be empty",
        ));
    }

    let (status, registration, vehicle) = match state.store.register_vehicle(request).await? {
        RegistrationOutcome::Registered(vehicle) => {
            (StatusCode::CREATED, RegistrationStatus::Registered, vehicle)
        }
        RegistrationOutcome::Exists(vehicle) => {
            (StatusCode::OK, RegistrationStatus::Exists, vehicle)
        }
    };

    Ok((
        status,
        Json(RegisterVehicleResponse {
            status: registration,
            vehicle,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_optional_fields() {
        let request: NewVehicle =
            serde_json::from_str(r#"{"epc": "e20011223344556677889900"}"#).unwrap();
        assert!(request.plate_no.is_none());
        assert!(request.vehicle_name.is_none());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&RegistrationStatus::Exists).unwrap();
        assert_eq!(json, "\"exists\"");
    }
}
