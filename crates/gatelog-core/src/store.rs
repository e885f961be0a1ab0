//! Registration lookup and transit persistence.
//!
//! The engine talks to storage only through [`RegistrationLookup`] and
//! [`TransitStore`]. Deployments backed by a database implement both traits;
//! [`MemoryStore`] is the in-process implementation the service ships with.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::types::{TrackedObject, TransitRecord};

/// Errors raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No vehicle carries this identifier.
    #[error("No vehicle registered for tag {0}")]
    VehicleNotFound(String),

    /// The identifier is blank or malformed.
    #[error("Invalid tag identifier: {0:?}")]
    InvalidEpc(String),

    /// The transit record does not exist.
    #[error("Transit record not found: {0}")]
    RecordNotFound(Uuid),

    /// The transit record was already closed.
    #[error("Transit record already closed: {0}")]
    RecordClosed(Uuid),

    /// The vehicle already has an open transit record.
    #[error("Vehicle {0} already has an open transit record")]
    AlreadyOpen(Uuid),

    /// The backend could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Seed file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Seed file could not be parsed.
    #[error("Invalid vehicle data: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Read-only view of registered vehicles.
pub trait RegistrationLookup: Send + Sync {
    /// Whether any vehicle carries `epc`.
    fn is_registered(&self, epc: &str) -> impl Future<Output = StoreResult<bool>> + Send;

    /// The vehicle carrying `epc`.
    fn find_tracked_object(
        &self,
        epc: &str,
    ) -> impl Future<Output = StoreResult<Option<TrackedObject>>> + Send;
}

/// Time-in / time-out records.
pub trait TransitStore: Send + Sync {
    /// The vehicle's record with no time-out, if any.
    fn find_open_record(
        &self,
        vehicle_id: Uuid,
    ) -> impl Future<Output = StoreResult<Option<TransitRecord>>> + Send;

    /// Open a record with `time_in = at`.
    fn open_record(
        &self,
        vehicle_id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<TransitRecord>> + Send;

    /// Set `time_out = at` on an open record.
    fn close_record(
        &self,
        record_id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<TransitRecord>> + Send;
}

/// A vehicle registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NewVehicle {
    /// Tag identifier. Trimmed and lowercased before storing.
    #[schema(example = "e20011223344556677889900")]
    pub epc: String,
    /// License plate number.
    #[serde(default)]
    pub plate_no: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub vehicle_name: Option<String>,
}

/// Result of [`MemoryStore::register_vehicle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// A new vehicle was stored.
    Registered(TrackedObject),
    /// The identifier was already registered; the stored vehicle is returned
    /// unchanged.
    Exists(TrackedObject),
}

impl RegistrationOutcome {
    /// The vehicle, new or existing.
    #[must_use]
    pub const fn object(&self) -> &TrackedObject {
        match self {
            Self::Registered(object) | Self::Exists(object) => object,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    vehicles: HashMap<String, TrackedObject>,
    records: Vec<TransitRecord>,
}

/// In-memory store. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

fn normalize_epc(epc: &str) -> String {
    epc.trim().to_lowercase()
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a vehicle unless its identifier is already taken.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidEpc`] if the identifier is blank.
    pub async fn register_vehicle(&self, vehicle: NewVehicle) -> StoreResult<RegistrationOutcome> {
        let epc = normalize_epc(&vehicle.epc);
        if epc.is_empty() {
            return Err(StoreError::InvalidEpc(vehicle.epc));
        }

        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.vehicles.get(&epc) {
            return Ok(RegistrationOutcome::Exists(existing.clone()));
        }

        let object = TrackedObject {
            id: Uuid::new_v4(),
            epc: epc.clone(),
            plate_no: vehicle.plate_no,
            vehicle_name: vehicle.vehicle_name,
        };
        inner.vehicles.insert(epc, object.clone());
        tracing::info!(epc = %object.epc, id = %object.id, "Vehicle registered");
        Ok(RegistrationOutcome::Registered(object))
    }

    /// Register every vehicle in a JSON array file. Returns how many were new.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or holds a
    /// blank identifier.
    pub async fn load_vehicles(&self, path: &Path) -> StoreResult<usize> {
        let content = tokio::fs::read_to_string(path).await?;
        let vehicles: Vec<NewVehicle> = serde_json::from_str(&content)?;

        let mut added = 0;
        for vehicle in vehicles {
            if matches!(
                self.register_vehicle(vehicle).await?,
                RegistrationOutcome::Registered(_)
            ) {
                added += 1;
            }
        }
        tracing::info!(path = %path.display(), added, "Loaded vehicle registrations");
        Ok(added)
    }

    /// All registered vehicles, sorted by identifier.
    pub async fn vehicles(&self) -> Vec<TrackedObject> {
        let inner = self.inner.read().await;
        let mut vehicles: Vec<TrackedObject> = inner.vehicles.values().cloned().collect();
        vehicles.sort_by(|a, b| a.epc.cmp(&b.epc));
        vehicles
    }

    /// Every transit record of one vehicle, oldest first.
    pub async fn records_for(&self, vehicle_id: Uuid) -> Vec<TransitRecord> {
        let inner = self.inner.read().await;
        inner
            .records
            .iter()
            .filter(|r| r.vehicle_id == vehicle_id)
            .cloned()
            .collect()
    }
}

impl RegistrationLookup for MemoryStore {
    async fn is_registered(&self, epc: &str) -> StoreResult<bool> {
        let epc = normalize_epc(epc);
        Ok(self.inner.read().await.vehicles.contains_key(&epc))
    }

    async fn find_tracked_object(&self, epc: &str) -> StoreResult<Option<TrackedObject>> {
        let epc = normalize_epc(epc);
        Ok(self.inner.read().await.vehicles.get(&epc).cloned())
    }
}

impl TransitStore for MemoryStore {
    async fn find_open_record(&self, vehicle_id: Uuid) -> StoreResult<Option<TransitRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .find(|r| r.vehicle_id == vehicle_id && r.is_open())
            .cloned())
    }

    async fn open_record(&self, vehicle_id: Uuid, at: DateTime<Utc>) -> StoreResult<TransitRecord> {
        let mut inner = self.inner.write().await;
        if inner
            .records
            .iter()
            .any(|r| r.vehicle_id == vehicle_id && r.is_open())
        {
            return Err(StoreError::AlreadyOpen(vehicle_id));
        }

        let record = TransitRecord {
            id: Uuid::new_v4(),
            vehicle_id,
            time_in: at,
            time_out: None,
        };
        inner.records.push(record.clone());
        Ok(record)
    }

    async fn close_record(&self, record_id: Uuid, at: DateTime<Utc>) -> StoreResult<TransitRecord> {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or(StoreError::RecordNotFound(record_id))?;
        if !record.is_open() {
            return Err(StoreError::RecordClosed(record_id));
        }
        record.time_out = Some(at);
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn van(epc: &str) -> NewVehicle {
        NewVehicle {
            epc: epc.into(),
            plate_no: Some("ABC 1234".into()),
            vehicle_name: Some("Service van".into()),
        }
    }

    #[tokio::test]
    async fn test_register_then_exists() {
        let store = MemoryStore::new();
        let first = store
            .register_vehicle(van(" E20011223344556677889900 "))
            .await
            .unwrap();
        assert!(matches!(first, RegistrationOutcome::Registered(_)));
        assert_eq!(first.object().epc, "e20011223344556677889900");

        let second = store
            .register_vehicle(van("e20011223344556677889900"))
            .await
            .unwrap();
        assert!(matches!(second, RegistrationOutcome::Exists(_)));
        assert_eq!(second.object().id, first.object().id);
        assert_eq!(store.vehicles().await.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_epc_is_rejected() {
        let store = MemoryStore::new();
        let err = store.register_vehicle(van("   ")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidEpc(_)));
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let store = MemoryStore::new();
        store
            .register_vehicle(van("e20011223344556677889900"))
            .await
            .unwrap();
        assert!(store
            .is_registered("E20011223344556677889900")
            .await
            .unwrap());
        assert!(store
            .find_tracked_object("e2ffffffffffffffffffffff")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_one_open_record_per_vehicle() {
        let store = MemoryStore::new();
        let vehicle = Uuid::new_v4();
        let now = Utc::now();

        let record = store.open_record(vehicle, now).await.unwrap();
        assert!(matches!(
            store.open_record(vehicle, now).await,
            Err(StoreError::AlreadyOpen(_))
        ));

        let closed = store.close_record(record.id, now).await.unwrap();
        assert_eq!(closed.time_out, Some(now));
        assert!(store.find_open_record(vehicle).await.unwrap().is_none());
        assert!(matches!(
            store.close_record(record.id, now).await,
            Err(StoreError::RecordClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_close_unknown_record() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.close_record(Uuid::new_v4(), Utc::now()).await,
            Err(StoreError::RecordNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_load_vehicles_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"epc": "e20011223344556677889900", "plate_no": "ABC 1234"}},
                {{"epc": "e2a1b2c3d4e5f60718293a4b"}},
                {{"epc": "E20011223344556677889900"}}
            ]"#
        )
        .unwrap();

        let store = MemoryStore::new();
        assert_eq!(store.load_vehicles(file.path()).await.unwrap(), 2);
        assert_eq!(store.vehicles().await.len(), 2);
    }

    #[tokio::test]
    async fn test_load_vehicles_rejects_bad_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let store = MemoryStore::new();
        assert!(matches!(
            store.load_vehicles(file.path()).await,
            Err(StoreError::Parse(_))
        ));
    }
}
