//! Entering/exiting resolution for registered vehicles.
//!
//! A vehicle is inside exactly when it has an open transit record. Each
//! accepted scan toggles that: an open record is closed (exiting), otherwise
//! a new one is opened (entering). The resolver runs only on the engine task,
//! so the read-then-toggle is never interleaved with another scan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GatelogError, Result};
use crate::store::{RegistrationLookup, TransitStore};
use crate::types::{TrackedObject, TransitDirection, TransitRecord};

/// A committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transit {
    /// Entering or exiting.
    pub direction: TransitDirection,
    /// The vehicle.
    pub object: TrackedObject,
    /// The record as stored after the transition.
    pub record: TransitRecord,
}

/// Toggles the transit state of vehicles in a store.
#[derive(Debug, Clone)]
pub struct TransitResolver<S> {
    store: S,
}

impl<S> TransitResolver<S>
where
    S: RegistrationLookup + TransitStore,
{
    /// Resolver over `store`.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Toggle the state of the vehicle carrying `identifier`.
    ///
    /// # Errors
    ///
    /// Returns [`GatelogError::ObjectNotFound`] if no vehicle carries the
    /// identifier, or a store error if a lookup or write fails. Nothing is
    /// written on error.
    pub async fn resolve(&self, identifier: &str, at: DateTime<Utc>) -> Result<Transit> {
        let object = self
            .store
            .find_tracked_object(identifier)
            .await?
            .ok_or_else(|| GatelogError::ObjectNotFound(identifier.to_string()))?;

        let (direction, record) = match self.store.find_open_record(object.id).await? {
            Some(open) => (
                TransitDirection::Exiting,
                self.store.close_record(open.id, at).await?,
            ),
            None => (
                TransitDirection::Entering,
                self.store.open_record(object.id, at).await?,
            ),
        };

        tracing::info!(
            epc = %object.epc,
            plate_no = object.plate_no.as_deref().unwrap_or("-"),
            direction = ?direction,
            "Transit resolved"
        );

        Ok(Transit {
            direction,
            object,
            record,
        })
    }
}
