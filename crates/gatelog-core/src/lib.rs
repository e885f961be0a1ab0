//! # gatelog-core
//!
//! Core ingestion engine for the gatelog RFID gate reader.
//!
//! This crate provides:
//! - A supervised TCP connection to the reader that reconnects forever
//! - Tag identifier extraction from noisy reader frames
//! - Signal quality scoring and connection health alerting
//! - Duplicate suppression and entering/exiting resolution per vehicle
//! - A bounded archive of tags that did not resolve
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`supervisor`] - Reader socket lifecycle and reachability probing
//! - [`decoder`] - Ordered-cascade identifier extraction
//! - [`signal`] - Frame-length signal scoring and running statistics
//! - [`dedup`] - Per-identifier duplicate window
//! - [`archive`] - Unknown tag archive
//! - [`health`] - Connection statistics and alerts
//! - [`resolver`] - Entering/exiting resolution
//! - [`pipeline`] - Per-frame processing through every stage above
//! - [`engine`] - The task that owns all engine state, and its handle
//! - [`events`] - Observability events and the broadcast bus
//! - [`store`] - Registration and transit store traits, in-memory store
//! - [`config`] - Layered configuration
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared types and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod archive;
pub mod config;
pub mod decoder;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod events;
pub mod health;
pub mod pipeline;
pub mod resolver;
pub mod signal;
pub mod store;
pub mod supervisor;
pub mod types;

// Re-export primary types for convenience
pub use archive::{UnknownTagArchive, UnknownTagRecord, INVALID_PATTERN};
pub use config::{
    ArchiveConfig, Config, ConfigError, ConfigResult, DedupConfig, HealthConfig,
    ReachabilityConfig, ReaderConfig, ServerConfig, SignalConfig, DEFAULT_LOG_FILTER,
};
pub use decoder::{FrameDecoder, TagMatcher, IDENTIFIER_HEX_LEN};
pub use dedup::Deduplicator;
pub use engine::{EngineCommand, EngineHandle, ScanEngine, CONNECTION_CHANNEL_CAPACITY};
pub use error::{GatelogError, Result};
pub use events::{EventBus, ScanEvent};
pub use health::{Alert, AlertLevel, ConnectionRecord, HealthMonitor, HealthSnapshot};
pub use pipeline::{FrameOutcome, ScanPipeline};
pub use resolver::{Transit, TransitResolver};
pub use signal::{
    analyze, CategoryCounts, InterferenceFlags, SignalCategory, SignalQuality,
    SignalQualityMetrics, SignalSample, SignalSnapshot, SignalStats,
};
pub use store::{
    MemoryStore, NewVehicle, RegistrationLookup, RegistrationOutcome, StoreError, StoreResult,
    TransitStore,
};
pub use supervisor::{
    probe_reachability, run_reachability_probe, ConnectionEvent, ConnectionSupervisor,
};
pub use types::{
    ConnectionState, DecodedTag, RawFrame, ReachabilityResult, ScanStatus, TrackedObject,
    TransitDirection, TransitRecord,
};
