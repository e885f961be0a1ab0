//! Application state shared across handlers, and the background tasks
//! behind it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gatelog_core::{
    run_reachability_probe, Config, ConnectionEvent, ConnectionState, ConnectionSupervisor,
    EngineHandle, EventBus, MemoryStore, ScanEngine, ScanEvent, CONNECTION_CHANNEL_CAPACITY,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// Shared application state.
pub type SharedState = Arc<AppState>;

/// Everything a handler can reach.
#[derive(Debug)]
pub struct AppState {
    /// Client for the engine task.
    pub engine: EngineHandle,
    /// Vehicle registrations and transit records.
    pub store: MemoryStore,
    /// Effective configuration.
    pub config: Config,
    /// Reader connection state published by the supervisor.
    pub connection: watch::Receiver<ConnectionState>,
    /// Channel into the engine, for results produced outside the
    /// supervisor (on-demand reachability probes).
    pub connection_events: mpsc::Sender<ConnectionEvent>,
    /// When the service started.
    pub started_at: DateTime<Utc>,
}

/// Running background tasks. Dropping this does not stop them; call
/// [`Services::shutdown`].
#[derive(Debug)]
pub struct Services {
    /// State for the router.
    pub state: SharedState,
    tasks: Vec<JoinHandle<()>>,
}

impl Services {
    /// Spawn the engine, the connection supervisor, the reachability probe
    /// and the event logger.
    #[must_use]
    pub fn start(config: Config, store: MemoryStore, bus: EventBus) -> Self {
        let (events_tx, events_rx) = mpsc::channel(CONNECTION_CHANNEL_CAPACITY);
        let (engine, handle) = ScanEngine::new(store.clone(), bus.clone(), &config);
        let (supervisor, connection) =
            ConnectionSupervisor::new(config.reader.clone(), events_tx.clone());

        let tasks = vec![
            tokio::spawn(log_events(bus.subscribe())),
            tokio::spawn(engine.run(events_rx)),
            tokio::spawn(supervisor.run()),
            tokio::spawn(run_reachability_probe(
                config.reachability.clone(),
                config.reader.clone(),
                events_tx.clone(),
            )),
        ];

        let state = Arc::new(AppState {
            engine: handle,
            store,
            config,
            connection,
            connection_events: events_tx,
            started_at: Utc::now(),
        });

        Self { state, tasks }
    }

    /// Abort every background task.
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

/// Write scan outcomes to the log. This is the service's event sink.
async fn log_events(mut events: broadcast::Receiver<ScanEvent>) {
    loop {
        match events.recv().await {
            Ok(ScanEvent::ScanResult {
                epc,
                status,
                object,
                error,
                ..
            }) => tracing::info!(
                epc = %epc,
                status = ?status,
                plate_no = object.as_ref().and_then(|o| o.plate_no.as_deref()).unwrap_or("-"),
                error = error.as_deref().unwrap_or(""),
                "Scan result"
            ),
            Ok(ScanEvent::UnknownTagDetected(record)) => tracing::info!(
                tag = %record.epc_or_placeholder,
                len = record.data_length,
                "Unknown tag archived"
            ),
            Ok(ScanEvent::ReachabilityUpdate(result)) => tracing::debug!(
                address = %result.address,
                reachable = result.reachable,
                latency_ms = ?result.latency_ms,
                "Reachability"
            ),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event logger lagged behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
