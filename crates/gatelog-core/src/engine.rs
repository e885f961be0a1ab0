//! The scan engine task.
//!
//! [`ScanEngine`] owns every piece of mutable engine state: the pipeline
//! (dedup map, signal statistics, unknown tag archive) and the health
//! monitor. It runs as a single task selecting over connection events,
//! commands and the periodic timers, so none of that state needs a lock.
//! Everything else talks to it through a cloneable [`EngineHandle`].

use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::archive::UnknownTagRecord;
use crate::config::Config;
use crate::error::{GatelogError, Result};
use crate::events::{EventBus, ScanEvent};
use crate::health::{Alert, AlertLevel, HealthMonitor, HealthSnapshot};
use crate::pipeline::{FrameOutcome, ScanPipeline};
use crate::signal::{SignalQualityMetrics, SignalSnapshot};
use crate::store::{RegistrationLookup, TransitStore};
use crate::supervisor::ConnectionEvent;
use crate::types::ReachabilityResult;

/// Capacity of the connection event channel.
pub const CONNECTION_CHANNEL_CAPACITY: usize = 256;
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Requests answered by the engine task.
#[derive(Debug)]
pub enum EngineCommand {
    /// Current signal statistics.
    SignalStats(oneshot::Sender<SignalSnapshot>),
    /// Derived signal percentages.
    SignalQuality(oneshot::Sender<SignalQualityMetrics>),
    /// Current connection health.
    Health(oneshot::Sender<HealthSnapshot>),
    /// Clear connection statistics and alerts.
    ResetHealth(oneshot::Sender<()>),
    /// Archived unknown tags, newest first.
    ListUnknownTags(oneshot::Sender<Vec<UnknownTagRecord>>),
    /// Empty the archive; replies with the number removed.
    ClearUnknownTags(oneshot::Sender<usize>),
    /// Archive contents as pretty JSON.
    ExportUnknownTags(oneshot::Sender<serde_json::Result<String>>),
    /// Latest reachability probe result.
    Reachability(oneshot::Sender<Option<ReachabilityResult>>),
}

/// Cloneable client for a running [`ScanEngine`].
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| GatelogError::EngineUnavailable)?;
        rx.await.map_err(|_| GatelogError::EngineUnavailable)
    }

    /// Current signal statistics.
    ///
    /// # Errors
    ///
    /// Returns [`GatelogError::EngineUnavailable`] if the engine has stopped.
    pub async fn signal_stats(&self) -> Result<SignalSnapshot> {
        self.request(EngineCommand::SignalStats).await
    }

    /// Derived signal percentages.
    ///
    /// # Errors
    ///
    /// Returns [`GatelogError::EngineUnavailable`] if the engine has stopped.
    pub async fn signal_quality(&self) -> Result<SignalQualityMetrics> {
        self.request(EngineCommand::SignalQuality).await
    }

    /// Current connection health.
    ///
    /// # Errors
    ///
    /// Returns [`GatelogError::EngineUnavailable`] if the engine has stopped.
    pub async fn health(&self) -> Result<HealthSnapshot> {
        self.request(EngineCommand::Health).await
    }

    /// Clear connection statistics and alerts.
    ///
    /// # Errors
    ///
    /// Returns [`GatelogError::EngineUnavailable`] if the engine has stopped.
    pub async fn reset_health(&self) -> Result<()> {
        self.request(EngineCommand::ResetHealth).await
    }

    /// Archived unknown tags, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`GatelogError::EngineUnavailable`] if the engine has stopped.
    pub async fn unknown_tags(&self) -> Result<Vec<UnknownTagRecord>> {
        self.request(EngineCommand::ListUnknownTags).await
    }

    /// Empty the archive. Returns the number of removed records.
    ///
    /// # Errors
    ///
    /// Returns [`GatelogError::EngineUnavailable`] if the engine has stopped.
    pub async fn clear_unknown_tags(&self) -> Result<usize> {
        self.request(EngineCommand::ClearUnknownTags).await
    }

    /// Archive contents as pretty JSON, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`GatelogError::EngineUnavailable`] if the engine has stopped,
    /// or [`GatelogError::Serialization`] if encoding fails.
    pub async fn export_unknown_tags(&self) -> Result<String> {
        Ok(self.request(EngineCommand::ExportUnknownTags).await??)
    }

    /// Latest reachability probe result.
    ///
    /// # Errors
    ///
    /// Returns [`GatelogError::EngineUnavailable`] if the engine has stopped.
    pub async fn reachability(&self) -> Result<Option<ReachabilityResult>> {
        self.request(EngineCommand::Reachability).await
    }
}

/// Single owner of the engine state.
#[derive(Debug)]
pub struct ScanEngine<S> {
    pipeline: ScanPipeline<S>,
    health: HealthMonitor,
    reachability: Option<ReachabilityResult>,
    bus: EventBus,
    commands: mpsc::Receiver<EngineCommand>,
    sweep_interval: Duration,
    signal_interval: Duration,
    health_interval: Duration,
}

fn ticker(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

impl<S> ScanEngine<S>
where
    S: RegistrationLookup + TransitStore,
{
    /// Engine over `store`, publishing on `bus`.
    pub fn new(store: S, bus: EventBus, config: &Config) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let engine = Self {
            pipeline: ScanPipeline::new(store, bus.clone(), config),
            health: HealthMonitor::new(config.health.clone()),
            reachability: None,
            bus,
            commands: rx,
            sweep_interval: config.dedup.sweep_interval(),
            signal_interval: config.signal.broadcast_interval(),
            health_interval: config.health.broadcast_interval(),
        };
        (engine, EngineHandle { commands: tx })
    }

    /// Process events and commands until every [`EngineHandle`] is dropped.
    ///
    /// Ready connection events are drained before commands, so a command
    /// observes every event sent before it.
    pub async fn run(mut self, mut events: mpsc::Receiver<ConnectionEvent>) {
        let mut sweep = ticker(self.sweep_interval);
        let mut signal = ticker(self.signal_interval);
        let mut health = ticker(self.health_interval);
        let mut events_open = true;

        tracing::info!("Scan engine started");
        loop {
            tokio::select! {
                biased;

                _ = sweep.tick() => {
                    let removed = self.pipeline.sweep(Utc::now());
                    tracing::debug!(removed, "Dedup sweep");
                }
                _ = signal.tick() => self.broadcast_signal(),
                _ = health.tick() => self.broadcast_health(),
                event = events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        tracing::warn!("Connection event channel closed");
                        events_open = false;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }
        tracing::info!("Scan engine stopped");
    }

    /// Apply one connection event.
    pub async fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connecting => {}
            ConnectionEvent::Connected { latency } => {
                let alert = self.health.record_attempt(true, None, Some(latency));
                self.raise(alert);
            }
            ConnectionEvent::ConnectFailed { error, .. } | ConnectionEvent::Error(error) => {
                let alert = self.health.record_attempt(false, Some(error), None);
                self.raise(alert);
            }
            ConnectionEvent::Closed => {
                let error = GatelogError::ConnectionClosed.to_string();
                let alert = self.health.record_attempt(false, Some(error), None);
                self.raise(alert);
            }
            ConnectionEvent::Data(frame) => {
                let outcome = self.pipeline.process_frame(frame).await;
                if outcome != FrameOutcome::Duplicate {
                    tracing::debug!(outcome = ?outcome, "Frame processed");
                }
            }
            ConnectionEvent::Reachability(result) => {
                self.bus.publish(ScanEvent::ReachabilityUpdate(result.clone()));
                self.reachability = Some(result);
            }
        }
    }

    /// Answer one command.
    pub fn handle_command(&mut self, command: EngineCommand) {
        // A dropped reply receiver just means the caller gave up.
        match command {
            EngineCommand::SignalStats(reply) => {
                let _ = reply.send(self.pipeline.signal_stats().snapshot());
            }
            EngineCommand::SignalQuality(reply) => {
                let _ = reply.send(self.pipeline.signal_stats().quality_metrics());
            }
            EngineCommand::Health(reply) => {
                let _ = reply.send(self.health.snapshot());
            }
            EngineCommand::ResetHealth(reply) => {
                self.health.reset();
                tracing::info!("Connection statistics reset");
                let _ = reply.send(());
            }
            EngineCommand::ListUnknownTags(reply) => {
                let _ = reply.send(self.pipeline.archive().list());
            }
            EngineCommand::ClearUnknownTags(reply) => {
                let removed = self.pipeline.archive_mut().clear();
                tracing::info!(removed, "Unknown tag archive cleared");
                let _ = reply.send(removed);
            }
            EngineCommand::ExportUnknownTags(reply) => {
                let _ = reply.send(self.pipeline.archive().export_json());
            }
            EngineCommand::Reachability(reply) => {
                let _ = reply.send(self.reachability.clone());
            }
        }
    }

    fn raise(&self, alert: Option<Alert>) {
        let Some(alert) = alert else { return };
        match alert.level {
            AlertLevel::Critical => tracing::error!(
                consecutive_failures = alert.consecutive_failures,
                success_rate = alert.success_rate,
                "{}",
                alert.message
            ),
            AlertLevel::Warning => tracing::warn!(
                consecutive_failures = alert.consecutive_failures,
                success_rate = alert.success_rate,
                "{}",
                alert.message
            ),
        }
        self.bus.publish(ScanEvent::ConnectionAlert(alert));
    }

    fn broadcast_signal(&self) {
        if self.bus.subscriber_count() > 0 {
            self.bus.publish(ScanEvent::SignalUpdate(
                self.pipeline.signal_stats().snapshot(),
            ));
        }
    }

    fn broadcast_health(&self) {
        if self.bus.subscriber_count() > 0 {
            self.bus
                .publish(ScanEvent::ConnectionHealthUpdate(self.health.snapshot()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NewVehicle};
    use crate::types::RawFrame;

    const TAG: &str = "e20011223344556677889900";

    fn tag_frame() -> RawFrame {
        let mut bytes = vec![0xe2, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
        bytes.extend([0x77, 0x88, 0x99, 0x00, 0x11, 0x22, 0x33, 0x44]);
        RawFrame::now(bytes)
    }

    fn spawn_engine(
        store: MemoryStore,
        bus: EventBus,
    ) -> (mpsc::Sender<ConnectionEvent>, EngineHandle) {
        let (tx, rx) = mpsc::channel(CONNECTION_CHANNEL_CAPACITY);
        let (engine, handle) = ScanEngine::new(store, bus, &Config::default());
        tokio::spawn(engine.run(rx));
        (tx, handle)
    }

    fn failure() -> ConnectionEvent {
        ConnectionEvent::ConnectFailed {
            error: "connection refused".into(),
            timed_out: false,
        }
    }

    #[tokio::test]
    async fn test_five_failures_raise_one_critical_alert() {
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let (events, handle) = spawn_engine(MemoryStore::new(), bus);

        for _ in 0..6 {
            events.send(failure()).await.unwrap();
        }

        let health = handle.health().await.unwrap();
        assert_eq!(health.connection_attempts, 6);
        assert_eq!(health.alerts.len(), 1);
        assert_eq!(health.alerts[0].level, AlertLevel::Critical);

        let alerts: Vec<ScanEvent> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| matches!(e, ScanEvent::ConnectionAlert(_)))
            .collect();
        assert_eq!(alerts.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_health() {
        let (events, handle) = spawn_engine(MemoryStore::new(), EventBus::new(8));
        events.send(failure()).await.unwrap();
        events.send(ConnectionEvent::Closed).await.unwrap();
        assert_eq!(handle.health().await.unwrap().failed_connections, 2);

        handle.reset_health().await.unwrap();
        assert_eq!(handle.health().await.unwrap().connection_attempts, 0);
    }

    #[tokio::test]
    async fn test_frames_flow_through_pipeline() {
        let store = MemoryStore::new();
        store
            .register_vehicle(NewVehicle {
                epc: TAG.into(),
                plate_no: None,
                vehicle_name: None,
            })
            .await
            .unwrap();
        let (events, handle) = spawn_engine(store.clone(), EventBus::new(8));

        events.send(ConnectionEvent::Data(tag_frame())).await.unwrap();
        events
            .send(ConnectionEvent::Data(RawFrame::now(vec![0xde, 0xad, 0xbe, 0xef])))
            .await
            .unwrap();

        let signal = handle.signal_stats().await.unwrap();
        assert_eq!(signal.total_reads, 2);

        let unknown = handle.unknown_tags().await.unwrap();
        assert_eq!(unknown.len(), 1);
        assert!(unknown[0].is_invalid_pattern());

        let object = store.vehicles().await.remove(0);
        assert_eq!(store.records_for(object.id).await.len(), 1);

        let exported = handle.export_unknown_tags().await.unwrap();
        assert!(exported.contains("deadbeef"));
        assert_eq!(handle.clear_unknown_tags().await.unwrap(), 1);
        assert!(handle.unknown_tags().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reachability_is_kept_and_published() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let (events, handle) = spawn_engine(MemoryStore::new(), bus);
        assert!(handle.reachability().await.unwrap().is_none());

        let result = ReachabilityResult {
            address: "10.10.100.254:49152".into(),
            reachable: true,
            latency_ms: Some(3),
            error: None,
            checked_at: Utc::now(),
        };
        events
            .send(ConnectionEvent::Reachability(result.clone()))
            .await
            .unwrap();

        assert_eq!(handle.reachability().await.unwrap(), Some(result));
        assert_eq!(rx.try_recv().unwrap().kind(), "reachability_update");
    }

    #[tokio::test]
    async fn test_engine_survives_closed_event_channel() {
        let (events, handle) = spawn_engine(MemoryStore::new(), EventBus::new(8));
        drop(events);
        assert!(handle.health().await.is_ok());
    }

    #[tokio::test]
    async fn test_handle_reports_stopped_engine() {
        let (engine, handle) =
            ScanEngine::new(MemoryStore::new(), EventBus::new(8), &Config::default());
        drop(engine);
        assert!(matches!(
            handle.health().await,
            Err(GatelogError::EngineUnavailable)
        ));
    }
}
