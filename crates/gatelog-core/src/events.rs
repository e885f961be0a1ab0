//! Observability events and the broadcast bus they travel on.
//!
//! Publishing never blocks and never fails: with no subscribers the event is
//! dropped, and a slow subscriber lags (and is told so by `RecvError::Lagged`)
//! instead of holding up the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use utoipa::ToSchema;

use crate::archive::UnknownTagRecord;
use crate::health::{Alert, HealthSnapshot};
use crate::signal::{SignalQuality, SignalSnapshot};
use crate::types::{ReachabilityResult, ScanStatus, TrackedObject};

/// Default channel capacity.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Everything the engine reports to the outside world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    /// An identifier was decoded, before deduplication.
    TagDetected {
        /// Decoded identifier.
        epc: String,
        /// Hex of the full frame.
        raw_hex: String,
        /// Quality of the frame.
        signal: SignalQuality,
        /// Frame arrival time.
        timestamp: DateTime<Utc>,
    },
    /// A deduplicated scan finished resolving.
    ScanResult {
        /// Decoded identifier.
        epc: String,
        /// Outcome.
        status: ScanStatus,
        /// The vehicle, when known.
        object: Option<TrackedObject>,
        /// Failure description for [`ScanStatus::Error`].
        error: Option<String>,
        /// Frame arrival time.
        timestamp: DateTime<Utc>,
    },
    /// A record was added to the unknown tag archive.
    UnknownTagDetected(UnknownTagRecord),
    /// Periodic signal statistics.
    SignalUpdate(SignalSnapshot),
    /// Periodic connection health.
    ConnectionHealthUpdate(HealthSnapshot),
    /// A connection alert was raised.
    ConnectionAlert(Alert),
    /// A reachability probe finished.
    ReachabilityUpdate(ReachabilityResult),
}

impl ScanEvent {
    /// Short name used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TagDetected { .. } => "tag_detected",
            Self::ScanResult { .. } => "scan_result",
            Self::UnknownTagDetected(_) => "unknown_tag_detected",
            Self::SignalUpdate(_) => "signal_update",
            Self::ConnectionHealthUpdate(_) => "connection_health_update",
            Self::ConnectionAlert(_) => "connection_alert",
            Self::ReachabilityUpdate(_) => "reachability_update",
        }
    }
}

/// Cloneable handle to the broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ScanEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl EventBus {
    /// Bus retaining up to `capacity` undelivered events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Returns how many subscribers will see it.
    pub fn publish(&self, event: ScanEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// New subscriber receiving events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }

    /// Current subscriber count.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::AlertLevel;

    fn alert() -> ScanEvent {
        ScanEvent::ConnectionAlert(Alert {
            timestamp: Utc::now(),
            message: "5 consecutive connection failures to the RFID reader".into(),
            level: AlertLevel::Critical,
            success_rate: 0.0,
            consecutive_failures: 5,
        })
    }

    #[test]
    fn test_publish_without_subscribers_is_dropped() {
        let bus = EventBus::new(4);
        assert_eq!(bus.publish(alert()), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(4);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.publish(alert()), 2);

        assert_eq!(a.recv().await.unwrap().kind(), "connection_alert");
        assert_eq!(b.recv().await.unwrap().kind(), "connection_alert");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = ScanEvent::ScanResult {
            epc: "e20011223344556677889900".into(),
            status: ScanStatus::Entering,
            object: None,
            error: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "scan_result");
        assert_eq!(json["status"], "ENTERING");
    }
}
