//! Shared types and OpenAPI schemas.
//!
//! Types that cross module boundaries live here. Types owned by a single
//! component (signal samples, health snapshots, archive records) are defined
//! next to that component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One socket read from the reader, exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    bytes: Vec<u8>,
    received_at: DateTime<Utc>,
}

impl RawFrame {
    /// Wrap bytes received at `received_at`.
    #[must_use]
    pub const fn new(bytes: Vec<u8>, received_at: DateTime<Utc>) -> Self {
        Self { bytes, received_at }
    }

    /// Wrap bytes received now.
    #[must_use]
    pub fn now(bytes: Vec<u8>) -> Self {
        Self::new(bytes, Utc::now())
    }

    /// The raw bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Arrival timestamp.
    #[must_use]
    pub const fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Number of bytes in the frame.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the read returned no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether every byte is zero. Empty frames count as all-zero.
    #[must_use]
    pub fn is_all_zero(&self) -> bool {
        self.bytes.iter().all(|b| *b == 0)
    }

    /// Lowercase hex rendering of the frame.
    #[must_use]
    pub fn hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

/// Render bytes as lowercase hex.
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// A frame together with the identifier decoded from it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTag {
    /// Canonical 24-character lowercase hex identifier.
    pub identifier: Option<String>,
    /// The frame it came from.
    pub raw: RawFrame,
}

/// A registered vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TrackedObject {
    /// Store-assigned identifier.
    pub id: Uuid,
    /// Tag identifier the vehicle carries.
    #[schema(example = "e20011223344556677889900")]
    pub epc: String,
    /// License plate number.
    #[schema(example = "ABC 1234")]
    pub plate_no: Option<String>,
    /// Free-form vehicle description.
    #[schema(example = "Service van")]
    pub vehicle_name: Option<String>,
}

/// A time-in / time-out pair for one visit of a vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TransitRecord {
    /// Store-assigned identifier.
    pub id: Uuid,
    /// Vehicle the record belongs to.
    pub vehicle_id: Uuid,
    /// When the vehicle entered.
    pub time_in: DateTime<Utc>,
    /// When the vehicle left; `None` while it is inside.
    pub time_out: Option<DateTime<Utc>>,
}

impl TransitRecord {
    /// Whether the vehicle is still inside.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.time_out.is_none()
    }
}

/// Direction of a resolved transit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitDirection {
    /// A new record was opened.
    Entering,
    /// The open record was closed.
    Exiting,
}

/// Outcome of one scan, as reported to the event sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    /// The vehicle entered.
    Entering,
    /// The vehicle left.
    Exiting,
    /// The tag is not registered to any vehicle.
    Unregistered,
    /// A lookup or store call failed.
    Error,
}

impl From<TransitDirection> for ScanStatus {
    fn from(direction: TransitDirection) -> Self {
        match direction {
            TransitDirection::Entering => Self::Entering,
            TransitDirection::Exiting => Self::Exiting,
        }
    }
}

/// Lifecycle state of the reader connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Idle, waiting for the next attempt.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Frames are flowing.
    Connected,
    /// The reader closed the stream.
    Closing,
    /// The attempt or the established connection failed.
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a TCP reachability probe against the reader address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReachabilityResult {
    /// Address that was probed.
    #[schema(example = "10.10.100.254:49152")]
    pub address: String,
    /// Whether a TCP connection could be opened.
    pub reachable: bool,
    /// Time to connect, when reachable.
    pub latency_ms: Option<u64>,
    /// Failure reason, when unreachable.
    pub error: Option<String>,
    /// When the probe finished.
    pub checked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_hex_is_lowercase() {
        let frame = RawFrame::now(vec![0xE2, 0x00, 0xAB, 0x0F]);
        assert_eq!(frame.hex(), "e200ab0f");
        assert_eq!(frame.len(), 4);
    }

    #[test]
    fn test_all_zero_detection() {
        assert!(RawFrame::now(vec![0; 12]).is_all_zero());
        assert!(!RawFrame::now(vec![0, 0, 1]).is_all_zero());
    }

    #[test]
    fn test_scan_status_serialization() {
        let json = serde_json::to_string(&ScanStatus::Unregistered).unwrap();
        assert_eq!(json, "\"UNREGISTERED\"");
        assert_eq!(
            ScanStatus::from(TransitDirection::Exiting),
            ScanStatus::Exiting
        );
    }

    #[test]
    fn test_transit_record_open() {
        let record = TransitRecord {
            id: Uuid::now_v7(),
            vehicle_id: Uuid::now_v7(),
            time_in: Utc::now(),
            time_out: None,
        };
        assert!(record.is_open());
    }
}
