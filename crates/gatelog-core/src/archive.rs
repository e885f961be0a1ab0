//! Bounded archive of frames that did not resolve to a registered vehicle.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::signal::SignalCategory;
use crate::types::RawFrame;

/// Placeholder prefix for frames no matcher could decode.
pub const INVALID_PATTERN: &str = "INVALID_PATTERN";

/// One archived unknown tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UnknownTagRecord {
    /// Unique, time-ordered record key.
    pub key: String,
    /// The decoded identifier, or `INVALID_PATTERN-<suffix>` for
    /// undecodable frames.
    #[schema(example = "e20011223344556677889900")]
    pub epc_or_placeholder: String,
    /// Hex of the full frame.
    pub raw_hex: String,
    /// Frame length in bytes.
    pub data_length: usize,
    /// Signal strength bucket of the frame.
    pub signal_category: SignalCategory,
    /// When the frame arrived.
    pub timestamp: DateTime<Utc>,
}

impl UnknownTagRecord {
    /// Record for a tag that decoded but is not registered.
    #[must_use]
    pub fn unregistered(identifier: &str, frame: &RawFrame, category: SignalCategory) -> Self {
        Self::build(identifier.to_string(), frame, category)
    }

    /// Record for a frame that did not decode. The placeholder gets a unique
    /// suffix so distinct frames never share one.
    #[must_use]
    pub fn undecodable(frame: &RawFrame, category: SignalCategory) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self::build(format!("{INVALID_PATTERN}-{}", &suffix[..12]), frame, category)
    }

    fn build(epc_or_placeholder: String, frame: &RawFrame, category: SignalCategory) -> Self {
        Self {
            key: Uuid::now_v7().to_string(),
            epc_or_placeholder,
            raw_hex: frame.hex(),
            data_length: frame.len(),
            signal_category: category,
            timestamp: frame.received_at(),
        }
    }

    /// Whether this record is for an undecodable frame.
    #[must_use]
    pub fn is_invalid_pattern(&self) -> bool {
        self.epc_or_placeholder.starts_with(INVALID_PATTERN)
    }
}

/// FIFO archive that evicts its oldest record when full.
#[derive(Debug, Clone)]
pub struct UnknownTagArchive {
    records: VecDeque<UnknownTagRecord>,
    capacity: usize,
}

impl UnknownTagArchive {
    /// Empty archive holding at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record, evicting the oldest one first if at capacity.
    /// Returns the evicted record, if any.
    pub fn record(&mut self, entry: UnknownTagRecord) -> Option<UnknownTagRecord> {
        let evicted = if self.records.len() >= self.capacity {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(entry);
        evicted
    }

    /// Records, newest first.
    #[must_use]
    pub fn list(&self) -> Vec<UnknownTagRecord> {
        self.records.iter().rev().cloned().collect()
    }

    /// Remove everything. Returns how many records were dropped.
    pub fn clear(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        removed
    }

    /// Pretty JSON array of the records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.records)
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the archive is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum number of records held.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tag: &str) -> UnknownTagRecord {
        let frame = RawFrame::now(vec![0xe2, 0x80, 0x11]);
        UnknownTagRecord::unregistered(tag, &frame, SignalCategory::VeryWeak)
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut archive = UnknownTagArchive::new(3);
        for i in 0..10 {
            archive.record(record(&format!("tag{i}")));
            assert!(archive.len() <= 3);
        }
    }

    #[test]
    fn test_evicts_single_oldest() {
        let mut archive = UnknownTagArchive::new(2);
        assert!(archive.record(record("a")).is_none());
        assert!(archive.record(record("b")).is_none());

        let evicted = archive.record(record("c")).unwrap();
        assert_eq!(evicted.epc_or_placeholder, "a");

        let tags: Vec<String> = archive
            .list()
            .into_iter()
            .map(|r| r.epc_or_placeholder)
            .collect();
        assert_eq!(tags, vec!["c", "b"]);
    }

    #[test]
    fn test_invalid_pattern_placeholders_are_unique() {
        let frame = RawFrame::now(vec![0xde, 0xad, 0xbe, 0xef]);
        let a = UnknownTagRecord::undecodable(&frame, SignalCategory::VeryWeak);
        let b = UnknownTagRecord::undecodable(&frame, SignalCategory::VeryWeak);

        assert!(a.is_invalid_pattern());
        assert_ne!(a.epc_or_placeholder, b.epc_or_placeholder);
        assert_ne!(a.key, b.key);
        assert_eq!(a.raw_hex, "deadbeef");
        assert_eq!(a.data_length, 4);
    }

    #[test]
    fn test_clear_and_export() {
        let mut archive = UnknownTagArchive::new(5);
        archive.record(record("a"));
        archive.record(record("b"));

        let json = archive.export_json().unwrap();
        let parsed: Vec<UnknownTagRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].epc_or_placeholder, "a");

        assert_eq!(archive.clear(), 2);
        assert!(archive.is_empty());
    }
}
