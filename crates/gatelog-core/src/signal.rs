//! Signal quality scoring and running statistics.
//!
//! The reader reports no RSSI, so frame length stands in for signal strength:
//! a clean read of a 96-bit EPC plus framing is 24 bytes or more, while reads
//! through glass or at the edge of the field arrive truncated. The
//! interference flags are advisory and never block processing.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::decoder::IDENTIFIER_HEX_LEN;

/// Frames at or above this many bytes are [`SignalCategory::Strong`].
pub const STRONG_MIN_LEN: usize = 24;
/// Frames at or above this many bytes are [`SignalCategory::Medium`].
pub const MEDIUM_MIN_LEN: usize = 18;
/// Frames at or above this many bytes are [`SignalCategory::Weak`].
pub const WEAK_MIN_LEN: usize = 12;
/// Non-empty frames below this many bytes look like reflections.
pub const REFLECTION_MAX_LEN: usize = 8;

/// Coarse signal strength bucket derived from frame length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalCategory {
    /// 24 bytes or more.
    Strong,
    /// 18 to 23 bytes.
    Medium,
    /// 12 to 17 bytes.
    Weak,
    /// Fewer than 12 bytes.
    VeryWeak,
}

impl SignalCategory {
    /// Bucket a frame length.
    #[must_use]
    pub const fn from_length(len: usize) -> Self {
        if len >= STRONG_MIN_LEN {
            Self::Strong
        } else if len >= MEDIUM_MIN_LEN {
            Self::Medium
        } else if len >= WEAK_MIN_LEN {
            Self::Weak
        } else {
            Self::VeryWeak
        }
    }
}

/// Glass interference heuristic flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct InterferenceFlags {
    /// Frame shorter than 12 bytes.
    pub very_weak_signal: bool,
    /// Hex rendering shorter than one identifier.
    pub incomplete_data: bool,
    /// No tag pattern matched.
    pub no_valid_pattern: bool,
    /// Non-empty frame shorter than 8 bytes.
    pub possible_reflection: bool,
}

impl InterferenceFlags {
    /// Whether any flag that suggests physical obstruction is set.
    #[must_use]
    pub const fn any(&self) -> bool {
        self.very_weak_signal || self.incomplete_data || self.possible_reflection
    }
}

/// Quality assessment of a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SignalQuality {
    /// Strength bucket.
    pub category: SignalCategory,
    /// Frame length in bytes.
    pub data_length: usize,
    /// Advisory interference flags.
    pub interference: InterferenceFlags,
}

/// Score a frame. `pattern_matched` is whether the decoder found a tag.
#[must_use]
pub const fn analyze(raw: &[u8], pattern_matched: bool) -> SignalQuality {
    let len = raw.len();
    SignalQuality {
        category: SignalCategory::from_length(len),
        data_length: len,
        interference: InterferenceFlags {
            very_weak_signal: len < WEAK_MIN_LEN,
            incomplete_data: len * 2 < IDENTIFIER_HEX_LEN,
            no_valid_pattern: !pattern_matched,
            possible_reflection: len > 0 && len < REFLECTION_MAX_LEN,
        },
    }
}

/// One entry of the recent-signal history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SignalSample {
    /// When the frame arrived.
    pub timestamp: DateTime<Utc>,
    /// Strength bucket.
    pub category: SignalCategory,
    /// Frame length in bytes.
    pub data_length: usize,
    /// Advisory interference flags.
    pub interference: InterferenceFlags,
}

/// Read counts per signal category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CategoryCounts {
    /// Strong reads.
    pub strong: u64,
    /// Medium reads.
    pub medium: u64,
    /// Weak reads.
    pub weak: u64,
    /// Very weak reads.
    pub very_weak: u64,
}

impl CategoryCounts {
    fn increment(&mut self, category: SignalCategory) {
        let slot = match category {
            SignalCategory::Strong => &mut self.strong,
            SignalCategory::Medium => &mut self.medium,
            SignalCategory::Weak => &mut self.weak,
            SignalCategory::VeryWeak => &mut self.very_weak,
        };
        *slot += 1;
    }
}

/// Point-in-time copy of [`SignalStats`], published on the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SignalSnapshot {
    /// Frames scored since start (or since the last reset).
    pub total_reads: u64,
    /// Reads per category.
    pub category_counts: CategoryCounts,
    /// Mean frame length in bytes.
    pub average_data_length: f64,
    /// Most recent samples, oldest first.
    pub recent_signals: Vec<SignalSample>,
}

/// Derived percentages for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SignalQualityMetrics {
    /// Share of strong reads, 0-100.
    pub strong_signal_percentage: f64,
    /// Share of weak and very weak reads, 0-100.
    pub weak_signal_percentage: f64,
    /// Mean frame length in bytes.
    pub average_data_length: f64,
    /// Frames scored.
    pub total_reads: u64,
    /// Samples in the history window with any interference flag set.
    pub interference_count: usize,
    /// Size of the history window the interference count covers.
    pub window_size: usize,
}

/// Running signal statistics with a bounded history.
#[derive(Debug, Clone)]
pub struct SignalStats {
    total_reads: u64,
    counts: CategoryCounts,
    average_length: f64,
    history: VecDeque<SignalSample>,
    history_size: usize,
}

impl SignalStats {
    /// Empty statistics keeping at most `history_size` samples.
    #[must_use]
    pub fn new(history_size: usize) -> Self {
        Self {
            total_reads: 0,
            counts: CategoryCounts::default(),
            average_length: 0.0,
            history: VecDeque::with_capacity(history_size),
            history_size,
        }
    }

    /// Fold one scored frame into the aggregate.
    #[allow(clippy::cast_precision_loss)]
    pub fn record(&mut self, quality: &SignalQuality, timestamp: DateTime<Utc>) {
        self.total_reads += 1;
        self.counts.increment(quality.category);
        let n = self.total_reads as f64;
        self.average_length += (quality.data_length as f64 - self.average_length) / n;

        if self.history.len() >= self.history_size {
            self.history.pop_front();
        }
        self.history.push_back(SignalSample {
            timestamp,
            category: quality.category,
            data_length: quality.data_length,
            interference: quality.interference,
        });
    }

    /// Frames recorded.
    #[must_use]
    pub const fn total_reads(&self) -> u64 {
        self.total_reads
    }

    /// Mean frame length.
    #[must_use]
    pub const fn average_length(&self) -> f64 {
        self.average_length
    }

    /// Copy the current state.
    #[must_use]
    pub fn snapshot(&self) -> SignalSnapshot {
        SignalSnapshot {
            total_reads: self.total_reads,
            category_counts: self.counts,
            average_data_length: self.average_length,
            recent_signals: self.history.iter().cloned().collect(),
        }
    }

    /// Percentages and interference count over the history window.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn quality_metrics(&self) -> SignalQualityMetrics {
        let percent = |count: u64| {
            if self.total_reads == 0 {
                0.0
            } else {
                count as f64 * 100.0 / self.total_reads as f64
            }
        };
        SignalQualityMetrics {
            strong_signal_percentage: percent(self.counts.strong),
            weak_signal_percentage: percent(self.counts.weak + self.counts.very_weak),
            average_data_length: self.average_length,
            total_reads: self.total_reads,
            interference_count: self
                .history
                .iter()
                .filter(|s| s.interference.any())
                .count(),
            window_size: self.history.len(),
        }
    }
}
