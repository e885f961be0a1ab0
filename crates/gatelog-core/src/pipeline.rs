//! Per-frame processing: decode, score, deduplicate, resolve, archive.
//!
//! [`ScanPipeline`] is plain owned state driven by the engine task. Every
//! stage reports on the [`EventBus`]; nothing a single frame does can fail
//! the pipeline itself, so [`ScanPipeline::process_frame`] returns an outcome
//! rather than a `Result`.

use chrono::{DateTime, Utc};

use crate::archive::{UnknownTagArchive, UnknownTagRecord};
use crate::config::Config;
use crate::decoder::FrameDecoder;
use crate::dedup::Deduplicator;
use crate::events::{EventBus, ScanEvent};
use crate::resolver::TransitResolver;
use crate::signal::{analyze, SignalCategory, SignalStats};
use crate::store::{RegistrationLookup, TransitStore};
use crate::types::{DecodedTag, RawFrame, ScanStatus, TrackedObject, TransitDirection};

/// What happened to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Zero-length read.
    Empty,
    /// Undecodable and trivial (all zero or too short); dropped.
    Ignored,
    /// Undecodable but archived under a placeholder.
    Undecodable,
    /// Seen within the dedup window.
    Duplicate,
    /// Decoded but not registered; archived.
    Unregistered,
    /// A transit was committed.
    Resolved(TransitDirection),
    /// A store call failed; reported as [`ScanStatus::Error`].
    Failed,
}

/// Owned state of the frame-processing stages.
#[derive(Debug)]
pub struct ScanPipeline<S> {
    decoder: FrameDecoder,
    stats: SignalStats,
    dedup: Deduplicator,
    archive: UnknownTagArchive,
    min_frame_len: usize,
    resolver: TransitResolver<S>,
    bus: EventBus,
}

impl<S> ScanPipeline<S>
where
    S: RegistrationLookup + TransitStore,
{
    /// Pipeline over `store`, sized from `config`.
    pub fn new(store: S, bus: EventBus, config: &Config) -> Self {
        Self {
            decoder: FrameDecoder::default(),
            stats: SignalStats::new(config.signal.history_size),
            dedup: Deduplicator::new(config.dedup.window()),
            archive: UnknownTagArchive::new(config.archive.capacity),
            min_frame_len: config.archive.min_frame_len,
            resolver: TransitResolver::new(store),
            bus,
        }
    }

    /// Run one frame through every stage.
    pub async fn process_frame(&mut self, frame: RawFrame) -> FrameOutcome {
        if frame.is_empty() {
            return FrameOutcome::Empty;
        }

        let DecodedTag { identifier, raw: frame } = self.decoder.decode_frame(frame);
        let quality = analyze(frame.bytes(), identifier.is_some());
        self.stats.record(&quality, frame.received_at());

        let Some(epc) = identifier else {
            return self.archive_undecodable(&frame, quality.category);
        };

        tracing::debug!(
            epc = %epc,
            len = frame.len(),
            category = ?quality.category,
            "Tag detected"
        );
        self.bus.publish(ScanEvent::TagDetected {
            epc: epc.clone(),
            raw_hex: frame.hex(),
            signal: quality,
            timestamp: frame.received_at(),
        });

        if !self.dedup.should_process(&epc, frame.received_at()) {
            tracing::trace!(epc = %epc, "Duplicate scan suppressed");
            return FrameOutcome::Duplicate;
        }

        match self.resolver.store().is_registered(&epc).await {
            Ok(true) => {}
            Ok(false) => {
                let record = UnknownTagRecord::unregistered(&epc, &frame, quality.category);
                self.archive_record(record);
                self.publish_result(&epc, ScanStatus::Unregistered, None, None, &frame);
                return FrameOutcome::Unregistered;
            }
            Err(e) => {
                tracing::error!(epc = %epc, error = %e, "Registration lookup failed");
                let message = e.to_string();
                self.publish_result(&epc, ScanStatus::Error, None, Some(message), &frame);
                return FrameOutcome::Failed;
            }
        }

        match self.resolver.resolve(&epc, frame.received_at()).await {
            Ok(transit) => {
                self.publish_result(
                    &epc,
                    transit.direction.into(),
                    Some(transit.object),
                    None,
                    &frame,
                );
                FrameOutcome::Resolved(transit.direction)
            }
            Err(e) => {
                tracing::error!(epc = %epc, error = %e, "Transit resolution failed");
                let message = e.to_string();
                self.publish_result(&epc, ScanStatus::Error, None, Some(message), &frame);
                FrameOutcome::Failed
            }
        }
    }

    fn archive_undecodable(&mut self, frame: &RawFrame, category: SignalCategory) -> FrameOutcome {
        if frame.is_all_zero() || frame.len() < self.min_frame_len {
            tracing::trace!(len = frame.len(), "Trivial frame ignored");
            return FrameOutcome::Ignored;
        }
        tracing::debug!(len = frame.len(), hex = %frame.hex(), "Undecodable frame archived");
        self.archive_record(UnknownTagRecord::undecodable(frame, category));
        FrameOutcome::Undecodable
    }

    fn archive_record(&mut self, record: UnknownTagRecord) {
        if let Some(evicted) = self.archive.record(record.clone()) {
            tracing::trace!(key = %evicted.key, "Unknown tag archive full, evicted oldest");
        }
        self.bus.publish(ScanEvent::UnknownTagDetected(record));
    }

    fn publish_result(
        &self,
        epc: &str,
        status: ScanStatus,
        object: Option<TrackedObject>,
        error: Option<String>,
        frame: &RawFrame,
    ) {
        self.bus.publish(ScanEvent::ScanResult {
            epc: epc.to_string(),
            status,
            object,
            error,
            timestamp: frame.received_at(),
        });
    }

    /// Drop dedup entries older than the window.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        self.dedup.sweep(now)
    }

    /// Running signal statistics.
    pub const fn signal_stats(&self) -> &SignalStats {
        &self.stats
    }

    /// The unknown tag archive.
    pub const fn archive(&self) -> &UnknownTagArchive {
        &self.archive
    }

    /// Mutable access to the archive, for clearing.
    pub fn archive_mut(&mut self) -> &mut UnknownTagArchive {
        &mut self.archive
    }

    /// The event bus this pipeline publishes on.
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }
}
