//! Duplicate scan suppression.
//!
//! A tag parked in the reader's field is reported many times per second. The
//! deduplicator accepts the first detection and suppresses repeats of the same
//! identifier until the window has passed since the last *accepted* one.
//! Acceptance refreshes the timestamp whether or not the scan later resolves,
//! so a failing store cannot cause a burst of retries.
//!
//! Frames carry wall-clock timestamps. When the clock steps backwards the
//! elapsed time is negative; that detection is accepted and becomes the new
//! reference, so an NTP correction cannot hide a tag for the size of the step.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Identifier → last accepted detection.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    window: Duration,
    last_seen: HashMap<String, DateTime<Utc>>,
}

impl Deduplicator {
    /// Suppress repeats within `window`. A zero window accepts everything.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: HashMap::new(),
        }
    }

    /// Configured window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Decide whether a detection at `now` should be processed, recording it
    /// if so.
    pub fn should_process(&mut self, identifier: &str, now: DateTime<Utc>) -> bool {
        if let Some(last) = self.last_seen.get(identifier) {
            if self.within_window(*last, now) {
                return false;
            }
        }
        self.last_seen.insert(identifier.to_string(), now);
        true
    }

    /// Drop entries whose window has passed. Returns how many were removed.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.last_seen.len();
        let window = self.window;
        self.last_seen
            .retain(|_, last| Self::elapsed(*last, now).map_or(true, |e| e < window));
        before - self.last_seen.len()
    }

    /// Number of identifiers currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    /// Whether no identifiers are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    fn within_window(&self, last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        Self::elapsed(last, now).is_some_and(|e| e < self.window)
    }

    fn elapsed(last: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
        (now - last).to_std().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    const TAG: &str = "e20011223344556677889900";

    #[test]
    fn test_repeat_within_window_is_suppressed() {
        let mut dedup = Deduplicator::new(Duration::from_secs(30));
        let t0 = Utc::now();
        assert!(dedup.should_process(TAG, t0));
        assert!(!dedup.should_process(TAG, t0 + TimeDelta::seconds(10)));
    }

    #[test]
    fn test_zero_window_accepts_everything() {
        let mut dedup = Deduplicator::new(Duration::ZERO);
        let t0 = Utc::now();
        assert!(dedup.should_process(TAG, t0));
        assert!(dedup.should_process(TAG, t0 + TimeDelta::seconds(10)));
        assert!(dedup.should_process(TAG, t0 + TimeDelta::seconds(10)));
    }

    #[test]
    fn test_exactly_window_apart_is_accepted() {
        let mut dedup = Deduplicator::new(Duration::from_secs(30));
        let t0 = Utc::now();
        assert!(dedup.should_process(TAG, t0));
        assert!(dedup.should_process(TAG, t0 + TimeDelta::seconds(30)));
    }

    #[test]
    fn test_suppressed_detection_does_not_extend_window() {
        let mut dedup = Deduplicator::new(Duration::from_secs(30));
        let t0 = Utc::now();
        assert!(dedup.should_process(TAG, t0));
        assert!(!dedup.should_process(TAG, t0 + TimeDelta::seconds(20)));
        assert!(dedup.should_process(TAG, t0 + TimeDelta::seconds(31)));
    }

    #[test]
    fn test_identifiers_are_independent() {
        let mut dedup = Deduplicator::new(Duration::from_secs(30));
        let t0 = Utc::now();
        assert!(dedup.should_process(TAG, t0));
        assert!(dedup.should_process("e2ffffffffffffffffffffff", t0));
    }

    #[test]
    fn test_backwards_clock_step_is_accepted() {
        let mut dedup = Deduplicator::new(Duration::from_secs(30));
        let t0 = Utc::now();
        assert!(dedup.should_process(TAG, t0));

        let stepped = t0 - TimeDelta::hours(1) + TimeDelta::minutes(10);
        assert!(dedup.should_process(TAG, stepped));
        // The stepped time is the new reference.
        assert!(!dedup.should_process(TAG, stepped + TimeDelta::seconds(10)));
        assert!(dedup.should_process(TAG, stepped + TimeDelta::seconds(30)));
    }

    #[test]
    fn test_zero_window_accepts_backwards_timestamps() {
        let mut dedup = Deduplicator::new(Duration::ZERO);
        let t0 = Utc::now();
        assert!(dedup.should_process(TAG, t0));
        assert!(dedup.should_process(TAG, t0 - TimeDelta::milliseconds(1)));
    }

    #[test]
    fn test_sweep_removes_only_stale_entries() {
        let mut dedup = Deduplicator::new(Duration::from_secs(30));
        let t0 = Utc::now();
        dedup.should_process("old", t0);
        dedup.should_process("fresh", t0 + TimeDelta::seconds(50));

        assert_eq!(dedup.sweep(t0 + TimeDelta::seconds(60)), 1);
        assert_eq!(dedup.len(), 1);
        assert!(!dedup.should_process("fresh", t0 + TimeDelta::seconds(60)));
    }
}
