//! Checksum bookkeeping for desync detection
//!
//! The first checksum reported for a frame becomes the canonical value. Every
//! later report for that frame is compared against it. Mismatches are only
//! reported: nothing is rolled back and nobody is disconnected.

use std::collections::BTreeMap;

/// Result of observing one reported checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumOutcome {
    /// First report for this frame; its value is now canonical
    Recorded,
    /// Matches the canonical value
    Valid,
    /// Differs from the canonical value
    Desync,
}

/// Per-match map from frame number to the first reported checksum
#[derive(Debug, Default)]
pub struct ChecksumTracker {
    records: BTreeMap<u64, i64>,
    /// Frames further than this behind the newest recorded frame are dropped
    retention: Option<u64>,
    newest_frame: Option<u64>,
}

impl ChecksumTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Option<u64>) -> Self {
        Self {
            retention,
            ..Self::default()
        }
    }

    pub fn observe(&mut self, frame_number: u64, value: i64) -> ChecksumOutcome {
        if let Some(&canonical) = self.records.get(&frame_number) {
            return if canonical == value {
                ChecksumOutcome::Valid
            } else {
                ChecksumOutcome::Desync
            };
        }

        self.records.insert(frame_number, value);
        if self.newest_frame.map_or(true, |newest| frame_number > newest) {
            self.newest_frame = Some(frame_number);
            self.evict();
        }
        ChecksumOutcome::Recorded
    }

    /// Canonical value recorded for a frame, if any
    pub fn canonical(&self, frame_number: u64) -> Option<i64> {
        self.records.get(&frame_number).copied()
    }

    /// Forgets every record; called when a new match starts
    pub fn clear(&mut self) {
        self.records.clear();
        self.newest_frame = None;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn evict(&mut self) {
        let (Some(window), Some(newest)) = (self.retention, self.newest_frame) else {
            return;
        };
        let oldest_kept = newest.saturating_sub(window);
        // split_off keeps keys >= oldest_kept
        self.records = self.records.split_off(&oldest_kept);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_report_is_recorded() {
        let mut tracker = ChecksumTracker::new();
        assert_eq!(tracker.observe(5, 42), ChecksumOutcome::Recorded);
        assert_eq!(tracker.canonical(5), Some(42));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_matching_report_is_valid() {
        let mut tracker = ChecksumTracker::new();
        tracker.observe(5, 42);
        assert_eq!(tracker.observe(5, 42), ChecksumOutcome::Valid);
        assert_eq!(tracker.observe(5, 42), ChecksumOutcome::Valid);
    }

    #[test]
    fn test_mismatch_is_desync_and_keeps_canonical() {
        let mut tracker = ChecksumTracker::new();
        tracker.observe(5, 42);
        assert_eq!(tracker.observe(5, 7), ChecksumOutcome::Desync);
        // The canonical value is never overwritten
        assert_eq!(tracker.canonical(5), Some(42));
        assert_eq!(tracker.observe(5, 42), ChecksumOutcome::Valid);
    }

    #[test]
    fn test_frames_are_independent() {
        let mut tracker = ChecksumTracker::new();
        assert_eq!(tracker.observe(1, 10), ChecksumOutcome::Recorded);
        assert_eq!(tracker.observe(2, 20), ChecksumOutcome::Recorded);
        assert_eq!(tracker.observe(1, 20), ChecksumOutcome::Desync);
        assert_eq!(tracker.observe(2, 20), ChecksumOutcome::Valid);
    }

    #[test]
    fn test_out_of_order_frames() {
        let mut tracker = ChecksumTracker::new();
        assert_eq!(tracker.observe(10, 1), ChecksumOutcome::Recorded);
        assert_eq!(tracker.observe(3, 1), ChecksumOutcome::Recorded);
        assert_eq!(tracker.observe(3, 2), ChecksumOutcome::Desync);
    }

    #[test]
    fn test_clear_starts_fresh() {
        let mut tracker = ChecksumTracker::new();
        tracker.observe(5, 42);
        tracker.clear();
        assert!(tracker.is_empty());
        assert_eq!(tracker.observe(5, 7), ChecksumOutcome::Recorded);
    }

    #[test]
    fn test_retention_evicts_old_frames() {
        let mut tracker = ChecksumTracker::with_retention(Some(10));
        for frame in 0..=30 {
            tracker.observe(frame, frame as i64);
        }
        assert_eq!(tracker.len(), 11);
        assert_eq!(tracker.canonical(19), None);
        assert_eq!(tracker.canonical(20), Some(20));
        assert_eq!(tracker.observe(25, 25), ChecksumOutcome::Valid);
    }

    #[test]
    fn test_unbounded_without_retention() {
        let mut tracker = ChecksumTracker::new();
        for frame in 0..1000 {
            tracker.observe(frame, 0);
        }
        assert_eq!(tracker.len(), 1000);
    }
}
