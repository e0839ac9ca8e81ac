//! Publish rate limiting
//!
//! Frames can complete every couple of seconds at the meter's pace; the gate
//! lets one snapshot through per configured interval and leaves the rest
//! accumulating, later frames overwriting earlier values per key.

use crate::frame::{FrameAccumulator, Snapshot};
use std::time::{Duration, Instant};

/// Rate limiter owning the publish clock and the swap-and-clear semantics
/// of the snapshot buffer.
#[derive(Debug)]
pub struct PublishGate {
    interval: Duration,
    last_publish: Option<Instant>,
}

impl PublishGate {
    /// A fresh gate has never published: the first completed frame flushes
    /// immediately.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_publish: None,
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        match self.last_publish {
            None => true,
            Some(last) => now.duration_since(last) > self.interval,
        }
    }

    /// Called at each frame end. Returns the snapshot to publish when the
    /// interval has elapsed, taking it out of the accumulator and resetting
    /// the clock to `now`; returns `None` otherwise.
    pub fn try_flush(&mut self, accumulator: &mut FrameAccumulator, now: Instant) -> Option<Snapshot> {
        if !self.is_due(now) {
            return None;
        }
        self.last_publish = Some(now);
        Some(accumulator.take())
    }

    pub fn last_publish(&self) -> Option<Instant> {
        self.last_publish
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FieldValue;

    const INTERVAL: Duration = Duration::from_secs(30);

    #[test]
    fn first_frame_flushes_immediately() {
        let mut gate = PublishGate::new(INTERVAL);
        let mut acc = FrameAccumulator::new();
        acc.apply_line("HCHC 040239678 -");
        let now = Instant::now();

        let snapshot = gate.try_flush(&mut acc, now).expect("first flush");
        assert_eq!(snapshot.get("HCHC"), Some(&FieldValue::Integer(40_239_678)));
        assert!(acc.is_empty());
        assert_eq!(gate.last_publish(), Some(now));
    }

    #[test]
    fn no_two_flushes_within_the_interval() {
        let mut gate = PublishGate::new(INTERVAL);
        let mut acc = FrameAccumulator::new();
        let t0 = Instant::now();

        assert!(gate.try_flush(&mut acc, t0).is_some());
        assert!(gate.try_flush(&mut acc, t0 + Duration::from_secs(10)).is_none());
        // Exactly the interval is still too soon (strictly greater required)
        assert!(gate.try_flush(&mut acc, t0 + INTERVAL).is_none());
        assert!(gate
            .try_flush(&mut acc, t0 + INTERVAL + Duration::from_millis(1))
            .is_some());
    }

    #[test]
    fn skipped_frames_merge_into_the_next_flush() {
        let mut gate = PublishGate::new(INTERVAL);
        let mut acc = FrameAccumulator::new();
        let t0 = Instant::now();
        assert!(gate.try_flush(&mut acc, t0).is_some());

        // Two frames complete inside the interval; their fields pile up,
        // the later IINST value overwriting the earlier one.
        acc.apply_line("HCHC 040239678 -");
        acc.apply_line("IINST 002 Y");
        assert!(gate.try_flush(&mut acc, t0 + Duration::from_secs(5)).is_none());
        acc.apply_line("IINST 003 Z");
        assert!(gate.try_flush(&mut acc, t0 + Duration::from_secs(15)).is_none());

        let t1 = t0 + INTERVAL + Duration::from_secs(1);
        let snapshot = gate.try_flush(&mut acc, t1).expect("merged flush");
        assert_eq!(snapshot.get("HCHC"), Some(&FieldValue::Integer(40_239_678)));
        assert_eq!(snapshot.get("IINST"), Some(&FieldValue::Integer(3)));
        assert!(acc.is_empty());
        assert_eq!(gate.last_publish(), Some(t1));
    }

    #[test]
    fn empty_snapshot_still_flushes() {
        // A frame end with nothing accumulated publishes an empty object.
        let mut gate = PublishGate::new(INTERVAL);
        let mut acc = FrameAccumulator::new();
        let snapshot = gate.try_flush(&mut acc, Instant::now()).unwrap();
        assert!(snapshot.is_empty());
    }
}
