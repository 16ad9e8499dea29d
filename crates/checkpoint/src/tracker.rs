//! Decides when a synced position should be persisted.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::BinlogPosition;

/// Outcome of offering a position to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveDecision {
    /// The position should be written.
    Save,
    /// Offset zero: never persisted, it would clobber a good checkpoint.
    SkipUnset,
    /// Already persisted exactly this position.
    SkipUnchanged,
    /// Smaller than what was already persisted during this run.
    SkipRegressed { persisted: BinlogPosition },
}

#[derive(Debug, Default)]
struct TrackerState {
    last_saved_at: Option<Instant>,
    last_position: Option<BinlogPosition>,
}

/// Tracks the last persisted position and when it was written.
///
/// Persisted positions are monotonically non-decreasing for the lifetime of
/// a tracker.
#[derive(Debug)]
pub struct CheckpointTracker {
    interval: Duration,
    state: Mutex<TrackerState>,
}

impl CheckpointTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether at least `interval` has elapsed since the last save.
    pub fn due(&self, now: Instant) -> bool {
        let state = self.lock();
        match state.last_saved_at {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= self.interval,
        }
    }

    /// Decide whether `position` may be persisted.
    pub fn check(&self, position: &BinlogPosition) -> SaveDecision {
        if position.is_unset() {
            return SaveDecision::SkipUnset;
        }
        let state = self.lock();
        match &state.last_position {
            Some(last) if position < last => SaveDecision::SkipRegressed {
                persisted: last.clone(),
            },
            Some(last) if position == last => SaveDecision::SkipUnchanged,
            _ => SaveDecision::Save,
        }
    }

    /// Mark the interval as consumed, whether or not anything was written.
    pub fn touch(&self, now: Instant) {
        self.lock().last_saved_at = Some(now);
    }

    /// Record a successful write.
    pub fn record(&self, position: &BinlogPosition, now: Instant) {
        let mut state = self.lock();
        state.last_saved_at = Some(now);
        state.last_position = Some(position.clone());
    }

    /// Last position written through this tracker.
    pub fn last_position(&self) -> Option<BinlogPosition> {
        self.lock().last_position.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        // State is plain data; a poisoned lock still holds a consistent value.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
