//! Persists synced positions for one task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use checkpoint::{BinlogPosition, CheckpointStore, CheckpointTracker, SaveDecision};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Writes positions through a [`CheckpointTracker`] so that what reaches
/// the store never moves backwards during one run.
pub struct Checkpointer {
    task_id: i64,
    store: Arc<dyn CheckpointStore>,
    tracker: CheckpointTracker,
    // Serializes check + write + record across the loop and the stream handler.
    write: Mutex<()>,
}

impl Checkpointer {
    pub fn new(task_id: i64, store: Arc<dyn CheckpointStore>, interval: Duration) -> Self {
        Self {
            task_id,
            store,
            tracker: CheckpointTracker::new(interval),
            write: Mutex::new(()),
        }
    }

    /// Restart the interval without writing.
    pub fn reset_interval(&self) {
        self.tracker.touch(Instant::now());
    }

    /// Persist `position` unless it is unset, unchanged or older than the last write.
    pub async fn save(&self, position: &BinlogPosition) -> Result<SaveDecision> {
        let _write = self.write.lock().await;
        let decision = self.tracker.check(position);
        match &decision {
            SaveDecision::Save => {
                self.store.save_position(self.task_id, position).await?;
                self.tracker.record(position, Instant::now());
                info!(task = self.task_id, "Position saved: {position}");
            }
            SaveDecision::SkipRegressed { persisted } => {
                warn!(
                    task = self.task_id,
                    "Not saving {position}: behind persisted {persisted}"
                );
            }
            SaveDecision::SkipUnset | SaveDecision::SkipUnchanged => {
                debug!(task = self.task_id, "Position {position} not saved: {decision:?}");
            }
        }
        Ok(decision)
    }

    /// [`save`](Self::save) once the interval has elapsed. Returns `None` when not due.
    pub async fn save_if_due(&self, position: &BinlogPosition) -> Result<Option<SaveDecision>> {
        let now = Instant::now();
        if !self.tracker.due(now) {
            return Ok(None);
        }
        // A failed write is retried on the next interval, not the next tick.
        self.tracker.touch(now);
        self.save(position).await.map(Some)
    }

    pub fn last_saved(&self) -> Option<BinlogPosition> {
        self.tracker.last_position()
    }
}
