//! Checkpoint storage seam.

use anyhow::Result;
use async_trait::async_trait;

use crate::BinlogPosition;

/// Storage backend for task positions, keyed by task id.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist the position for a task.
    async fn save_position(&self, task_id: i64, position: &BinlogPosition) -> Result<()>;

    /// Load the last persisted position for a task, if any.
    async fn load_position(&self, task_id: i64) -> Result<Option<BinlogPosition>>;
}
