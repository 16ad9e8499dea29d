//! Detection of other nodes already replicating the same source.

use anyhow::Result;
use async_trait::async_trait;
use sync_core::DataSource;

/// Reports whether another replication session already covers a source.
///
/// When it does, the task captures the head position and stops instead of
/// streaming.
#[async_trait]
pub trait PeerDetector: Send + Sync {
    async fn has_running(&self, task_id: i64, source: &DataSource) -> Result<bool>;
}

/// Single-node deployment: there are never peers.
pub struct LocalOnly;

#[async_trait]
impl PeerDetector for LocalOnly {
    async fn has_running(&self, _task_id: i64, _source: &DataSource) -> Result<bool> {
        Ok(false)
    }
}
