//! Replication task lifecycle.
//!
//! A [`ReplicationTask`] owns one source, the sinks built from its
//! destinations and the checkpoint loop. Running tasks are tracked in a
//! [`TaskRegistry`] shared by the control plane.

mod checkpointer;
mod peer;
mod registry;
mod replication;

pub use checkpointer::Checkpointer;
pub use peer::{LocalOnly, PeerDetector};
pub use registry::TaskRegistry;
pub use replication::{DestinationStatus, ReplicationTask, TaskDetail};

use std::sync::Arc;
use std::time::Duration;

use checkpoint::CheckpointStore;
use meta_store::MetaStore;

/// Checkpoint loop timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointTiming {
    /// Sleep between two checks
    pub tick: Duration,
    /// Minimum time between two periodic saves
    pub interval: Duration,
}

impl Default for CheckpointTiming {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            interval: Duration::from_secs(5),
        }
    }
}

/// Collaborators shared by every task of the process.
#[derive(Clone)]
pub struct TaskContext {
    pub store: Arc<dyn MetaStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub registry: Arc<TaskRegistry>,
    pub peers: Arc<dyn PeerDetector>,
    pub timing: CheckpointTiming,
}

impl TaskContext {
    /// Context over one store that holds both metadata and positions.
    pub fn new<S>(store: Arc<S>, registry: Arc<TaskRegistry>, timing: CheckpointTiming) -> Self
    where
        S: MetaStore + CheckpointStore + 'static,
    {
        Self {
            store: store.clone(),
            checkpoints: store,
            registry,
            peers: Arc::new(LocalOnly),
            timing,
        }
    }

    pub fn with_peers(mut self, peers: Arc<dyn PeerDetector>) -> Self {
        self.peers = peers;
        self
    }
}
