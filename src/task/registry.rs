//! Process-wide set of running tasks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use super::ReplicationTask;

#[derive(Default)]
struct Entries {
    running: HashMap<i64, Arc<ReplicationTask>>,
    last_errors: HashMap<i64, String>,
}

/// Running tasks keyed by task id.
///
/// Registration is a single check-and-insert under one lock, so two
/// instances of the same task can never both be registered.
#[derive(Default)]
pub struct TaskRegistry {
    entries: Mutex<Entries>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert `task` unless its id is already registered.
    pub fn try_register(&self, task: Arc<ReplicationTask>) -> bool {
        let mut entries = self.lock();
        let id = task.id();
        if entries.running.contains_key(&id) {
            return false;
        }
        entries.running.insert(id, task);
        entries.last_errors.remove(&id);
        true
    }

    pub fn remove(&self, id: i64) -> Option<Arc<ReplicationTask>> {
        self.lock().running.remove(&id)
    }

    pub fn get(&self, id: i64) -> Option<Arc<ReplicationTask>> {
        self.lock().running.get(&id).cloned()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.lock().running.contains_key(&id)
    }

    pub fn running_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.lock().running.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remember why a task last failed, shown by the control plane.
    pub fn record_error(&self, id: i64, error: String) {
        warn!(task = id, "Task failed: {error}");
        self.lock().last_errors.insert(id, error);
    }

    pub fn last_error(&self, id: i64) -> Option<String> {
        self.lock().last_errors.get(&id).cloned()
    }

    /// Stop every running task.
    pub async fn stop_all(&self) {
        let tasks: Vec<Arc<ReplicationTask>> = self.lock().running.values().cloned().collect();
        if !tasks.is_empty() {
            info!("Stopping {} running tasks", tasks.len());
        }
        for task in tasks {
            task.stop().await;
        }
    }
}
