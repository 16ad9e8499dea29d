//! In-process metadata store.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use checkpoint::{BinlogPosition, CheckpointStore};
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::model::{
    dump_config_rewritten, page_bounds, position_info, DestinationRecord, NewTask, TaskRecord,
    TaskState,
};
use crate::store::MetaStore;

#[derive(Default)]
struct Tables {
    tasks: BTreeMap<i64, TaskRecord>,
    destinations: BTreeMap<i64, DestinationRecord>,
    next_task: i64,
    next_destination: i64,
}

/// Metadata kept in memory for the lifetime of the process.
#[derive(Default)]
pub struct MemoryMetaStore {
    tables: Mutex<Tables>,
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create every task in order. Ids start at 1.
    pub async fn seeded(tasks: Vec<NewTask>) -> Result<Self> {
        let store = Self::new();
        for task in tasks {
            store.create_task(task).await?;
        }
        Ok(store)
    }

    async fn modify(&self, id: i64, f: impl FnOnce(&mut TaskRecord) -> Result<()> + Send) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let task = tables
            .tasks
            .get_mut(&id)
            .ok_or_else(|| anyhow!("Task {id} not found"))?;
        f(task)?;
        task.updated = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl MetaStore for MemoryMetaStore {
    async fn list_tasks(&self, page: usize, size: usize) -> Result<Vec<TaskRecord>> {
        let (offset, limit) = page_bounds(page, size);
        let tables = self.tables.lock().await;
        Ok(tables.tasks.values().skip(offset).take(limit).cloned().collect())
    }

    async fn get_task(&self, id: i64) -> Result<Option<TaskRecord>> {
        Ok(self.tables.lock().await.tasks.get(&id).cloned())
    }

    async fn create_task(&self, task: NewTask) -> Result<TaskRecord> {
        let now = Utc::now();
        let mut tables = self.tables.lock().await;

        let mut ids = Vec::with_capacity(task.destinations.len());
        for dest in task.destinations {
            tables.next_destination += 1;
            let id = tables.next_destination;
            tables.destinations.insert(
                id,
                DestinationRecord {
                    id,
                    dest_type: dest.dest_type,
                    name: dest.name,
                    config: dest.config.to_string(),
                    created: now,
                    updated: now,
                },
            );
            ids.push(id.to_string());
        }

        tables.next_task += 1;
        let record = TaskRecord {
            id: tables.next_task,
            title: task.title,
            src_type: task.src_type,
            src: task.src.to_string(),
            dest: ids.join(","),
            state: TaskState::Stopped.code(),
            info: None,
            created: now,
            updated: now,
        };
        tables.tasks.insert(record.id, record.clone());
        info!("Created task {} ({})", record.id, record.title);
        Ok(record)
    }

    async fn get_destinations(&self, task: &TaskRecord) -> Result<Vec<DestinationRecord>> {
        let ids = task.dest_ids()?;
        let tables = self.tables.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.destinations.get(id).cloned())
            .collect())
    }

    async fn update_state(&self, id: i64, state: TaskState) -> Result<()> {
        self.modify(id, |task| {
            task.state = state.code();
            Ok(())
        })
        .await?;
        debug!("Task {id} state set to {state}");
        Ok(())
    }

    async fn update_position(&self, id: i64, position: &BinlogPosition) -> Result<()> {
        if position.is_unset() {
            return Ok(());
        }
        let info = position_info(position)?;
        self.modify(id, |task| {
            task.info = Some(info);
            Ok(())
        })
        .await
    }

    async fn update_dump_config(&self, id: i64, dump_config: Option<serde_json::Value>) -> Result<()> {
        self.modify(id, |task| {
            task.src = dump_config_rewritten(&task.src, dump_config)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl CheckpointStore for MemoryMetaStore {
    async fn save_position(&self, task_id: i64, position: &BinlogPosition) -> Result<()> {
        self.update_position(task_id, position).await
    }

    async fn load_position(&self, task_id: i64) -> Result<Option<BinlogPosition>> {
        Ok(self.get_task(task_id).await?.and_then(|t| t.position()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewDestination;
    use serde_json::json;

    fn new_task(title: &str, dests: usize) -> NewTask {
        NewTask {
            title: title.to_string(),
            src_type: 1,
            src: json!({"host": "h", "username": "u", "dumpConfig": {"databases": ["shop"]}}),
            destinations: (0..dests)
                .map(|i| NewDestination {
                    dest_type: 1,
                    name: format!("d{i}"),
                    config: json!({"errorContinue": true}),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_destinations() {
        let store = MemoryMetaStore::new();
        store.create_task(new_task("first", 1)).await.unwrap();
        let task = store.create_task(new_task("second", 2)).await.unwrap();

        assert_eq!(task.id, 2);
        assert_eq!(task.dest, "2,3");
        assert_eq!(task.task_state(), Some(TaskState::Stopped));

        let dests = store.get_destinations(&task).await.unwrap();
        assert_eq!(dests.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(), vec!["d0", "d1"]);
        assert!(store.get_task(9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_position_updates_skip_unset() {
        let store = MemoryMetaStore::seeded(vec![new_task("t", 0)]).await.unwrap();
        store
            .save_position(1, &BinlogPosition::new("mysql-bin.000001", 300))
            .await
            .unwrap();
        store
            .save_position(1, &BinlogPosition::new("mysql-bin.000002", 0))
            .await
            .unwrap();
        assert_eq!(
            store.load_position(1).await.unwrap(),
            Some(BinlogPosition::new("mysql-bin.000001", 300))
        );
        assert!(store.update_position(7, &BinlogPosition::new("b", 1)).await.is_err());
    }

    #[tokio::test]
    async fn test_state_and_dump_config() {
        let store = MemoryMetaStore::seeded(vec![new_task("t", 0)]).await.unwrap();
        store.update_state(1, TaskState::Running).await.unwrap();
        store.update_dump_config(1, None).await.unwrap();

        let task = store.get_task(1).await.unwrap().unwrap();
        assert_eq!(task.task_state(), Some(TaskState::Running));
        let src: serde_json::Value = serde_json::from_str(&task.src).unwrap();
        assert!(src.get("dumpConfig").is_none());
    }

    #[tokio::test]
    async fn test_list_pages() {
        let store = MemoryMetaStore::new();
        for i in 0..12 {
            store.create_task(new_task(&format!("t{i}"), 0)).await.unwrap();
        }
        assert_eq!(store.list_tasks(1, 10).await.unwrap().len(), 10);
        let second = store.list_tasks(2, 10).await.unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].id, 11);
    }
}
