use anyhow::Result;
use async_trait::async_trait;
use checkpoint::BinlogPosition;

use crate::model::{DestinationRecord, NewTask, TaskRecord, TaskState};

/// Task and destination CRUD.
#[async_trait]
pub trait MetaStore: Send + Sync {
    /// One page of tasks ordered by id. `page` starts at 1.
    async fn list_tasks(&self, page: usize, size: usize) -> Result<Vec<TaskRecord>>;

    async fn get_task(&self, id: i64) -> Result<Option<TaskRecord>>;

    /// Insert the task and its destinations together.
    async fn create_task(&self, task: NewTask) -> Result<TaskRecord>;

    async fn get_destinations(&self, task: &TaskRecord) -> Result<Vec<DestinationRecord>>;

    async fn update_state(&self, id: i64, state: TaskState) -> Result<()>;

    /// Persist `position` into the task info. Unset positions are ignored.
    async fn update_position(&self, id: i64, position: &BinlogPosition) -> Result<()>;

    /// Replace or remove (`None`) the `dumpConfig` of the task's source.
    async fn update_dump_config(&self, id: i64, dump_config: Option<serde_json::Value>) -> Result<()>;
}
