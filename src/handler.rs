//! Delivers source events to a task's sinks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use checkpoint::BinlogPosition;
use futures::future::join_all;
use mysql_binlog_source::EventHandler;
use sink::{deliver, Delivery, Sinker};
use sync_core::ChangeEvent;
use tracing::{debug, error, info};

use crate::task::Checkpointer;

/// Fans every change out to all sinks of a task.
///
/// Sinks are independent destinations and run concurrently, but every sink
/// has finished with an event before the next one is accepted.
pub struct SinkHandler {
    task_id: i64,
    sinks: Vec<Arc<dyn Sinker>>,
    checkpointer: Arc<Checkpointer>,
    events: AtomicU64,
}

impl SinkHandler {
    pub fn new(task_id: i64, sinks: Vec<Arc<dyn Sinker>>, checkpointer: Arc<Checkpointer>) -> Self {
        Self {
            task_id,
            sinks,
            checkpointer,
            events: AtomicU64::new(0),
        }
    }

    pub fn sinks(&self) -> &[Arc<dyn Sinker>] {
        &self.sinks
    }

    /// Row events handled so far.
    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    /// Deliver one event and report what each sink did with it.
    pub async fn dispatch(&self, event: &ChangeEvent) -> Vec<Delivery> {
        let deliveries = join_all(self.sinks.iter().map(|s| deliver(s.as_ref(), event))).await;
        self.events.fetch_add(1, Ordering::Relaxed);
        debug!(
            task = self.task_id,
            schema = %event.schema,
            table = %event.table,
            action = %event.action,
            rows = event.image_count(),
            "Dispatched {deliveries:?}"
        );
        deliveries
    }

    async fn checkpoint(&self, synced: &BinlogPosition, reason: &str) {
        if let Err(e) = self.checkpointer.save(synced).await {
            error!(task = self.task_id, "Failed to save position on {reason}: {e:#}");
        }
    }
}

#[async_trait]
impl EventHandler for SinkHandler {
    async fn on_rows(&self, event: &ChangeEvent) -> Result<()> {
        self.dispatch(event).await;
        Ok(())
    }

    async fn on_rotate(&self, next: &BinlogPosition, synced: &BinlogPosition) -> Result<()> {
        info!(task = self.task_id, "Binlog rotated to {next}");
        self.checkpoint(synced, "rotate").await;
        Ok(())
    }

    async fn on_ddl(&self, next: &BinlogPosition, query: &str, synced: &BinlogPosition) -> Result<()> {
        info!(task = self.task_id, "DDL at {next}: {query}");
        self.checkpoint(synced, "ddl").await;
        Ok(())
    }

    async fn on_table_changed(&self, schema: &str, table: &str, synced: &BinlogPosition) -> Result<()> {
        debug!(task = self.task_id, "Table changed: {schema}.{table}");
        self.checkpoint(synced, "table change").await;
        Ok(())
    }
}
