//! Streaming source and event handler traits.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use checkpoint::BinlogPosition;
use sync_core::ChangeEvent;

/// Receives changes and stream lifecycle notifications.
///
/// Calls are made one at a time, in stream order. Returning an error from
/// `on_rows` stops the stream.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_rows(&self, event: &ChangeEvent) -> Result<()>;

    /// The source moved to the next log file.
    async fn on_rotate(&self, _next: &BinlogPosition, _synced: &BinlogPosition) -> Result<()> {
        Ok(())
    }

    /// A schema change statement was applied at `next`.
    async fn on_ddl(&self, _next: &BinlogPosition, _query: &str, _synced: &BinlogPosition) -> Result<()> {
        Ok(())
    }

    /// Column metadata of a table was invalidated.
    async fn on_table_changed(&self, _schema: &str, _table: &str, _synced: &BinlogPosition) -> Result<()> {
        Ok(())
    }
}

/// A replication source with dump, seek and position primitives.
#[async_trait]
pub trait StreamingSource: Send + Sync {
    /// Bulk-load the configured tables as insert events.
    ///
    /// On success [`synced_position`](Self::synced_position) is where the
    /// snapshot logically ended.
    async fn dump(&self, handler: &dyn EventHandler) -> Result<()>;

    /// Whether a dump is configured.
    fn has_dump(&self) -> bool;

    /// Current head of the source's change log.
    async fn master_position(&self) -> Result<BinlogPosition>;

    /// Last position whose changes were fully handled.
    fn synced_position(&self) -> BinlogPosition;

    /// Stream changes from `position` until closed or failed.
    async fn run_from(&self, position: BinlogPosition, handler: Arc<dyn EventHandler>) -> Result<()>;

    /// Stop streaming and release connections.
    async fn close(&self);

    /// Seconds the stream lags behind the source.
    fn delay(&self) -> u32;
}
