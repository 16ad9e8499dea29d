//! Binlog streaming source backed by `mysql_async`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use checkpoint::BinlogPosition;
use futures::StreamExt;
use mysql_async::binlog::events::{Event, EventData, RowsEventData};
use mysql_async::binlog::value::BinlogValue;
use mysql_async::prelude::*;
use mysql_async::{BinlogStream, BinlogStreamRequest, Conn, Opts, OptsBuilder, Pool, Row};
use serde::{Deserialize, Serialize};
use sync_core::{ChangeAction, ChangeEvent, DataSource, RowValue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ddl::ddl_table;
use crate::dump::{run_dump, DumpConfig};
use crate::schema::SchemaCache;
use crate::traits::{EventHandler, StreamingSource};
use crate::value::from_mysql_value;

/// Persisted source configuration of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    #[serde(flatten)]
    pub datasource: DataSource,
    /// Explicit starting position, used when the task has none persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<BinlogPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump_config: Option<DumpConfig>,
}

impl SourceConfig {
    pub fn new(datasource: DataSource) -> Self {
        Self {
            datasource,
            position: None,
            dump_config: None,
        }
    }
}

/// A MySQL server read as a replica.
pub struct MySQLSource {
    datasource: DataSource,
    opts: Opts,
    pool: Pool,
    server_id: u32,
    dump_config: Option<DumpConfig>,
    schema: SchemaCache,
    synced: Mutex<BinlogPosition>,
    delay: AtomicU32,
    cancel: CancellationToken,
}

impl MySQLSource {
    pub fn new(config: &SourceConfig) -> Self {
        let ds = &config.datasource;
        let opts: Opts = OptsBuilder::default()
            .ip_or_hostname(ds.host.clone())
            .tcp_port(ds.port)
            .user(Some(ds.username.clone()))
            .pass(Some(ds.password.clone()))
            .db_name(ds.database.clone())
            .into();
        // Replica ids must be unique per server; pick one outside the usual range.
        let server_id = rand::random::<u32>() % 1_000_000 + 1_000_000;
        Self {
            datasource: ds.clone(),
            pool: Pool::new(opts.clone()),
            opts,
            server_id,
            dump_config: config.dump_config.clone(),
            schema: SchemaCache::new(),
            synced: Mutex::new(BinlogPosition::default()),
            delay: AtomicU32::new(0),
            cancel: CancellationToken::new(),
        }
    }

    pub fn server_id(&self) -> u32 {
        self.server_id
    }

    pub fn datasource(&self) -> &DataSource {
        &self.datasource
    }

    fn set_synced(&self, position: BinlogPosition) {
        let mut synced = self.synced.lock().unwrap_or_else(|e| e.into_inner());
        *synced = position;
    }

    fn record_delay(&self, timestamp: u32) {
        if timestamp == 0 {
            return;
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let delay = now.saturating_sub(u64::from(timestamp));
        self.delay
            .store(u32::try_from(delay).unwrap_or(u32::MAX), Ordering::Relaxed);
    }

    async fn stream(&self, position: BinlogPosition, handler: Arc<dyn EventHandler>) -> Result<()> {
        let conn = Conn::new(self.opts.clone())
            .await
            .with_context(|| format!("Failed to connect to source {}", self.datasource))?;
        let request = BinlogStreamRequest::new(self.server_id)
            .with_filename(position.name.as_bytes())
            .with_pos(u64::from(position.pos));
        let mut stream = conn
            .get_binlog_stream(request)
            .await
            .with_context(|| format!("Failed to open binlog stream at {position}"))?;

        info!(
            "Streaming binlog from {position} (server id {})",
            self.server_id
        );
        let mut file = position.name.clone();
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Binlog stream closed at {}", self.synced_position());
                    return Ok(());
                }
                next = stream.next() => next,
            };
            let Some(event) = next else {
                bail!("Binlog stream ended by server");
            };
            let event = event.context("Failed to read binlog event")?;
            self.record_delay(event.header().timestamp());

            let step = decode(&event, &stream)?;
            self.apply(step, &mut file, event.header().log_pos(), handler.as_ref())
                .await?;
        }
    }

    async fn apply(
        &self,
        step: Step,
        file: &mut String,
        log_pos: u32,
        handler: &dyn EventHandler,
    ) -> Result<()> {
        match step {
            Step::Skip => {}
            Step::Rotate(next) => {
                debug!("Rotate to {next}");
                *file = next.name.clone();
                let synced = self.synced_position();
                handler.on_rotate(&next, &synced).await?;
                self.set_synced(next);
            }
            Step::Commit => {
                self.set_synced(BinlogPosition::new(file.clone(), log_pos));
            }
            Step::Query { schema, query } => {
                let Some((db, table)) = ddl_table(&query) else {
                    return Ok(());
                };
                let db = db.unwrap_or(schema);
                let next = BinlogPosition::new(file.clone(), log_pos);
                let synced = self.synced_position();
                if self.schema.invalidate(&db, &table).await {
                    debug!("Invalidated columns of {db}.{table}");
                }
                handler.on_table_changed(&db, &table, &synced).await?;
                handler.on_ddl(&next, &query, &synced).await?;
                self.set_synced(next);
            }
            Step::Rows {
                schema,
                table,
                action,
                column_count,
                rows,
            } => {
                let mut columns = self.schema.columns(&self.pool, &schema, &table).await?;
                if columns.len() != column_count {
                    self.schema.invalidate(&schema, &table).await;
                    columns = self.schema.columns(&self.pool, &schema, &table).await?;
                    if columns.len() != column_count {
                        bail!(
                            "Column count mismatch for {schema}.{table}: binlog has {column_count}, schema has {}",
                            columns.len()
                        );
                    }
                }
                let event = ChangeEvent::new(schema, table, action, columns.to_vec(), rows);
                handler.on_rows(&event).await?;
            }
        }
        Ok(())
    }
}

/// An owned digest of one binlog event.
enum Step {
    Skip,
    Rotate(BinlogPosition),
    Commit,
    Query {
        schema: String,
        query: String,
    },
    Rows {
        schema: String,
        table: String,
        action: ChangeAction,
        column_count: usize,
        rows: Vec<Vec<RowValue>>,
    },
}

fn decode(event: &Event, stream: &BinlogStream) -> Result<Step> {
    let Some(data) = event.read_data().context("Failed to decode binlog event")? else {
        return Ok(Step::Skip);
    };
    let step = match data {
        EventData::RotateEvent(rotate) => {
            let pos = u32::try_from(rotate.position())
                .map_err(|_| anyhow!("Rotate position {} out of range", rotate.position()))?;
            Step::Rotate(BinlogPosition::new(rotate.name().to_string(), pos))
        }
        EventData::XidEvent(_) => Step::Commit,
        EventData::QueryEvent(query) => {
            let text = query.query().to_string();
            if text.eq_ignore_ascii_case("BEGIN") {
                Step::Skip
            } else {
                Step::Query {
                    schema: query.schema().to_string(),
                    query: text,
                }
            }
        }
        EventData::RowsEvent(rows_data) => {
            let action = match &rows_data {
                RowsEventData::WriteRowsEventV1(_) | RowsEventData::WriteRowsEvent(_) => {
                    ChangeAction::Insert
                }
                RowsEventData::UpdateRowsEventV1(_)
                | RowsEventData::UpdateRowsEvent(_)
                | RowsEventData::PartialUpdateRowsEvent(_) => ChangeAction::Update,
                RowsEventData::DeleteRowsEventV1(_) | RowsEventData::DeleteRowsEvent(_) => {
                    ChangeAction::Delete
                }
            };
            let table_id = rows_data.table_id();
            let tme = stream
                .get_tme(table_id)
                .ok_or_else(|| anyhow!("Rows event for unknown table id {table_id}"))?;

            let mut rows = Vec::new();
            for row in rows_data.rows(tme) {
                let (before, after) = row.context("Failed to decode row image")?;
                for image in [before, after].into_iter().flatten() {
                    rows.push(
                        (0..image.len())
                            .map(|i| image.as_ref(i).map(binlog_value).unwrap_or(RowValue::Null))
                            .collect(),
                    );
                }
            }
            Step::Rows {
                schema: tme.database_name().to_string(),
                table: tme.table_name().to_string(),
                action,
                column_count: tme.columns_count() as usize,
                rows,
            }
        }
        _ => Step::Skip,
    };
    Ok(step)
}

fn binlog_value(value: &BinlogValue<'_>) -> RowValue {
    match value {
        BinlogValue::Value(v) => from_mysql_value(v),
        BinlogValue::Jsonb(jsonb) => match serde_json::Value::try_from(jsonb.clone()) {
            Ok(json) => RowValue::from(json.to_string()),
            Err(e) => {
                warn!("Failed to decode JSON column: {e}");
                RowValue::Null
            }
        },
        BinlogValue::JsonDiff(_) => {
            warn!("Partial JSON updates are not supported; column replicated as NULL");
            RowValue::Null
        }
    }
}

async fn head_position(conn: &mut Conn) -> Result<Option<Row>> {
    match conn.query_first("SHOW MASTER STATUS").await {
        Ok(row) => Ok(row),
        Err(e) => {
            // Removed in MySQL 8.4.
            debug!("SHOW MASTER STATUS failed ({e}), trying SHOW BINARY LOG STATUS");
            conn.query_first("SHOW BINARY LOG STATUS")
                .await
                .context("Failed to read binary log status")
        }
    }
}

#[async_trait]
impl StreamingSource for MySQLSource {
    async fn dump(&self, handler: &dyn EventHandler) -> Result<()> {
        let Some(config) = &self.dump_config else {
            return Ok(());
        };
        let head = self
            .master_position()
            .await
            .context("Failed to capture position before dump")?;
        info!("Dump of {} starting at {head}", self.datasource);
        let rows = run_dump(&self.pool, &self.schema, config, handler).await?;
        info!("Dump finished: {rows} rows, resuming at {head}");
        self.set_synced(head);
        Ok(())
    }

    fn has_dump(&self) -> bool {
        self.dump_config
            .as_ref()
            .is_some_and(|c| c.target().is_some())
    }

    async fn master_position(&self) -> Result<BinlogPosition> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .with_context(|| format!("Failed to connect to source {}", self.datasource))?;
        let row = head_position(&mut conn)
            .await?
            .ok_or_else(|| anyhow!("Binary logging is not enabled on {}", self.datasource))?;
        let name: String = row
            .get(0)
            .ok_or_else(|| anyhow!("Missing File in binary log status"))?;
        let pos: u64 = row
            .get(1)
            .ok_or_else(|| anyhow!("Missing Position in binary log status"))?;
        let pos = u32::try_from(pos).map_err(|_| anyhow!("Binlog position {pos} out of range"))?;
        Ok(BinlogPosition::new(name, pos))
    }

    fn synced_position(&self) -> BinlogPosition {
        self.synced
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn run_from(&self, position: BinlogPosition, handler: Arc<dyn EventHandler>) -> Result<()> {
        if self.cancel.is_cancelled() {
            warn!("Source {} already closed", self.datasource);
            return Ok(());
        }
        if position.name.is_empty() {
            bail!("Cannot stream from an empty binlog file name");
        }
        self.set_synced(position.clone());
        self.stream(position, handler).await
    }

    async fn close(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        if let Err(e) = self.pool.clone().disconnect().await {
            warn!("Failed to disconnect source pool for {}: {e}", self.datasource);
        }
    }

    fn delay(&self) -> u32 {
        self.delay.load(Ordering::Relaxed)
    }
}
