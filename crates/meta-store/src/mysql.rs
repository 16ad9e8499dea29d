//! `tasks` / `task_dests` on a MySQL server.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use checkpoint::{BinlogPosition, CheckpointStore};
use chrono::{DateTime, Utc};
use mysql_async::prelude::*;
use mysql_async::{OptsBuilder, Pool, PoolConstraints, PoolOpts, Row, TxOpts};
use sync_core::DataSource;
use tracing::{debug, info};

use crate::model::{
    dump_config_rewritten, page_bounds, position_info, DestinationRecord, NewTask, TaskRecord,
    TaskState,
};
use crate::store::MetaStore;

const CREATE_TASKS: &str = "
    CREATE TABLE IF NOT EXISTS tasks (
        id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
        title VARCHAR(255) NOT NULL,
        src_type INT NOT NULL DEFAULT 1,
        src TEXT NOT NULL,
        dest VARCHAR(1024) NOT NULL DEFAULT '',
        state INT NOT NULL DEFAULT 2,
        info TEXT NULL,
        created DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
    )";

const CREATE_TASK_DESTS: &str = "
    CREATE TABLE IF NOT EXISTS task_dests (
        id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
        type INT NOT NULL DEFAULT 1,
        name VARCHAR(255) NOT NULL,
        config TEXT NOT NULL,
        created DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
    )";

const TASK_COLUMNS: &str = "id, title, src_type, src, dest, state, info, \
     UNIX_TIMESTAMP(created), UNIX_TIMESTAMP(updated)";

const DEST_COLUMNS: &str = "id, type, name, config, UNIX_TIMESTAMP(created), UNIX_TIMESTAMP(updated)";

/// Metadata store on the service's own MySQL database.
pub struct MySQLMetaStore {
    pool: Pool,
}

impl MySQLMetaStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Open a small pool, ping, and create the tables when missing.
    pub async fn connect(datasource: &DataSource) -> Result<Self> {
        let constraints =
            PoolConstraints::new(1, 5).ok_or_else(|| anyhow!("Invalid meta store pool bounds"))?;
        let opts = OptsBuilder::default()
            .ip_or_hostname(datasource.host.clone())
            .tcp_port(datasource.port)
            .user(Some(datasource.username.clone()))
            .pass(Some(datasource.password.clone()))
            .db_name(datasource.database.clone())
            .pool_opts(PoolOpts::default().with_constraints(constraints));
        let store = Self::new(Pool::new(opts));

        let mut conn = store
            .pool
            .get_conn()
            .await
            .with_context(|| format!("Failed to connect to meta store {datasource}"))?;
        conn.ping().await.context("Meta store did not answer ping")?;
        conn.query_drop(CREATE_TASKS)
            .await
            .context("Failed to create tasks table")?;
        conn.query_drop(CREATE_TASK_DESTS)
            .await
            .context("Failed to create task_dests table")?;
        info!("Connected to meta store {datasource}");
        Ok(store)
    }

    pub async fn disconnect(self) -> Result<()> {
        self.pool
            .disconnect()
            .await
            .context("Failed to disconnect meta store")
    }

    async fn conn(&self) -> Result<mysql_async::Conn> {
        self.pool
            .get_conn()
            .await
            .context("Failed to get meta store connection")
    }
}

fn timestamp(row: &Row, index: usize, what: &str) -> Result<DateTime<Utc>> {
    let secs: i64 = row
        .get(index)
        .ok_or_else(|| anyhow!("Missing {what} timestamp"))?;
    DateTime::from_timestamp(secs, 0).ok_or_else(|| anyhow!("Invalid {what} timestamp {secs}"))
}

fn task_from_row(row: Row) -> Result<TaskRecord> {
    Ok(TaskRecord {
        id: row.get(0).ok_or_else(|| anyhow!("Missing task id"))?,
        title: row.get(1).ok_or_else(|| anyhow!("Missing task title"))?,
        src_type: row.get(2).ok_or_else(|| anyhow!("Missing task src_type"))?,
        src: row.get(3).ok_or_else(|| anyhow!("Missing task src"))?,
        dest: row.get(4).ok_or_else(|| anyhow!("Missing task dest"))?,
        state: row.get(5).ok_or_else(|| anyhow!("Missing task state"))?,
        info: row.get::<Option<String>, _>(6).unwrap_or(None),
        created: timestamp(&row, 7, "created")?,
        updated: timestamp(&row, 8, "updated")?,
    })
}

fn destination_from_row(row: Row) -> Result<DestinationRecord> {
    Ok(DestinationRecord {
        id: row.get(0).ok_or_else(|| anyhow!("Missing destination id"))?,
        dest_type: row.get(1).ok_or_else(|| anyhow!("Missing destination type"))?,
        name: row.get(2).ok_or_else(|| anyhow!("Missing destination name"))?,
        config: row.get(3).ok_or_else(|| anyhow!("Missing destination config"))?,
        created: timestamp(&row, 4, "created")?,
        updated: timestamp(&row, 5, "updated")?,
    })
}

#[async_trait]
impl MetaStore for MySQLMetaStore {
    async fn list_tasks(&self, page: usize, size: usize) -> Result<Vec<TaskRecord>> {
        let (offset, limit) = page_bounds(page, size);
        let mut conn = self.conn().await?;
        let rows: Vec<Row> = conn
            .exec(
                format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY id LIMIT ?, ?"),
                (offset as u64, limit as u64),
            )
            .await
            .context("Failed to list tasks")?;
        rows.into_iter().map(task_from_row).collect()
    }

    async fn get_task(&self, id: i64) -> Result<Option<TaskRecord>> {
        let mut conn = self.conn().await?;
        let row: Option<Row> = conn
            .exec_first(format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"), (id,))
            .await
            .with_context(|| format!("Failed to load task {id}"))?;
        row.map(task_from_row).transpose()
    }

    async fn create_task(&self, task: NewTask) -> Result<TaskRecord> {
        let mut conn = self.conn().await?;
        let mut tx = conn
            .start_transaction(TxOpts::default())
            .await
            .context("Failed to begin task creation")?;

        let mut ids = Vec::with_capacity(task.destinations.len());
        for dest in &task.destinations {
            tx.exec_drop(
                "INSERT INTO task_dests (type, name, config) VALUES (?, ?, ?)",
                (dest.dest_type, dest.name.as_str(), dest.config.to_string()),
            )
            .await
            .with_context(|| format!("Failed to insert destination {}", dest.name))?;
            let id = tx
                .last_insert_id()
                .ok_or_else(|| anyhow!("No id returned for destination {}", dest.name))?;
            ids.push(id.to_string());
        }

        tx.exec_drop(
            "INSERT INTO tasks (title, src_type, src, dest, state) VALUES (?, ?, ?, ?, ?)",
            (
                task.title.as_str(),
                task.src_type,
                task.src.to_string(),
                ids.join(","),
                TaskState::Stopped.code(),
            ),
        )
        .await
        .with_context(|| format!("Failed to insert task {}", task.title))?;
        let id = tx
            .last_insert_id()
            .ok_or_else(|| anyhow!("No id returned for task {}", task.title))?;
        tx.commit().await.context("Failed to commit task creation")?;

        let id = i64::try_from(id).context("Task id out of range")?;
        info!("Created task {id} ({})", task.title);
        self.get_task(id)
            .await?
            .ok_or_else(|| anyhow!("Task {id} missing after creation"))
    }

    async fn get_destinations(&self, task: &TaskRecord) -> Result<Vec<DestinationRecord>> {
        let ids = task.dest_ids()?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut conn = self.conn().await?;
        let rows: Vec<Row> = conn
            .exec(
                format!("SELECT {DEST_COLUMNS} FROM task_dests WHERE id IN ({placeholders}) ORDER BY id"),
                ids,
            )
            .await
            .with_context(|| format!("Failed to load destinations of task {}", task.id))?;
        rows.into_iter().map(destination_from_row).collect()
    }

    async fn update_state(&self, id: i64, state: TaskState) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.exec_drop("UPDATE tasks SET state = ? WHERE id = ?", (state.code(), id))
            .await
            .with_context(|| format!("Failed to update state of task {id}"))?;
        if conn.affected_rows() > 0 {
            info!("Task {id} state saved: {state}");
        }
        Ok(())
    }

    async fn update_position(&self, id: i64, position: &BinlogPosition) -> Result<()> {
        if position.is_unset() {
            return Ok(());
        }
        let info = position_info(position)?;
        let mut conn = self.conn().await?;
        conn.exec_drop("UPDATE tasks SET info = ? WHERE id = ?", (info, id))
            .await
            .with_context(|| format!("Failed to save position of task {id}"))?;
        debug!("Task {id} position saved: {position}");
        Ok(())
    }

    async fn update_dump_config(&self, id: i64, dump_config: Option<serde_json::Value>) -> Result<()> {
        let task = self
            .get_task(id)
            .await?
            .ok_or_else(|| anyhow!("Task {id} not found"))?;
        let src = dump_config_rewritten(&task.src, dump_config)?;
        let mut conn = self.conn().await?;
        conn.exec_drop("UPDATE tasks SET src = ? WHERE id = ?", (src, id))
            .await
            .with_context(|| format!("Failed to update dump config of task {id}"))?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for MySQLMetaStore {
    async fn save_position(&self, task_id: i64, position: &BinlogPosition) -> Result<()> {
        self.update_position(task_id, position).await
    }

    async fn load_position(&self, task_id: i64) -> Result<Option<BinlogPosition>> {
        Ok(self.get_task(task_id).await?.and_then(|t| t.position()))
    }
}
