//! Column metadata cache.
//!
//! Binlog row events carry values by position only. Names and primary-key
//! flags come from `information_schema` and are cached per table until a
//! DDL statement invalidates them.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use mysql_async::prelude::*;
use mysql_async::{Pool, Row};
use sync_core::ColumnDef;
use tokio::sync::Mutex;
use tracing::debug;

const COLUMNS_QUERY: &str = "
    SELECT COLUMN_NAME, COLUMN_KEY
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION";

type TableKey = (String, String);

#[derive(Default)]
pub struct SchemaCache {
    tables: Mutex<HashMap<TableKey, Arc<Vec<ColumnDef>>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Columns of `schema.table`, loading them on first use.
    pub async fn columns(&self, pool: &Pool, schema: &str, table: &str) -> Result<Arc<Vec<ColumnDef>>> {
        let key = (schema.to_string(), table.to_string());
        if let Some(columns) = self.tables.lock().await.get(&key) {
            return Ok(columns.clone());
        }

        let mut conn = pool
            .get_conn()
            .await
            .context("Failed to get connection for schema lookup")?;
        let rows: Vec<Row> = conn
            .exec(COLUMNS_QUERY, (schema, table))
            .await
            .with_context(|| format!("Failed to read columns of {schema}.{table}"))?;

        let mut raw = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row
                .get(0)
                .ok_or_else(|| anyhow!("Missing column name for {schema}.{table}"))?;
            let key: String = row.get(1).unwrap_or_default();
            raw.push((name, key));
        }
        if raw.is_empty() {
            return Err(anyhow!("Table {schema}.{table} has no columns or does not exist"));
        }

        let columns = Arc::new(column_defs(raw));
        debug!("Loaded {} columns for {schema}.{table}", columns.len());
        self.tables.lock().await.insert(key, columns.clone());
        Ok(columns)
    }

    /// Seed the cache, bypassing `information_schema`.
    pub async fn insert(&self, schema: &str, table: &str, columns: Vec<ColumnDef>) {
        self.tables
            .lock()
            .await
            .insert((schema.to_string(), table.to_string()), Arc::new(columns));
    }

    pub async fn invalidate(&self, schema: &str, table: &str) -> bool {
        self.tables
            .lock()
            .await
            .remove(&(schema.to_string(), table.to_string()))
            .is_some()
    }

    /// Drop every cached table of `schema`.
    pub async fn invalidate_schema(&self, schema: &str) {
        self.tables.lock().await.retain(|(s, _), _| s != schema);
    }

    pub async fn cached(&self, schema: &str, table: &str) -> Option<Arc<Vec<ColumnDef>>> {
        self.tables
            .lock()
            .await
            .get(&(schema.to_string(), table.to_string()))
            .cloned()
    }
}

/// Build column definitions from `(COLUMN_NAME, COLUMN_KEY)` pairs in ordinal order.
pub(crate) fn column_defs(raw: Vec<(String, String)>) -> Vec<ColumnDef> {
    raw.into_iter()
        .enumerate()
        .map(|(ordinal, (name, key))| ColumnDef::new(name, ordinal, key == "PRI"))
        .collect()
}
