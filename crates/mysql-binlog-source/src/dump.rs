//! Bulk snapshot configuration and execution.

use anyhow::{bail, Context, Result};
use mysql_async::prelude::*;
use mysql_async::{Pool, Row};
use serde::{Deserialize, Serialize};
use sync_core::{ChangeAction, ChangeEvent, ColumnDef, RowValue};
use tracing::{debug, info};

use crate::schema::SchemaCache;
use crate::traits::EventHandler;
use crate::value::from_mysql_value;

/// Rows per delivered insert event during a dump.
pub const DUMP_BATCH_ROWS: usize = 500;

/// Which tables to snapshot before streaming.
///
/// `tableDB` together with `tables` takes precedence over `databases`.
/// Entries of `ignoreTables` are either `table` or `db.table`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub databases: Option<Vec<String>>,
    #[serde(default, rename = "tableDB", skip_serializing_if = "Option::is_none")]
    pub table_db: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_tables: Option<Vec<String>>,
    /// Appended to every dump `SELECT` as a `WHERE` clause
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpTarget {
    /// Explicit tables of one database
    Tables { database: String, tables: Vec<String> },
    /// Every base table of each database
    Databases(Vec<String>),
}

impl DumpConfig {
    pub fn target(&self) -> Option<DumpTarget> {
        if let (Some(database), Some(tables)) = (&self.table_db, &self.tables) {
            if !database.is_empty() && !tables.is_empty() {
                return Some(DumpTarget::Tables {
                    database: database.clone(),
                    tables: tables.clone(),
                });
            }
        }
        match &self.databases {
            Some(dbs) if !dbs.is_empty() => Some(DumpTarget::Databases(dbs.clone())),
            _ => None,
        }
    }

    pub fn is_ignored(&self, database: &str, table: &str) -> bool {
        self.ignore_tables.as_ref().is_some_and(|ignored| {
            ignored.iter().any(|entry| match entry.split_once('.') {
                Some((db, t)) => db == database && t == table,
                None => entry == table,
            })
        })
    }

    pub fn select_sql(&self, database: &str, table: &str) -> String {
        let mut sql = format!("SELECT * FROM {}.{}", quote(database), quote(table));
        if let Some(clause) = self.where_clause.as_deref().map(str::trim) {
            if !clause.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(clause);
            }
        }
        sql
    }
}

fn quote(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Resolve the tables to snapshot as `(database, table)` pairs.
async fn resolve_tables(pool: &Pool, config: &DumpConfig, target: DumpTarget) -> Result<Vec<(String, String)>> {
    let candidates = match target {
        DumpTarget::Tables { database, tables } => {
            tables.into_iter().map(|t| (database.clone(), t)).collect()
        }
        DumpTarget::Databases(databases) => {
            let mut conn = pool
                .get_conn()
                .await
                .context("Failed to get connection for dump table listing")?;
            let mut all = Vec::new();
            for database in databases {
                let tables: Vec<String> = conn
                    .exec(
                        "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
                         WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE' \
                         ORDER BY TABLE_NAME",
                        (database.as_str(),),
                    )
                    .await
                    .with_context(|| format!("Failed to list tables of {database}"))?;
                all.extend(tables.into_iter().map(|t| (database.clone(), t)));
            }
            all
        }
    };

    Ok(candidates
        .into_iter()
        .filter(|(db, t)| !config.is_ignored(db, t))
        .collect())
}

/// Snapshot every configured table through `handler`. Returns the row count.
pub(crate) async fn run_dump(
    pool: &Pool,
    schema: &SchemaCache,
    config: &DumpConfig,
    handler: &dyn EventHandler,
) -> Result<u64> {
    let Some(target) = config.target() else {
        bail!("Dump configured without databases or tables");
    };
    let tables = resolve_tables(pool, config, target).await?;
    info!("Dumping {} tables", tables.len());

    let mut total = 0;
    for (database, table) in tables {
        let columns = schema.columns(pool, &database, &table).await?;
        let count = dump_table(pool, config, &database, &table, &columns, handler).await?;
        info!("Dumped {count} rows from {database}.{table}");
        total += count;
    }
    Ok(total)
}

async fn dump_table(
    pool: &Pool,
    config: &DumpConfig,
    database: &str,
    table: &str,
    columns: &[ColumnDef],
    handler: &dyn EventHandler,
) -> Result<u64> {
    let sql = config.select_sql(database, table);
    debug!("Dump query: {sql}");

    let mut conn = pool
        .get_conn()
        .await
        .with_context(|| format!("Failed to get connection to dump {database}.{table}"))?;
    let mut result = conn
        .query_iter(sql)
        .await
        .with_context(|| format!("Failed to query {database}.{table}"))?;

    let mut batch = DumpBatch::new(database, table, columns);
    let mut count = 0;
    while let Some(row) = result.next().await? {
        batch.push(row_values(&row));
        count += 1;
        if let Some(event) = batch.take_if_full() {
            handler.on_rows(&event).await?;
        }
    }
    if let Some(event) = batch.finish() {
        handler.on_rows(&event).await?;
    }
    Ok(count)
}

fn row_values(row: &Row) -> Vec<RowValue> {
    (0..row.len())
        .map(|i| row.as_ref(i).map(from_mysql_value).unwrap_or(RowValue::Null))
        .collect()
}

/// Accumulates dumped rows into insert events of bounded size.
pub(crate) struct DumpBatch<'a> {
    database: &'a str,
    table: &'a str,
    columns: &'a [ColumnDef],
    rows: Vec<Vec<RowValue>>,
}

impl<'a> DumpBatch<'a> {
    pub(crate) fn new(database: &'a str, table: &'a str, columns: &'a [ColumnDef]) -> Self {
        Self {
            database,
            table,
            columns,
            rows: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, row: Vec<RowValue>) {
        self.rows.push(row);
    }

    pub(crate) fn take_if_full(&mut self) -> Option<ChangeEvent> {
        if self.rows.len() >= DUMP_BATCH_ROWS {
            self.finish()
        } else {
            None
        }
    }

    pub(crate) fn finish(&mut self) -> Option<ChangeEvent> {
        if self.rows.is_empty() {
            return None;
        }
        let rows = std::mem::take(&mut self.rows);
        Some(
            ChangeEvent::new(
                self.database,
                self.table,
                ChangeAction::Insert,
                self.columns.to_vec(),
                rows,
            )
            .with_dump(true),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===================================================================
    // Target resolution
    // ===================================================================

    #[test]
    fn test_tables_override_databases() {
        let config: DumpConfig = serde_json::from_str(
            r#"{"databases":["a","b"],"tableDB":"shop","tables":["orders","items"]}"#,
        )
        .unwrap();
        assert_eq!(
            config.target(),
            Some(DumpTarget::Tables {
                database: "shop".to_string(),
                tables: vec!["orders".to_string(), "items".to_string()],
            })
        );
    }

    #[test]
    fn test_databases_target() {
        let config: DumpConfig = serde_json::from_str(r#"{"databases":["shop"],"tables":["x"]}"#).unwrap();
        assert_eq!(config.target(), Some(DumpTarget::Databases(vec!["shop".to_string()])));
        assert_eq!(DumpConfig::default().target(), None);
    }

    #[test]
    fn test_ignore_tables() {
        let config = DumpConfig {
            ignore_tables: Some(vec!["logs".to_string(), "shop.audit".to_string()]),
            ..Default::default()
        };
        assert!(config.is_ignored("shop", "logs"));
        assert!(config.is_ignored("crm", "logs"));
        assert!(config.is_ignored("shop", "audit"));
        assert!(!config.is_ignored("crm", "audit"));
        assert!(!config.is_ignored("shop", "orders"));
    }

    // ===================================================================
    // SQL and batching
    // ===================================================================

    #[test]
    fn test_select_sql_with_where() {
        let config = DumpConfig {
            where_clause: Some(" id > 100 ".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.select_sql("shop", "or`ders"),
            "SELECT * FROM `shop`.`or``ders` WHERE id > 100"
        );
        assert_eq!(
            DumpConfig::default().select_sql("shop", "orders"),
            "SELECT * FROM `shop`.`orders`"
        );
    }

    #[test]
    fn test_batches_are_bounded_and_flagged() {
        let columns = vec![ColumnDef::new("id", 0, true)];
        let mut batch = DumpBatch::new("shop", "orders", &columns);
        let mut events = Vec::new();
        for i in 0..(DUMP_BATCH_ROWS + 3) {
            batch.push(vec![RowValue::Int(i as i64)]);
            if let Some(event) = batch.take_if_full() {
                events.push(event);
            }
        }
        events.extend(batch.finish());
        assert!(batch.finish().is_none());

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].rows.len(), DUMP_BATCH_ROWS);
        assert_eq!(events[1].rows.len(), 3);
        assert!(events.iter().all(|e| e.from_dump && e.action == ChangeAction::Insert));
    }
}
