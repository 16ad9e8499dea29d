use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use event_filter::FilterChain;
use serde::{Deserialize, Serialize};
use sink::{Consumer, Sinker};
use sync_core::DataSource;
use tracing::{error, info, warn};

use crate::consumer::MySQLConsumer;
use crate::executor::{MySQLExecutor, PoolSettings, StatementExecutor};
use crate::mapping::TableMapping;

/// Persisted configuration of a MySQL destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MySQLSinkConfig {
    pub dest_datasource: DataSource,
    #[serde(default)]
    pub filters: FilterChain,
    #[serde(default)]
    pub mappings: Vec<TableMapping>,
    #[serde(default)]
    pub error_continue: bool,
}

/// A MySQL destination: one consumer per table mapping.
pub struct MySQLSink {
    name: String,
    enabled: AtomicBool,
    error_continue: bool,
    filters: FilterChain,
    consumers: Vec<Arc<dyn Consumer>>,
}

impl MySQLSink {
    pub fn new(
        name: impl Into<String>,
        error_continue: bool,
        filters: FilterChain,
        consumers: Vec<Arc<dyn Consumer>>,
    ) -> Self {
        Self {
            name: name.into(),
            enabled: AtomicBool::new(true),
            error_continue,
            filters,
            consumers,
        }
    }

    /// Build consumers for every valid mapping, all sharing `executor`.
    pub fn with_executor(
        name: impl Into<String>,
        config: &MySQLSinkConfig,
        executor: Arc<dyn StatementExecutor>,
    ) -> Self {
        let name = name.into();
        let mut consumers: Vec<Arc<dyn Consumer>> = Vec::with_capacity(config.mappings.len());
        for mapping in &config.mappings {
            if let Err(e) = mapping.validate() {
                error!(sink = %name, "Ignoring table mapping: {e}");
                continue;
            }
            let consumer_name = format!("{name}:{}->{}", mapping.src_table, mapping.dst_table());
            consumers.push(Arc::new(MySQLConsumer::new(
                consumer_name,
                mapping.clone(),
                executor.clone(),
            )));
        }
        if consumers.is_empty() {
            warn!(sink = %name, "Destination has no usable table mappings");
        }
        Self::new(name, config.error_continue, config.filters.clone(), consumers)
    }

    /// Connect to the destination and build its consumers.
    pub async fn connect(
        name: impl Into<String>,
        config: &MySQLSinkConfig,
        settings: &PoolSettings,
    ) -> Result<Self> {
        let name = name.into();
        let executor = MySQLExecutor::connect(&config.dest_datasource, settings).await?;
        let sink = Self::with_executor(name, config, Arc::new(executor));
        info!(
            sink = %sink.name,
            consumers = sink.consumers.len(),
            filters = sink.filters.len(),
            "Destination ready"
        );
        Ok(sink)
    }
}

impl Sinker for MySQLSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn disable(&self) {
        if self.enabled.swap(false, Ordering::AcqRel) {
            warn!(sink = %self.name, "Destination disabled");
        }
    }

    fn error_continue(&self) -> bool {
        self.error_continue
    }

    fn filters(&self) -> &FilterChain {
        &self.filters
    }

    fn consumers(&self) -> &[Arc<dyn Consumer>] {
        &self.consumers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Failure, MemoryExecutor};
    use sink::{deliver, Delivery};
    use sync_core::{ChangeAction, ChangeEvent, ColumnDef, RowValue};

    fn config(json: &str) -> MySQLSinkConfig {
        serde_json::from_str(json).unwrap()
    }

    fn insert(table: &str, id: i64) -> ChangeEvent {
        ChangeEvent::new(
            "shop",
            table,
            ChangeAction::Insert,
            vec![ColumnDef::new("id", 0, true)],
            vec![vec![RowValue::Int(id)]],
        )
    }

    #[test]
    fn test_config_parses_filters_and_mappings() {
        let cfg = config(
            r#"{
                "destDatasource": {"host": "db2", "port": 3306, "username": "u", "password": "p", "database": "copy"},
                "filters": [{"type": "table", "ignoreActions": ["delete"]}],
                "mappings": [{"srcTable": "orders"}, {"srcTable": "users", "dstTable": "members"}],
                "errorContinue": true
            }"#,
        );
        assert!(cfg.error_continue);
        assert_eq!(cfg.filters.len(), 1);
        assert_eq!(cfg.mappings[1].dst_table(), "members");
        assert_eq!(cfg.dest_datasource.database.as_deref(), Some("copy"));
    }

    #[test]
    fn test_invalid_mappings_are_skipped() {
        let cfg = config(
            r#"{"destDatasource": {"host": "h", "username": "u"},
                "mappings": [{"srcTable": ""}, {"srcTable": "orders"}]}"#,
        );
        let sink = MySQLSink::with_executor("d1", &cfg, Arc::new(MemoryExecutor::new()));
        assert_eq!(sink.consumers().len(), 1);
        assert_eq!(sink.consumers()[0].name(), "d1:orders->orders");
    }

    #[tokio::test]
    async fn test_routes_events_by_table() {
        let db = Arc::new(
            MemoryExecutor::new()
                .with_table("orders", &["id"])
                .with_table("members", &["id"]),
        );
        let cfg = config(
            r#"{"destDatasource": {"host": "h", "username": "u"},
                "mappings": [{"srcTable": "orders"}, {"srcTable": "users", "dstTable": "members"}]}"#,
        );
        let sink = MySQLSink::with_executor("d1", &cfg, db.clone());

        assert_eq!(deliver(&sink, &insert("orders", 1)).await, Delivery::Applied { consumers: 1 });
        assert_eq!(deliver(&sink, &insert("users", 7)).await, Delivery::Applied { consumers: 1 });
        assert_eq!(deliver(&sink, &insert("items", 3)).await, Delivery::Applied { consumers: 0 });
        assert_eq!(db.rows("orders").len(), 1);
        assert_eq!(db.rows("members")[0]["id"], RowValue::Int(7));
    }

    #[tokio::test]
    async fn test_write_failure_disables_unless_error_continue() {
        let db = Arc::new(MemoryExecutor::new().with_table("orders", &["id"]));
        db.set_failure(Failure::Always);

        let strict = config(r#"{"destDatasource": {"host": "h", "username": "u"}, "mappings": [{"srcTable": "orders"}]}"#);
        let sink = MySQLSink::with_executor("strict", &strict, db.clone());
        assert_eq!(deliver(&sink, &insert("orders", 1)).await, Delivery::FailedDisabled);
        assert!(!sink.enabled());

        let lenient = config(r#"{"destDatasource": {"host": "h", "username": "u"}, "mappings": [{"srcTable": "orders"}], "errorContinue": true}"#);
        let sink = MySQLSink::with_executor("lenient", &lenient, db);
        assert_eq!(deliver(&sink, &insert("orders", 1)).await, Delivery::FailedContinuing);
        assert!(sink.enabled());
    }
}
