//! Shared setup for task integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use binlog_sync::testing::{memory_stack, MemorySinkFactory, ScriptedSource};
use binlog_sync::{CheckpointTiming, TaskBuilder, TaskRegistry};
use checkpoint::BinlogPosition;
use meta_store::{MemoryMetaStore, MetaStore, NewDestination, NewTask};
use serde_json::{json, Value};
use sync_core::{ChangeAction, ChangeEvent, ColumnDef, RowValue};

pub struct Harness {
    pub store: Arc<MemoryMetaStore>,
    pub source: Arc<ScriptedSource>,
    pub sinks: Arc<MemorySinkFactory>,
    pub builder: Arc<TaskBuilder>,
    pub registry: Arc<TaskRegistry>,
}

/// One task (id 1) with the given `(name, config)` destinations.
pub async fn harness(
    source: ScriptedSource,
    sinks: MemorySinkFactory,
    destinations: Vec<(&str, Value)>,
    timing: CheckpointTiming,
) -> Harness {
    let store = Arc::new(MemoryMetaStore::new());
    store
        .create_task(NewTask {
            title: "orders replication".to_string(),
            src_type: 1,
            src: json!({
                "host": "source.local",
                "username": "repl",
                "dumpConfig": {"databases": ["shop"]}
            }),
            destinations: destinations
                .into_iter()
                .map(|(name, config)| NewDestination {
                    dest_type: 1,
                    name: name.to_string(),
                    config,
                })
                .collect(),
        })
        .await
        .unwrap();
    let source = Arc::new(source);
    let sinks = Arc::new(sinks);
    let (builder, registry) = memory_stack(store.clone(), source.clone(), sinks.clone(), timing);
    Harness {
        store,
        source,
        sinks,
        builder,
        registry,
    }
}

/// Destination config writing `shop.orders` 1:1 into `orders`.
pub fn orders_destination(extra: Value) -> Value {
    let mut config = json!({
        "destDatasource": {"host": "dest.local", "username": "writer", "password": "pw"},
        "mappings": [{"srcTable": "orders"}],
    });
    if let (Some(config), Some(extra)) = (config.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            config.insert(k.clone(), v.clone());
        }
    }
    config
}

pub fn columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("id", 0, true),
        ColumnDef::new("name", 1, false),
    ]
}

pub fn insert(id: i64, name: &str) -> ChangeEvent {
    ChangeEvent::new(
        "shop",
        "orders",
        ChangeAction::Insert,
        columns(),
        vec![vec![RowValue::Int(id), RowValue::from(name)]],
    )
}

pub fn update(before: (i64, &str), after: (i64, &str)) -> ChangeEvent {
    ChangeEvent::new(
        "shop",
        "orders",
        ChangeAction::Update,
        columns(),
        vec![
            vec![RowValue::Int(before.0), RowValue::from(before.1)],
            vec![RowValue::Int(after.0), RowValue::from(after.1)],
        ],
    )
}

pub fn pos(file: u32, offset: u32) -> BinlogPosition {
    BinlogPosition::new(format!("mysql-bin.{file:06}"), offset)
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
