//! Task start/stop, position resolution and checkpointing.

mod common;

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use binlog_sync::task::PeerDetector;
use binlog_sync::testing::{fast_timing, FixedSourceFactory, MemorySinkFactory, ScriptStep, ScriptedSource};
use binlog_sync::{CheckpointTiming, TaskBuilder, TaskContext, TaskRegistry};
use checkpoint::{BinlogPosition, CheckpointStore};
use common::{eventually, harness, insert, orders_destination, pos, Harness};
use meta_store::{MemoryMetaStore, MetaStore, TaskState};
use mysql_sink::testing::MemoryExecutor;
use serde_json::json;
use sync_core::DataSource;

fn sinks() -> MemorySinkFactory {
    MemorySinkFactory::new().with_executor("primary", MemoryExecutor::new().with_table("orders", &["id"]))
}

async fn single(source: ScriptedSource) -> Harness {
    harness(
        source,
        sinks(),
        vec![("primary", orders_destination(json!({})))],
        CheckpointTiming::default(),
    )
    .await
}

async fn state(h: &Harness) -> Option<TaskState> {
    h.store.get_task(1).await.unwrap().unwrap().task_state()
}

// =============================================================================
// Start / stop
// =============================================================================

#[tokio::test]
async fn test_start_streams_and_stop_persists_position() {
    let h = single(
        ScriptedSource::new()
            .with_master(pos(1, 4))
            .with_steps(vec![ScriptStep::rows(insert(1, "widget"), pos(1, 200))]),
    )
    .await;
    let task = h.builder.build(1).await.unwrap().unwrap();
    let running = task.clone();
    let handle = tokio::spawn(async move { running.start().await });

    let executor = h.sinks.executor("primary").unwrap();
    eventually("row committed", || {
        let task = task.clone();
        async move { task.synced_position() == pos(1, 200) }
    })
    .await;
    assert_eq!(executor.rows("orders").len(), 1);
    assert!(task.running());
    assert!(h.registry.contains(1));
    assert_eq!(state(&h).await, Some(TaskState::Running));

    task.stop().await;
    assert!(handle.await.unwrap().is_ok());

    assert!(!task.running());
    assert!(h.registry.is_empty());
    assert_eq!(state(&h).await, Some(TaskState::Stopped));
    assert_eq!(h.store.load_position(1).await.unwrap(), Some(pos(1, 200)));
    assert_eq!(h.source.run_from_calls(), vec![pos(1, 4)]);
    assert_eq!(h.source.closes(), 1);
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let h = single(ScriptedSource::new().with_master(pos(1, 4))).await;
    let task = h.builder.build(1).await.unwrap().unwrap();
    let running = task.clone();
    let handle = tokio::spawn(async move { running.start().await });

    let source = h.source.clone();
    eventually("stream started", || {
        let source = source.clone();
        async move { !source.run_from_calls().is_empty() }
    })
    .await;

    // Same instance: already running.
    assert!(task.start().await.is_ok());
    // Fresh instance of the same task: already registered.
    let duplicate = h.builder.build(1).await.unwrap().unwrap();
    assert!(duplicate.prepare().await.unwrap().is_none());
    assert!(!duplicate.running());
    assert_eq!(h.registry.len(), 1);

    task.stop().await;
    task.stop().await;
    duplicate.stop().await;
    assert!(handle.await.unwrap().is_ok());

    assert_eq!(h.source.closes(), 1);
    assert_eq!(h.source.run_from_calls().len(), 1);
}

// =============================================================================
// Position resolution
// =============================================================================

#[tokio::test]
async fn test_persisted_position_takes_precedence() {
    let h = single(ScriptedSource::new().with_master(pos(7, 4))).await;
    h.store.update_position(1, &pos(3, 900)).await.unwrap();

    let task = h.builder.build(1).await.unwrap().unwrap();
    assert_eq!(task.prepare().await.unwrap(), Some(pos(3, 900)));
    task.stop().await;
}

#[tokio::test]
async fn test_dump_then_resume_from_dump_end() {
    let h = single(
        ScriptedSource::new()
            .with_master(pos(9, 4))
            .with_dump(vec![insert(1, "a"), insert(2, "b")], pos(2, 50)),
    )
    .await;
    let task = h.builder.build(1).await.unwrap().unwrap();

    assert_eq!(task.prepare().await.unwrap(), Some(pos(2, 50)));
    assert_eq!(h.source.dumps(), 1);
    assert_eq!(h.sinks.executor("primary").unwrap().rows("orders").len(), 2);

    let store = h.store.clone();
    eventually("dump config cleared", || {
        let store = store.clone();
        async move {
            let task = store.get_task(1).await.unwrap().unwrap();
            let src: serde_json::Value = serde_json::from_str(&task.src).unwrap();
            src.get("dumpConfig").is_none()
        }
    })
    .await;

    task.stop().await;
    assert_eq!(h.store.load_position(1).await.unwrap(), Some(pos(2, 50)));
}

#[tokio::test]
async fn test_dump_failure_stops_task() {
    let h = single(
        ScriptedSource::new()
            .with_master(pos(1, 4))
            .with_failing_dump("mysqldump exited with 2"),
    )
    .await;
    let task = h.builder.build(1).await.unwrap().unwrap();

    let err = task.start().await.unwrap_err();
    assert!(format!("{err:#}").contains("mysqldump exited with 2"));
    assert!(!task.running());
    assert!(h.registry.is_empty());
    assert_eq!(state(&h).await, Some(TaskState::Stopped));
    assert!(h.source.run_from_calls().is_empty());
}

#[tokio::test]
async fn test_missing_position_is_fatal() {
    let h = single(ScriptedSource::new()).await;
    let task = h.builder.build(1).await.unwrap().unwrap();

    let err = task.start().await.unwrap_err();
    assert!(format!("{err:#}").contains("error getting position"));
    assert!(h.registry.is_empty());
    assert!(h.source.run_from_calls().is_empty());
}

#[tokio::test]
async fn test_stream_failure_stops_task() {
    let h = single(
        ScriptedSource::new()
            .with_master(pos(1, 4))
            .with_steps(vec![
                ScriptStep::rows(insert(1, "a"), pos(1, 120)),
                ScriptStep::Fail("binlog purged".to_string()),
            ]),
    )
    .await;
    let task = h.builder.build(1).await.unwrap().unwrap();

    let err = task.start().await.unwrap_err();
    assert!(format!("{err:#}").contains("binlog purged"));
    assert!(!task.running());
    assert_eq!(h.source.closes(), 1);
    assert_eq!(h.store.load_position(1).await.unwrap(), Some(pos(1, 120)));
}

struct AlwaysPeer;

#[async_trait]
impl PeerDetector for AlwaysPeer {
    async fn has_running(&self, _task_id: i64, _source: &DataSource) -> Result<bool> {
        Ok(true)
    }
}

#[tokio::test]
async fn test_peer_detected_defers_to_existing_session() {
    let h = single(ScriptedSource::new().with_master(pos(4, 800))).await;

    let registry = Arc::new(TaskRegistry::new());
    let ctx = TaskContext::new(h.store.clone(), registry.clone(), CheckpointTiming::default())
        .with_peers(Arc::new(AlwaysPeer));
    let builder = TaskBuilder::new(ctx, Arc::new(FixedSourceFactory(h.source.clone())), h.sinks.clone());
    let task = builder.build(1).await.unwrap().unwrap();

    assert!(task.start().await.is_ok());
    assert_eq!(task.deferred_position(), Some(pos(4, 800)));
    assert!(!task.running());
    assert!(registry.is_empty());
    assert!(h.source.run_from_calls().is_empty());
}

// =============================================================================
// Checkpointing
// =============================================================================

/// Forwards to the meta store and remembers every write.
struct RecordingCheckpoints {
    inner: Arc<MemoryMetaStore>,
    saved: Mutex<Vec<BinlogPosition>>,
}

#[async_trait]
impl CheckpointStore for RecordingCheckpoints {
    async fn save_position(&self, task_id: i64, position: &BinlogPosition) -> Result<()> {
        self.saved.lock().unwrap().push(position.clone());
        self.inner.save_position(task_id, position).await
    }

    async fn load_position(&self, task_id: i64) -> Result<Option<BinlogPosition>> {
        self.inner.load_position(task_id).await
    }
}

#[tokio::test]
async fn test_checkpoint_loop_persists_while_running() {
    let h = harness(
        ScriptedSource::new()
            .with_master(pos(1, 4))
            .with_steps(vec![ScriptStep::rows(insert(1, "a"), pos(1, 300))]),
        sinks(),
        vec![("primary", orders_destination(json!({})))],
        fast_timing(),
    )
    .await;
    let task = h.builder.build(1).await.unwrap().unwrap();
    let running = task.clone();
    let handle = tokio::spawn(async move { running.start().await });

    let store = h.store.clone();
    eventually("periodic checkpoint", || {
        let store = store.clone();
        async move { store.load_position(1).await.unwrap() == Some(pos(1, 300)) }
    })
    .await;
    assert!(task.running());

    task.stop().await;
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_persisted_positions_never_regress() {
    let h = single(ScriptedSource::new().with_master(pos(1, 4)).with_steps(vec![
        ScriptStep::rows(insert(1, "a"), pos(1, 100)),
        ScriptStep::Rotate(pos(2, 4)),
        ScriptStep::rows(insert(2, "b"), pos(2, 150)),
        ScriptStep::Ddl {
            query: "ALTER TABLE orders ADD COLUMN note TEXT".to_string(),
            next: pos(2, 400),
        },
        ScriptStep::rows(insert(3, "c"), pos(2, 520)),
    ]))
    .await;

    let recording = Arc::new(RecordingCheckpoints {
        inner: h.store.clone(),
        saved: Mutex::new(Vec::new()),
    });
    let registry = Arc::new(TaskRegistry::new());
    let mut ctx = TaskContext::new(h.store.clone(), registry, fast_timing());
    ctx.checkpoints = recording.clone() as Arc<dyn CheckpointStore>;
    let builder = TaskBuilder::new(ctx, Arc::new(FixedSourceFactory(h.source.clone())), h.sinks.clone());
    let task = builder.build(1).await.unwrap().unwrap();

    let running = task.clone();
    let handle = tokio::spawn(async move { running.start().await });
    eventually("all rows committed", || {
        let task = task.clone();
        async move { task.synced_position() == pos(2, 520) }
    })
    .await;
    assert_eq!(h.sinks.executor("primary").unwrap().rows("orders").len(), 3);
    // Let the loop observe the final position at least once more.
    tokio::time::sleep(std::time::Duration::from_millis(80)).await;
    task.stop().await;
    assert!(handle.await.unwrap().is_ok());

    let saved = recording.saved.lock().unwrap().clone();
    assert!(!saved.is_empty());
    assert!(saved.windows(2).all(|w| w[0] <= w[1]), "regressed: {saved:?}");
    assert_eq!(saved.last(), Some(&pos(2, 520)));
}
