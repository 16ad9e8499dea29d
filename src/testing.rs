//! In-process fakes for driving whole tasks without a database.
//!
//! - [`ScriptedSource`] replays a fixed list of stream steps
//! - [`FixedSourceFactory`] hands the same source to every built task
//! - [`MemorySinkFactory`] builds MySQL sinks over [`MemoryExecutor`]s
//! - [`memory_stack`] wires a [`MemoryMetaStore`] into a builder

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use checkpoint::BinlogPosition;
use meta_store::{DestinationRecord, MemoryMetaStore};
use mysql_binlog_source::{EventHandler, SourceConfig, StreamingSource};
use mysql_sink::testing::MemoryExecutor;
use mysql_sink::{MySQLSink, MySQLSinkConfig};
use sink::Sinker;
use sync_core::ChangeEvent;
use tokio::sync::Notify;

use crate::builder::{SinkFactory, SourceFactory, TaskBuilder};
use crate::task::{CheckpointTiming, TaskContext, TaskRegistry};

/// One step of a scripted stream.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Deliver rows, then mark `commit` as synced.
    Rows { event: ChangeEvent, commit: BinlogPosition },
    Rotate(BinlogPosition),
    Ddl { query: String, next: BinlogPosition },
    /// Fail the stream.
    Fail(String),
}

impl ScriptStep {
    pub fn rows(event: ChangeEvent, commit: BinlogPosition) -> Self {
        ScriptStep::Rows { event, commit }
    }
}

#[derive(Default)]
struct ScriptState {
    steps: VecDeque<ScriptStep>,
    dump: Vec<ChangeEvent>,
    dump_error: Option<String>,
    dump_end: Option<BinlogPosition>,
    master: Option<BinlogPosition>,
    synced: BinlogPosition,
    run_from: Vec<BinlogPosition>,
}

/// A [`StreamingSource`] that replays a script, then idles until closed.
#[derive(Default)]
pub struct ScriptedSource {
    state: Mutex<ScriptState>,
    closed: AtomicBool,
    closes: AtomicUsize,
    dumps: AtomicUsize,
    notify: Notify,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_steps(self, steps: Vec<ScriptStep>) -> Self {
        self.lock().steps.extend(steps);
        self
    }

    pub fn with_master(self, position: BinlogPosition) -> Self {
        self.lock().master = Some(position);
        self
    }

    /// Configure a dump that delivers `events` and ends at `end`.
    pub fn with_dump(self, events: Vec<ChangeEvent>, end: BinlogPosition) -> Self {
        {
            let mut state = self.lock();
            state.dump = events;
            state.dump_end = Some(end);
        }
        self
    }

    pub fn with_failing_dump(self, error: &str) -> Self {
        {
            let mut state = self.lock();
            state.dump_end = Some(BinlogPosition::default());
            state.dump_error = Some(error.to_string());
        }
        self
    }

    /// Positions `run_from` was called with.
    pub fn run_from_calls(&self) -> Vec<BinlogPosition> {
        self.lock().run_from.clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn dumps(&self) -> usize {
        self.dumps.load(Ordering::SeqCst)
    }

    fn set_synced(&self, position: BinlogPosition) {
        self.lock().synced = position;
    }

    fn next_step(&self) -> Option<ScriptStep> {
        self.lock().steps.pop_front()
    }

    async fn wait_closed(&self) {
        loop {
            let notified = self.notify.notified();
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl StreamingSource for ScriptedSource {
    async fn dump(&self, handler: &dyn EventHandler) -> Result<()> {
        self.dumps.fetch_add(1, Ordering::SeqCst);
        let (events, error, end) = {
            let state = self.lock();
            (state.dump.clone(), state.dump_error.clone(), state.dump_end.clone())
        };
        if let Some(error) = error {
            bail!("{error}");
        }
        for event in events {
            handler.on_rows(&event.with_dump(true)).await?;
        }
        if let Some(end) = end {
            self.set_synced(end);
        }
        Ok(())
    }

    fn has_dump(&self) -> bool {
        self.lock().dump_end.is_some()
    }

    async fn master_position(&self) -> Result<BinlogPosition> {
        self.lock()
            .master
            .clone()
            .ok_or_else(|| anyhow!("source unreachable"))
    }

    fn synced_position(&self) -> BinlogPosition {
        self.lock().synced.clone()
    }

    async fn run_from(&self, position: BinlogPosition, handler: Arc<dyn EventHandler>) -> Result<()> {
        {
            let mut state = self.lock();
            state.run_from.push(position.clone());
            state.synced = position;
        }
        while let Some(step) = self.next_step() {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(());
            }
            let synced = self.synced_position();
            match step {
                ScriptStep::Rows { event, commit } => {
                    handler.on_rows(&event).await?;
                    self.set_synced(commit);
                }
                ScriptStep::Rotate(next) => {
                    handler.on_rotate(&next, &synced).await?;
                    self.set_synced(next);
                }
                ScriptStep::Ddl { query, next } => {
                    handler.on_ddl(&next, &query, &synced).await?;
                    self.set_synced(next);
                }
                ScriptStep::Fail(error) => bail!("{error}"),
            }
        }
        self.wait_closed().await;
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn delay(&self) -> u32 {
        0
    }
}

/// Returns the same source for every task.
pub struct FixedSourceFactory(pub Arc<ScriptedSource>);

impl SourceFactory for FixedSourceFactory {
    fn open(&self, _config: &SourceConfig) -> Result<Arc<dyn StreamingSource>> {
        Ok(self.0.clone())
    }
}

/// Builds sinks over in-memory executors keyed by destination name.
#[derive(Default)]
pub struct MemorySinkFactory {
    executors: Mutex<HashMap<String, Arc<MemoryExecutor>>>,
    unreachable: Mutex<HashSet<String>>,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executor(self, destination: &str, executor: MemoryExecutor) -> Self {
        self.executors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(destination.to_string(), Arc::new(executor));
        self
    }

    /// Make building `destination` fail as if it could not be reached.
    pub fn with_unreachable(self, destination: &str) -> Self {
        self.unreachable
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(destination.to_string());
        self
    }

    pub fn executor(&self, destination: &str) -> Option<Arc<MemoryExecutor>> {
        self.executors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(destination)
            .cloned()
    }
}

#[async_trait]
impl SinkFactory for MemorySinkFactory {
    async fn build(&self, dest: &DestinationRecord, config: MySQLSinkConfig) -> Result<Arc<dyn Sinker>> {
        if self
            .unreachable
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&dest.name)
        {
            bail!("destination {} unreachable", dest.name);
        }
        let executor = self
            .executor(&dest.name)
            .ok_or_else(|| anyhow!("no executor for destination {}", dest.name))?;
        Ok(Arc::new(MySQLSink::with_executor(dest.name.clone(), &config, executor)))
    }
}

/// Fast timing for tests: 10ms ticks, 50ms interval.
pub fn fast_timing() -> CheckpointTiming {
    CheckpointTiming {
        tick: std::time::Duration::from_millis(10),
        interval: std::time::Duration::from_millis(50),
    }
}

/// Builder, store and registry over in-memory parts.
pub fn memory_stack(
    store: Arc<MemoryMetaStore>,
    source: Arc<ScriptedSource>,
    sinks: Arc<MemorySinkFactory>,
    timing: CheckpointTiming,
) -> (Arc<TaskBuilder>, Arc<TaskRegistry>) {
    let registry = Arc::new(TaskRegistry::new());
    let ctx = TaskContext::new(store, registry.clone(), timing);
    let builder = Arc::new(TaskBuilder::new(
        ctx,
        Arc::new(FixedSourceFactory(source)),
        sinks,
    ));
    (builder, registry)
}
