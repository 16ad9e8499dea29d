//! The replication task state machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{anyhow, Context, Result};
use checkpoint::BinlogPosition;
use meta_store::{DestinationRecord, TaskRecord, TaskState};
use mysql_binlog_source::{SourceConfig, StreamingSource};
use serde::Serialize;
use sink::Sinker;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{Checkpointer, TaskContext};
use crate::handler::SinkHandler;

/// One source replicated into a set of sinks.
///
/// An instance runs at most once: after [`stop`](Self::stop) its source is
/// closed and a new instance must be built to replicate again.
pub struct ReplicationTask {
    record: TaskRecord,
    source_config: SourceConfig,
    destinations: Vec<DestinationRecord>,
    source: Arc<dyn StreamingSource>,
    handler: Arc<SinkHandler>,
    checkpointer: Arc<Checkpointer>,
    ctx: TaskContext,
    running: AtomicBool,
    // Guards start/stop transitions and periodic checkpoint writes.
    lock: Mutex<()>,
    deferred: StdMutex<Option<BinlogPosition>>,
}

impl ReplicationTask {
    /// `sinks[i]` must be built from `destinations[i]`.
    pub fn new(
        record: TaskRecord,
        source_config: SourceConfig,
        destinations: Vec<DestinationRecord>,
        source: Arc<dyn StreamingSource>,
        sinks: Vec<Arc<dyn Sinker>>,
        ctx: TaskContext,
    ) -> Self {
        let checkpointer = Arc::new(Checkpointer::new(
            record.id,
            ctx.checkpoints.clone(),
            ctx.timing.interval,
        ));
        let handler = Arc::new(SinkHandler::new(record.id, sinks, checkpointer.clone()));
        Self {
            record,
            source_config,
            destinations,
            source,
            handler,
            checkpointer,
            ctx,
            running: AtomicBool::new(false),
            lock: Mutex::new(()),
            deferred: StdMutex::new(None),
        }
    }

    pub fn id(&self) -> i64 {
        self.record.id
    }

    pub fn record(&self) -> &TaskRecord {
        &self.record
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn delay(&self) -> u32 {
        self.source.delay()
    }

    pub fn synced_position(&self) -> BinlogPosition {
        self.source.synced_position()
    }

    pub fn handler(&self) -> &Arc<SinkHandler> {
        &self.handler
    }

    /// Head position captured when another node was found serving this source.
    pub fn deferred_position(&self) -> Option<BinlogPosition> {
        self.deferred
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Prepare and stream until stopped or failed.
    ///
    /// Returns `Ok` immediately when the task is already running or
    /// registered.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        match self.prepare().await? {
            Some(position) => self.stream_from(position).await,
            None => Ok(()),
        }
    }

    /// Register, run the dump if configured and resolve the starting position.
    ///
    /// `None` means there is nothing to stream: the task was already running
    /// or another node serves the source.
    pub async fn prepare(self: &Arc<Self>) -> Result<Option<BinlogPosition>> {
        if self.running() {
            warn!(task = self.id(), "Task already running");
            return Ok(None);
        }
        {
            let _guard = self.lock.lock().await;
            if !self.ctx.registry.try_register(Arc::clone(self)) {
                info!(task = self.id(), "Task already registered");
                return Ok(None);
            }
            if let Err(e) = self.ctx.store.update_state(self.id(), TaskState::Running).await {
                error!(task = self.id(), "Failed to save running state: {e:#}");
            }
            self.running.store(true, Ordering::Release);
            self.spawn_checkpoint_loop();
        }
        info!(task = self.id(), source = %self.source_config.datasource, "Task started");

        let dumped = self.source.has_dump();
        if dumped {
            info!(task = self.id(), "Running dump");
            let handler = self.handler.clone();
            if let Err(e) = self.source.dump(handler.as_ref()).await {
                self.stop().await;
                return Err(e.context(format!("Dump failed for task {}", self.id())));
            }
            self.finish_dump();
        }

        match self.ctx.peers.has_running(self.id(), &self.source_config.datasource).await {
            Ok(true) => {
                let head = self.source.master_position().await;
                match head {
                    Ok(position) => {
                        info!(task = self.id(), "Source served by another node, deferring at {position}");
                        *self.deferred.lock().unwrap_or_else(|e| e.into_inner()) = Some(position);
                    }
                    Err(e) => warn!(task = self.id(), "Failed to capture head position: {e:#}"),
                }
                self.stop().await;
                return Ok(None);
            }
            Ok(false) => {}
            Err(e) => warn!(task = self.id(), "Peer detection failed, continuing: {e:#}"),
        }

        match self.resolve_position(dumped).await {
            Ok(position) => Ok(Some(position)),
            Err(e) => {
                self.stop().await;
                Err(e)
            }
        }
    }

    /// Stream from `position` until the source is closed or fails.
    pub async fn stream_from(&self, position: BinlogPosition) -> Result<()> {
        info!(task = self.id(), "Streaming from {position}");
        let handler = self.handler.clone();
        if let Err(e) = self.source.run_from(position.clone(), handler).await {
            self.stop().await;
            return Err(e.context(format!("Stream failed for task {} from {position}", self.id())));
        }
        Ok(())
    }

    /// Persist the synced position, mark the task stopped and close the source.
    pub async fn stop(&self) {
        if !self.running() {
            warn!(task = self.id(), "Task is not running");
            return;
        }
        let _guard = self.lock.lock().await;
        if !self.running.swap(false, Ordering::AcqRel) {
            warn!(task = self.id(), "Task stopped concurrently");
            return;
        }
        self.ctx.registry.remove(self.id());

        let synced = self.source.synced_position();
        if let Err(e) = self.checkpointer.save(&synced).await {
            error!(task = self.id(), "Failed to save position {synced} on stop: {e:#}");
        }
        if let Err(e) = self.ctx.store.update_state(self.id(), TaskState::Stopped).await {
            error!(task = self.id(), "Failed to save stopped state: {e:#}");
        }
        self.source.close().await;
        info!(task = self.id(), "Task stopped at {synced}");
    }

    /// Persisted position, then the dump's end position, then the source head.
    async fn resolve_position(&self, dumped: bool) -> Result<BinlogPosition> {
        let persisted = match self.ctx.checkpoints.load_position(self.id()).await {
            Ok(position) => position,
            Err(e) => {
                warn!(task = self.id(), "Failed to load persisted position: {e:#}");
                self.record.position()
            }
        };
        if let Some(position) = persisted
            .or_else(|| self.source_config.position.clone())
            .filter(|p| !p.is_unset())
        {
            debug!(task = self.id(), "Using persisted position {position}");
            return Ok(position);
        }
        if dumped {
            let synced = self.source.synced_position();
            if !synced.is_unset() {
                debug!(task = self.id(), "Using dump end position {synced}");
                return Ok(synced);
            }
        }
        let head = self
            .source
            .master_position()
            .await
            .context("error getting position")?;
        if head.name.is_empty() {
            return Err(anyhow!("error getting position: source reported no binlog file"));
        }
        debug!(task = self.id(), "Using head position {head}");
        Ok(head)
    }

    fn finish_dump(&self) {
        let store = self.ctx.store.clone();
        let id = self.id();
        tokio::spawn(async move {
            match store.update_dump_config(id, None).await {
                Ok(()) => info!(task = id, "Dump config cleared"),
                Err(e) => error!(task = id, "Failed to clear dump config: {e:#}"),
            }
        });
    }

    fn spawn_checkpoint_loop(self: &Arc<Self>) {
        self.checkpointer.reset_interval();
        let task = Arc::clone(self);
        tokio::spawn(async move {
            let tick = task.ctx.timing.tick;
            loop {
                tokio::time::sleep(tick).await;
                let _guard = task.lock.lock().await;
                if !task.running() {
                    break;
                }
                let synced = task.source.synced_position();
                if let Err(e) = task.checkpointer.save_if_due(&synced).await {
                    error!(task = task.id(), "Periodic checkpoint failed: {e:#}");
                }
            }
            debug!(task = task.id(), "Checkpoint loop exited");
        });
    }

    pub fn detail(&self) -> TaskDetail {
        let sinks = self.handler.sinks();
        let destinations = self
            .destinations
            .iter()
            .enumerate()
            .map(|(i, dest)| {
                let mut status = DestinationStatus::from_record(dest);
                status.enabled = sinks.get(i).map(|s| s.enabled());
                status
            })
            .collect();
        TaskDetail {
            instance: self.record.clone(),
            delay: self.delay(),
            running: self.running(),
            position: Some(self.synced_position()).filter(|p| !p.is_unset()),
            events: self.handler.events(),
            sinkers: destinations,
        }
    }
}

/// Task detail returned by the control plane.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    pub instance: TaskRecord,
    /// Seconds behind the source
    pub delay: u32,
    pub running: bool,
    pub position: Option<BinlogPosition>,
    pub events: u64,
    pub sinkers: Vec<DestinationStatus>,
}

impl TaskDetail {
    /// Detail of a task that is not running in this process.
    pub fn stopped(record: TaskRecord, destinations: &[DestinationRecord]) -> Self {
        Self {
            position: record.position(),
            instance: record,
            delay: 0,
            running: false,
            events: 0,
            sinkers: destinations.iter().map(DestinationStatus::from_record).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationStatus {
    pub id: i64,
    pub name: String,
    /// Unknown unless the task is running
    pub enabled: Option<bool>,
    /// Destination configuration with passwords masked
    pub config: serde_json::Value,
}

impl DestinationStatus {
    fn from_record(dest: &DestinationRecord) -> Self {
        let config = serde_json::from_str(&dest.config)
            .map(mask_passwords)
            .unwrap_or_else(|_| serde_json::Value::String(dest.config.clone()));
        Self {
            id: dest.id,
            name: dest.name.clone(),
            enabled: None,
            config,
        }
    }
}

fn mask_passwords(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    if k.eq_ignore_ascii_case("password") {
                        (k, Value::String("***".to_string()))
                    } else {
                        (k, mask_passwords(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(mask_passwords).collect()),
        other => other,
    }
}
