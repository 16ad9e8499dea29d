//! Builds runnable tasks from stored metadata.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use event_filter::FilterChain;
use meta_store::DestinationRecord;
use mysql_binlog_source::{MySQLSource, SourceConfig, StreamingSource};
use mysql_sink::{MySQLSink, MySQLSinkConfig, PoolSettings};
use sink::Sinker;
use tracing::{error, info};

use crate::task::{ReplicationTask, TaskContext};

/// Opens the source a task reads from.
pub trait SourceFactory: Send + Sync {
    fn open(&self, config: &SourceConfig) -> Result<Arc<dyn StreamingSource>>;
}

/// Builds one sink per destination.
///
/// A destination that cannot be configured still yields a sink, one with
/// no consumers, so the task keeps running for its other destinations.
#[async_trait]
pub trait SinkFactory: Send + Sync {
    async fn build(&self, dest: &DestinationRecord, config: MySQLSinkConfig) -> Result<Arc<dyn Sinker>>;
}

pub struct MySQLSourceFactory;

impl SourceFactory for MySQLSourceFactory {
    fn open(&self, config: &SourceConfig) -> Result<Arc<dyn StreamingSource>> {
        Ok(Arc::new(MySQLSource::new(config)))
    }
}

pub struct MySQLSinkFactory {
    settings: PoolSettings,
}

impl MySQLSinkFactory {
    pub fn new(settings: PoolSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SinkFactory for MySQLSinkFactory {
    async fn build(&self, dest: &DestinationRecord, config: MySQLSinkConfig) -> Result<Arc<dyn Sinker>> {
        let sink = MySQLSink::connect(dest.name.clone(), &config, &self.settings).await?;
        Ok(Arc::new(sink))
    }
}

/// A sink that delivers nothing, standing in for a misconfigured destination.
pub fn empty_sink(name: &str) -> Arc<dyn Sinker> {
    Arc::new(MySQLSink::new(name, false, FilterChain::default(), Vec::new()))
}

pub struct TaskBuilder {
    ctx: TaskContext,
    sources: Arc<dyn SourceFactory>,
    sinks: Arc<dyn SinkFactory>,
}

impl TaskBuilder {
    pub fn new(ctx: TaskContext, sources: Arc<dyn SourceFactory>, sinks: Arc<dyn SinkFactory>) -> Self {
        Self { ctx, sources, sinks }
    }

    pub fn context(&self) -> &TaskContext {
        &self.ctx
    }

    /// Load task `id` with its destinations. `None` when the task does not exist.
    pub async fn build(&self, id: i64) -> Result<Option<Arc<ReplicationTask>>> {
        let Some(record) = self.ctx.store.get_task(id).await? else {
            return Ok(None);
        };
        let source_config: SourceConfig = serde_json::from_str(&record.src)
            .with_context(|| format!("Invalid source configuration for task {id}"))?;
        let destinations = self.ctx.store.get_destinations(&record).await?;

        let mut sinks = Vec::with_capacity(destinations.len());
        for dest in &destinations {
            sinks.push(self.build_sink(id, dest).await);
        }

        let source = self.sources.open(&source_config)?;
        info!(
            task = id,
            destinations = destinations.len(),
            "Built task {}",
            record.title
        );
        Ok(Some(Arc::new(ReplicationTask::new(
            record,
            source_config,
            destinations,
            source,
            sinks,
            self.ctx.clone(),
        ))))
    }

    async fn build_sink(&self, task: i64, dest: &DestinationRecord) -> Arc<dyn Sinker> {
        let config: MySQLSinkConfig = match serde_json::from_str(&dest.config) {
            Ok(config) => config,
            Err(e) => {
                error!(task, destination = dest.id, "Invalid destination configuration: {e}");
                return empty_sink(&dest.name);
            }
        };
        match self.sinks.build(dest, config).await {
            Ok(sink) => sink,
            Err(e) => {
                error!(task, destination = dest.id, "Failed to build destination {}: {e:#}", dest.name);
                empty_sink(&dest.name)
            }
        }
    }
}
