//! Statement execution against a destination.

use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use mysql_async::prelude::*;
use mysql_async::{OptsBuilder, Pool, PoolConstraints, PoolOpts, TxOpts};
use sync_core::DataSource;
use tracing::{info, warn};

use crate::statement::Statement;
use crate::value::to_params;

/// Executes generated statements.
#[async_trait::async_trait]
pub trait StatementExecutor: Send + Sync {
    async fn execute(&self, statement: &Statement) -> Result<()>;

    /// Execute `statements` in one transaction, rolling back on failure.
    async fn execute_atomic(&self, statements: &[Statement]) -> Result<()>;
}

/// Connection settings applied to every destination pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: usize,
    pub write_timeout: Option<Duration>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            write_timeout: None,
        }
    }
}

/// Build a bounded connection pool for a destination.
pub fn build_pool(datasource: &DataSource, max_connections: usize) -> Result<Pool> {
    let max = max_connections.max(1);
    let constraints = PoolConstraints::new(1, max)
        .ok_or_else(|| anyhow!("Invalid pool bounds: min 1, max {max}"))?;
    let opts = OptsBuilder::default()
        .ip_or_hostname(datasource.host.clone())
        .tcp_port(datasource.port)
        .user(Some(datasource.username.clone()))
        .pass(Some(datasource.password.clone()))
        .db_name(datasource.database.clone())
        .pool_opts(PoolOpts::default().with_constraints(constraints));
    Ok(Pool::new(opts))
}

/// [`StatementExecutor`] backed by a `mysql_async` pool.
pub struct MySQLExecutor {
    pool: Pool,
    write_timeout: Option<Duration>,
}

impl MySQLExecutor {
    pub fn new(pool: Pool, write_timeout: Option<Duration>) -> Self {
        Self {
            pool,
            write_timeout,
        }
    }

    /// Build the pool and verify the destination answers a ping.
    pub async fn connect(datasource: &DataSource, settings: &PoolSettings) -> Result<Self> {
        let pool = build_pool(datasource, settings.max_connections)?;
        let mut conn = pool
            .get_conn()
            .await
            .with_context(|| format!("Failed to connect to destination {datasource}"))?;
        conn.ping()
            .await
            .with_context(|| format!("Destination {datasource} did not answer ping"))?;
        info!(
            "Connected to destination {datasource} (max {} connections)",
            settings.max_connections
        );
        Ok(Self::new(pool, settings.write_timeout))
    }

    pub async fn disconnect(self) -> Result<()> {
        self.pool
            .disconnect()
            .await
            .context("Failed to disconnect destination pool")
    }

    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| anyhow!("Write timed out after {limit:?}"))?,
            None => fut.await,
        }
    }
}

#[async_trait::async_trait]
impl StatementExecutor for MySQLExecutor {
    async fn execute(&self, statement: &Statement) -> Result<()> {
        self.bounded(async {
            let mut conn = self
                .pool
                .get_conn()
                .await
                .context("Failed to get destination connection")?;
            conn.exec_drop(statement.sql.as_str(), to_params(&statement.params))
                .await
                .with_context(|| format!("Failed to execute: {}", statement.sql))
        })
        .await
    }

    async fn execute_atomic(&self, statements: &[Statement]) -> Result<()> {
        self.bounded(async {
            let mut conn = self
                .pool
                .get_conn()
                .await
                .context("Failed to get destination connection")?;
            let mut tx = conn
                .start_transaction(TxOpts::default())
                .await
                .context("Failed to start transaction")?;
            for statement in statements {
                if let Err(e) = tx
                    .exec_drop(statement.sql.as_str(), to_params(&statement.params))
                    .await
                {
                    if let Err(rollback) = tx.rollback().await {
                        warn!("Rollback failed: {rollback}");
                    }
                    return Err(anyhow::Error::new(e)
                        .context(format!("Failed to execute in transaction: {}", statement.sql)));
                }
            }
            tx.commit().await.context("Failed to commit transaction")
        })
        .await
    }
}
