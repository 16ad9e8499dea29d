//! In-memory destination for tests.
//!
//! [`MemoryExecutor`] applies generated statements to in-memory tables
//! keyed by their primary-key columns, so write plans can be checked by
//! their effect rather than their SQL text.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use sync_core::RowValue;

use crate::executor::StatementExecutor;
use crate::statement::{Statement, StatementKind};

pub type MemoryRow = BTreeMap<String, RowValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Never,
    Always,
    OnKind(StatementKind),
}

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    key: Vec<String>,
    rows: Vec<MemoryRow>,
}

impl MemoryTable {
    fn position_of(&self, row: &MemoryRow) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| self.key.iter().all(|k| r.get(k) == row.get(k)))
    }

    fn apply(&mut self, statement: &Statement) {
        let width = statement.columns.len();
        if width == 0 {
            return;
        }
        for chunk in statement.params.chunks(width) {
            let row: MemoryRow = statement
                .columns
                .iter()
                .cloned()
                .zip(chunk.iter().cloned())
                .collect();
            match statement.kind {
                StatementKind::InsertIgnore => {
                    if self.position_of(&row).is_none() {
                        self.rows.push(row);
                    }
                }
                StatementKind::Replace => {
                    if let Some(i) = self.position_of(&row) {
                        self.rows.remove(i);
                    }
                    self.rows.push(row);
                }
                StatementKind::Delete => {
                    self.rows
                        .retain(|r| !row.iter().all(|(k, v)| r.get(k) == Some(v)));
                }
            }
        }
    }
}

/// Records and applies statements against in-memory tables.
pub struct MemoryExecutor {
    tables: Mutex<HashMap<String, MemoryTable>>,
    log: Mutex<Vec<Statement>>,
    failure: Mutex<Failure>,
    transactions: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MemoryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            failure: Mutex::new(Failure::Never),
            transactions: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Declare a destination table and its primary-key columns.
    pub fn with_table(self, name: &str, key: &[&str]) -> Self {
        self.lock_tables().insert(
            name.to_string(),
            MemoryTable {
                key: key.iter().map(|k| k.to_string()).collect(),
                rows: Vec::new(),
            },
        );
        self
    }

    pub fn set_failure(&self, failure: Failure) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = failure;
    }

    pub fn rows(&self, table: &str) -> Vec<MemoryRow> {
        self.lock_tables()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Statements that were applied, in order.
    pub fn statements(&self) -> Vec<Statement> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn transactions(&self) -> usize {
        self.transactions.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping executions observed.
    pub fn max_concurrent_writes(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lock_tables(&self) -> std::sync::MutexGuard<'_, HashMap<String, MemoryTable>> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self, statement: &Statement) -> Result<()> {
        let failure = *self.failure.lock().unwrap_or_else(|e| e.into_inner());
        match failure {
            Failure::Always => bail!("injected failure for {}", statement.sql),
            Failure::OnKind(kind) if kind == statement.kind => {
                bail!("injected failure for {}", statement.sql)
            }
            _ => Ok(()),
        }
    }

    fn apply_all(&self, statements: &[Statement]) -> Result<()> {
        let mut tables = self.lock_tables();
        let mut staged = tables.clone();
        for statement in statements {
            self.check(statement)?;
            staged
                .get_mut(&statement.table)
                .ok_or_else(|| anyhow!("Table '{}' doesn't exist", statement.table))?
                .apply(statement);
        }
        *tables = staged;
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(statements.iter().cloned());
        Ok(())
    }

    async fn run(&self, statements: &[Statement]) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let result = self.apply_all(statements);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait::async_trait]
impl StatementExecutor for MemoryExecutor {
    async fn execute(&self, statement: &Statement) -> Result<()> {
        self.run(std::slice::from_ref(statement)).await
    }

    async fn execute_atomic(&self, statements: &[Statement]) -> Result<()> {
        self.run(statements).await?;
        self.transactions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
