use std::sync::Arc;

use anyhow::Result;
use sink::Consumer;
use sync_core::ChangeEvent;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::executor::StatementExecutor;
use crate::mapping::TableMapping;
use crate::statement::StatementGenerator;

/// Writes one mapped table into a MySQL destination.
///
/// Writes are serialized: an event is fully applied before the next one
/// accepted by this consumer starts.
pub struct MySQLConsumer {
    name: String,
    generator: StatementGenerator,
    executor: Arc<dyn StatementExecutor>,
    writer: Mutex<()>,
}

impl MySQLConsumer {
    pub fn new(
        name: impl Into<String>,
        mapping: TableMapping,
        executor: Arc<dyn StatementExecutor>,
    ) -> Self {
        Self {
            name: name.into(),
            generator: StatementGenerator::new(mapping),
            executor,
            writer: Mutex::new(()),
        }
    }

    pub fn mapping(&self) -> &TableMapping {
        self.generator.mapping()
    }
}

#[async_trait::async_trait]
impl Consumer for MySQLConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn handles(&self, event: &ChangeEvent) -> bool {
        self.generator.mapping().handles(event)
    }

    async fn accept(&self, event: &ChangeEvent) -> Result<()> {
        let _writer = self.writer.lock().await;

        let plan = match self.generator.generate(event) {
            Ok(plan) => plan,
            Err(e) => {
                error!(
                    consumer = %self.name,
                    table = %event.table,
                    action = %event.action,
                    "Skipping event: {e}"
                );
                return Ok(());
            }
        };
        if plan.is_empty() {
            return Ok(());
        }

        let result = if plan.atomic {
            self.executor.execute_atomic(&plan.statements).await
        } else {
            let mut result = Ok(());
            for statement in &plan.statements {
                result = self.executor.execute(statement).await;
                if result.is_err() {
                    break;
                }
            }
            result
        };

        match &result {
            Ok(()) => debug!(
                consumer = %self.name,
                statements = plan.statements.len(),
                rows = event.image_count(),
                "Applied event"
            ),
            Err(e) => error!(
                consumer = %self.name,
                sql = %plan.statements[0].sql,
                params = ?plan.statements[0].params,
                "Write failed: {e:#}"
            ),
        }
        result
    }
}
