//! Event fan-out to consumers.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use futures::future::join_all;
use sync_core::ChangeEvent;
use tracing::{debug, error, warn};

use crate::{Consumer, Sinker};

/// Outcome of delivering one event to one sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The sink was already disabled.
    Disabled,
    /// The filter chain dropped the event.
    Filtered,
    /// Every matching consumer applied the event.
    Applied { consumers: usize },
    /// A consumer failed and the sink stayed enabled.
    FailedContinuing,
    /// A consumer failed and the sink disabled itself.
    FailedDisabled,
}

/// Deliver `event` to `sink`.
///
/// Matching consumers run concurrently and are all awaited before this
/// returns, so the next event never overtakes this one.
pub async fn deliver(sink: &dyn Sinker, event: &ChangeEvent) -> Delivery {
    if !sink.enabled() {
        return Delivery::Disabled;
    }
    if sink.filtered(event) {
        debug!(
            sink = sink.name(),
            schema = %event.schema,
            table = %event.table,
            action = %event.action,
            "Event filtered"
        );
        return Delivery::Filtered;
    }

    match dispatch_consumers(sink.consumers(), event).await {
        Ok(consumers) => Delivery::Applied { consumers },
        Err(e) if sink.error_continue() => {
            warn!(sink = sink.name(), table = %event.table, "Consumer error, continuing: {e:#}");
            Delivery::FailedContinuing
        }
        Err(e) => {
            sink.disable();
            error!(sink = sink.name(), table = %event.table, "Consumer error, sink disabled: {e:#}");
            Delivery::FailedDisabled
        }
    }
}

/// Run every consumer that handles `event` and return how many did.
pub async fn dispatch_consumers(
    consumers: &[Arc<dyn Consumer>],
    event: &ChangeEvent,
) -> Result<usize> {
    let matching: Vec<&Arc<dyn Consumer>> =
        consumers.iter().filter(|c| c.handles(event)).collect();
    let results = join_all(matching.iter().map(|c| c.accept(event))).await;

    let mut failures = Vec::new();
    for (consumer, result) in matching.iter().zip(results) {
        if let Err(e) = result {
            failures.push(format!("{}: {e:#}", consumer.name()));
        }
    }
    if failures.is_empty() {
        Ok(matching.len())
    } else {
        Err(anyhow!(
            "{} of {} consumers failed: {}",
            failures.len(),
            matching.len(),
            failures.join("; ")
        ))
    }
}
