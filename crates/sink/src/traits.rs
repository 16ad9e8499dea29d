//! Sinker and Consumer trait definitions.

use std::sync::Arc;

use anyhow::Result;
use event_filter::FilterChain;
use sync_core::ChangeEvent;

/// Writes the changes of a single mapped table into a destination.
///
/// Implementations serialize their own writes so events reach the
/// destination in the order they were accepted.
#[async_trait::async_trait]
pub trait Consumer: Send + Sync {
    /// Human readable identity used in logs.
    fn name(&self) -> &str;

    /// Whether this consumer handles the event's table.
    fn handles(&self, event: &ChangeEvent) -> bool;

    /// Apply one change event.
    async fn accept(&self, event: &ChangeEvent) -> Result<()>;
}

/// One destination with its filters, consumers and failure policy.
///
/// The enabled flag starts out true and transitions to false at most once.
pub trait Sinker: Send + Sync {
    fn name(&self) -> &str;

    fn enabled(&self) -> bool;

    /// Permanently stop delivering events to this destination.
    fn disable(&self);

    /// Keep going after a consumer error instead of disabling the sink.
    fn error_continue(&self) -> bool;

    fn filters(&self) -> &FilterChain;

    fn consumers(&self) -> &[Arc<dyn Consumer>];

    fn filtered(&self, event: &ChangeEvent) -> bool {
        self.filters().filtered(event)
    }
}
