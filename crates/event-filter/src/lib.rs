//! Change event filters.
//!
//! A destination carries a [`FilterChain`]. An event is dropped for that
//! destination when any filter in the chain matches it. Filters are
//! configured as tagged JSON objects:
//!
//! ```rust
//! use event_filter::FilterChain;
//! use sync_core::{ChangeAction, ChangeEvent, ColumnDef, RowValue};
//!
//! let chain: FilterChain = serde_json::from_str(
//!     r#"[{"type": "table", "ignoreActions": ["delete"]}]"#,
//! ).unwrap();
//!
//! let event = ChangeEvent::new(
//!     "shop",
//!     "orders",
//!     ChangeAction::Delete,
//!     vec![ColumnDef::new("id", 0, true)],
//!     vec![vec![RowValue::Int(1)]],
//! );
//! assert!(chain.filtered(&event));
//! ```

mod data;
mod table;

pub use data::DataFilter;
pub use table::TableFilter;

use serde::{Deserialize, Serialize};
use sync_core::ChangeEvent;

/// Decides whether an event is excluded for a destination.
pub trait EventFilter {
    /// Returns true when the event must be dropped.
    fn matches(&self, event: &ChangeEvent) -> bool;
}

/// The closed set of filter kinds a destination can be configured with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Filter {
    Table(TableFilter),
    Data(DataFilter),
}

impl EventFilter for Filter {
    fn matches(&self, event: &ChangeEvent) -> bool {
        match self {
            Filter::Table(f) => f.matches(event),
            Filter::Data(f) => f.matches(event),
        }
    }
}

impl From<TableFilter> for Filter {
    fn from(f: TableFilter) -> Self {
        Filter::Table(f)
    }
}

impl From<DataFilter> for Filter {
    fn from(f: DataFilter) -> Self {
        Filter::Data(f)
    }
}

/// Ordered filters combined with OR.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// True when any filter matches.
    pub fn filtered(&self, event: &ChangeEvent) -> bool {
        self.filters.iter().any(|f| f.matches(event))
    }
}

impl From<Vec<Filter>> for FilterChain {
    fn from(filters: Vec<Filter>) -> Self {
        Self::new(filters)
    }
}
