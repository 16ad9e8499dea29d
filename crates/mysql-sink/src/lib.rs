//! MySQL destination.
//!
//! - [`TableMapping`] declares where a source table is written
//! - [`StatementGenerator`] turns change events into parameterized statements
//! - [`MySQLConsumer`] applies one mapping through a [`StatementExecutor`]
//! - [`MySQLSink`] bundles the consumers of a destination with its filters
//!
//! # Example
//!
//! ```rust
//! use mysql_sink::{StatementGenerator, TableMapping};
//! use sync_core::{ChangeAction, ChangeEvent, ColumnDef, RowValue};
//!
//! let generator = StatementGenerator::new(TableMapping::identity("orders"));
//! let event = ChangeEvent::new(
//!     "shop",
//!     "orders",
//!     ChangeAction::Delete,
//!     vec![ColumnDef::new("id", 0, true)],
//!     vec![vec![RowValue::Int(1)], vec![RowValue::Int(2)]],
//! );
//! let plan = generator.generate(&event).unwrap();
//! assert_eq!(plan.statements[0].sql, "DELETE FROM `orders` WHERE (`id`) IN ((?), (?))");
//! ```

mod consumer;
mod destination;
mod error;
mod executor;
mod mapping;
mod statement;
mod transform;
mod value;

pub mod testing;

pub use consumer::MySQLConsumer;
pub use destination::{MySQLSink, MySQLSinkConfig};
pub use error::{MappingError, Result};
pub use executor::{build_pool, MySQLExecutor, PoolSettings, StatementExecutor};
pub use mapping::{BoundColumn, ColumnMapping, TableMapping};
pub use statement::{
    quote_identifier, render_sql, Statement, StatementGenerator, StatementKind, WritePlan, MAX_PLACEHOLDERS,
};
pub use transform::ColumnTransforms;
pub use value::to_mysql_value;
