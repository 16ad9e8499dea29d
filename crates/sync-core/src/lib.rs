//! Core types for the binlog-sync framework.
//!
//! This crate provides the wire-neutral change model shared by every other
//! crate in the workspace:
//!
//! - [`ChangeEvent`] - One row-level change (insert/update/delete) with its row images
//! - [`ChangeAction`] - The kind of change
//! - [`ColumnDef`] - Column metadata (name, ordinal, primary-key flag)
//! - [`RowValue`] - A single column value as carried by the change stream
//! - [`DataSource`] - Connection settings shared by sources, sinks and stores
//!
//! # Architecture
//!
//! ```text
//! sync-core (this crate)
//!    │
//!    ├─── mysql-binlog-source (produces ChangeEvents)
//!    ├─── event-filter        (evaluates ChangeEvents)
//!    └─── mysql-sink          (turns ChangeEvents into statements)
//! ```
//!
//! # Example
//!
//! ```rust
//! use sync_core::{ChangeAction, ChangeEvent, ColumnDef, RowValue};
//!
//! let event = ChangeEvent::new(
//!     "shop",
//!     "orders",
//!     ChangeAction::Insert,
//!     vec![ColumnDef::new("id", 0, true), ColumnDef::new("amount", 1, false)],
//!     vec![vec![RowValue::Int(1), RowValue::Int(250)]],
//! );
//!
//! assert_eq!(event.image_count(), 1);
//! assert_eq!(event.pk_positions(), vec![0]);
//! ```

pub mod datasource;
pub mod event;
pub mod value;

pub use datasource::DataSource;
pub use event::{ChangeAction, ChangeEvent, ColumnDef, ParseActionError};
pub use value::RowValue;
