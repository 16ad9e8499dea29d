//! Checkpoint management for binlog-sync
//!
//! Provides the position type used to resume a change stream, plus the
//! bookkeeping that decides when a position is worth persisting.
//!
//! # Architecture
//!
//! - [`BinlogPosition`] - MySQL binlog file name + offset
//! - [`CheckpointTracker`] - throttling and monotonicity guard for saves
//! - [`CheckpointStore`] - storage backend seam (implemented by the meta store)

mod position;
mod store;
mod tracker;


pub use position::BinlogPosition;
pub use store::CheckpointStore;
pub use tracker::{CheckpointTracker, SaveDecision};
