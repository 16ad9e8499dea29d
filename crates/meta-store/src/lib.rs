//! Task metadata storage.
//!
//! A task row holds the source configuration, the ids of its destinations,
//! its lifecycle state and an `info` blob carrying the last persisted
//! binlog position. Destination rows hold the sink configuration JSON.
//!
//! - [`MetaStore`] - the storage contract used by the task engine and the control plane
//! - [`MySQLMetaStore`] - `tasks` / `task_dests` tables on a MySQL server
//! - [`MemoryMetaStore`] - in-process store for tests and single-node setups
//!
//! Both stores implement [`checkpoint::CheckpointStore`].

mod memory;
mod model;
mod mysql;
mod store;

pub use memory::MemoryMetaStore;
pub use model::{
    dump_config_rewritten, page_bounds, parse_dest_ids, DestinationRecord, NewDestination, NewTask,
    TaskInfo, TaskRecord, TaskState,
};
pub use mysql::MySQLMetaStore;
pub use store::MetaStore;
