//! binlog-sync library
//!
//! Replicates row changes from a MySQL binlog into MySQL destinations.
//!
//! # Features
//!
//! - Optional bulk dump before streaming, resumed from the exact dump end
//! - Per-destination filter chains (table and data expression filters)
//! - Column mappings with expression transforms
//! - Primary-key updates applied as a transactional delete + insert
//! - Failure isolation: a failing destination disables itself, others continue
//! - Periodic, monotonic position checkpoints
//!
//! # Architecture
//!
//! ```text
//! MySQLSource ──► SinkHandler ──► Sinker (filters) ──► Consumer ──► destination
//!      ▲                                │
//!      └─── ReplicationTask ◄── TaskRegistry ◄── HTTP control plane
//! ```

pub mod builder;
pub mod config;
pub mod handler;
pub mod server;
pub mod task;
pub mod testing;

pub use builder::{MySQLSinkFactory, MySQLSourceFactory, SinkFactory, SourceFactory, TaskBuilder};
pub use config::Config;
pub use handler::SinkHandler;
pub use task::{CheckpointTiming, ReplicationTask, TaskContext, TaskRegistry};
