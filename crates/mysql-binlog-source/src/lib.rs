//! MySQL change stream source.
//!
//! [`StreamingSource`] is the contract the task engine consumes: a bulk
//! dump, head and synced positions, and a blocking stream from a position.
//! Every change and lifecycle notification is delivered to an
//! [`EventHandler`] in source order.
//!
//! [`MySQLSource`] implements it on top of the `mysql_async` binlog stream.

mod binlog;
mod ddl;
mod dump;
mod schema;
mod traits;
mod value;

pub use binlog::{MySQLSource, SourceConfig};
pub use ddl::ddl_table;
pub use dump::{DumpConfig, DumpTarget};
pub use schema::SchemaCache;
pub use traits::{EventHandler, StreamingSource};
pub use value::from_mysql_value;
