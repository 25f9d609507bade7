//! Core abstractions shared by the broker, reconciler and orchestrator.
//!
//! - [`schema`]: required table shapes and live column metadata
//! - [`value`]: the small SQL value model bound into and decoded out of drivers
//! - [`traits`]: the `Dialect` strategy, the `Connection` driver seam and
//!   `UnitOfWork`
//!
//! Driver modules (`drivers/sqlite`, `drivers/postgres`, `drivers/mysql`)
//! implement these traits; nothing above them names a concrete engine.

pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{ColumnDefault, ColumnSpec, ColumnType, LiveColumn, TableShape};
pub use traits::{sql_literal, Connection, Dialect, UnitOfWork};
pub use value::{Row, SqlValue};
