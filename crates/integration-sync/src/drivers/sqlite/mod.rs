//! SQLite driver.
//!
//! The file dialect: a missing database file is created on connect, and
//! snapshot writes run without an enclosing transaction.

mod conn;
mod dialect;

pub use conn::SqliteConn;
pub use dialect::SqliteDialect;
