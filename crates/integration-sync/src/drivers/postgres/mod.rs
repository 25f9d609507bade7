//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PgConn`]: single tokio-postgres session, optionally over rustls

mod conn;
mod dialect;

pub use conn::PgConn;
pub use dialect::PostgresDialect;
