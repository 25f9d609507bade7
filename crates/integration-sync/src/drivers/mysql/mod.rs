//! MySQL/MariaDB database driver.
//!
//! - [`MysqlDialect`]: SQL syntax strategy
//! - [`MysqlConn`]: single mysql_async session over TCP or a unix socket
//!
//! # Supported Versions
//!
//! - MySQL 8.0.13+ (expression defaults)
//! - MariaDB 10.2+

mod conn;
mod dialect;

pub use conn::MysqlConn;
pub use dialect::MysqlDialect;
