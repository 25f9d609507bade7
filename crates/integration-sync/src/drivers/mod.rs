//! Database driver implementations.
//!
//! - [`sqlite`]: file-embedded SQLite via sqlx
//! - [`postgres`]: PostgreSQL via tokio-postgres
//! - [`mysql`]: MySQL/MariaDB via mysql_async
//! - [`common`]: shared utilities (TLS)
//!
//! # Architecture
//!
//! Each driver module provides a `Dialect` (SQL syntax strategy) and a
//! `Connection` (one open session). The broker picks both once from
//! [`DialectKind`] at connect time and carries them in a `Handle`.
//!
//! # Static dispatch
//!
//! [`DialectImpl`] and [`ConnectionImpl`] are enums whose trait impls are a
//! `match` per method instead of vtable dispatch.

pub mod common;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use common::{SslMode, TlsBuilder};
pub use mysql::{MysqlConn, MysqlDialect};
pub use postgres::{PgConn, PostgresDialect};
pub use sqlite::{SqliteConn, SqliteDialect};

use crate::core::schema::{ColumnDefault, ColumnSpec};
use crate::core::traits::{Connection, Dialect};
use crate::core::value::{Row, SqlValue};
use crate::error::{Result, SyncError};

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[serde(alias = "sqlite3")]
    Sqlite,
    #[serde(alias = "postgres", alias = "pg")]
    Postgresql,
    #[serde(alias = "mariadb")]
    Mysql,
}

impl DialectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialectKind::Sqlite => "sqlite",
            DialectKind::Postgresql => "postgresql",
            DialectKind::Mysql => "mysql",
        }
    }

    /// Default TCP port for client-server engines.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            DialectKind::Sqlite => None,
            DialectKind::Postgresql => Some(5432),
            DialectKind::Mysql => Some(3306),
        }
    }

    /// Whether the database lives in a local file.
    pub fn is_file_based(&self) -> bool {
        matches!(self, DialectKind::Sqlite)
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(DialectKind::Sqlite),
            "postgresql" | "postgres" | "pg" => Ok(DialectKind::Postgresql),
            "mysql" | "mariadb" => Ok(DialectKind::Mysql),
            other => Err(SyncError::Config(format!(
                "Unknown database type: '{}'. Supported types: sqlite, postgresql, mysql",
                other
            ))),
        }
    }
}

/// Enum-based static dispatch for dialects.
///
/// Only methods that some dialect overrides are forwarded; the remaining
/// template methods run the trait defaults on top of the forwarded
/// primitives.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Sqlite(SqliteDialect),
    Postgres(PostgresDialect),
    Mysql(MysqlDialect),
}

impl DialectImpl {
    /// Select the dialect for an engine.
    pub fn for_kind(kind: DialectKind) -> Self {
        match kind {
            DialectKind::Sqlite => DialectImpl::Sqlite(SqliteDialect::new()),
            DialectKind::Postgresql => DialectImpl::Postgres(PostgresDialect::new()),
            DialectKind::Mysql => DialectImpl::Mysql(MysqlDialect::new()),
        }
    }

    /// Create a dialect implementation from a database type string.
    ///
    /// # Errors
    ///
    /// Returns an error if the database type is not recognized.
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        Ok(Self::for_kind(db_type.parse()?))
    }
}

macro_rules! dispatch {
    ($self:ident, $d:ident => $body:expr) => {
        match $self {
            DialectImpl::Sqlite($d) => $body,
            DialectImpl::Postgres($d) => $body,
            DialectImpl::Mysql($d) => $body,
        }
    };
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        dispatch!(self, d => d.name())
    }

    fn kind(&self) -> DialectKind {
        dispatch!(self, d => d.kind())
    }

    fn quote_ident(&self, name: &str) -> String {
        dispatch!(self, d => d.quote_ident(name))
    }

    fn param_placeholder(&self, index: usize) -> String {
        dispatch!(self, d => d.param_placeholder(index))
    }

    fn column_type(&self, col: &ColumnSpec) -> String {
        dispatch!(self, d => d.column_type(col))
    }

    fn default_expr(&self, col: &ColumnSpec, default: ColumnDefault) -> String {
        dispatch!(self, d => d.default_expr(col, default))
    }

    fn introspect_query(&self) -> String {
        dispatch!(self, d => d.introspect_query())
    }

    fn text_expr(&self, column: &str) -> String {
        dispatch!(self, d => d.text_expr(column))
    }

    fn begin_statement(&self) -> &'static str {
        dispatch!(self, d => d.begin_statement())
    }

    fn transactional_writes(&self) -> bool {
        dispatch!(self, d => d.transactional_writes())
    }

    fn table_options(&self) -> &'static str {
        dispatch!(self, d => d.table_options())
    }

    fn build_upsert(
        &self,
        table: &str,
        columns: &[&str],
        pk_columns: &[&str],
        immutable: &[&str],
    ) -> String {
        dispatch!(self, d => d.build_upsert(table, columns, pk_columns, immutable))
    }

    fn build_insert_ignore(&self, table: &str, columns: &[&str]) -> String {
        dispatch!(self, d => d.build_insert_ignore(table, columns))
    }
}

/// Enum-based static dispatch for open connections.
pub enum ConnectionImpl {
    Sqlite(SqliteConn),
    Postgres(PgConn),
    Mysql(MysqlConn),
}

#[async_trait]
impl Connection for ConnectionImpl {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        match self {
            ConnectionImpl::Sqlite(c) => c.execute(sql, params).await,
            ConnectionImpl::Postgres(c) => c.execute(sql, params).await,
            ConnectionImpl::Mysql(c) => c.execute(sql, params).await,
        }
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        match self {
            ConnectionImpl::Sqlite(c) => c.query(sql, params).await,
            ConnectionImpl::Postgres(c) => c.query(sql, params).await,
            ConnectionImpl::Mysql(c) => c.query(sql, params).await,
        }
    }

    async fn simple(&mut self, sql: &str) -> Result<()> {
        match self {
            ConnectionImpl::Sqlite(c) => c.simple(sql).await,
            ConnectionImpl::Postgres(c) => c.simple(sql).await,
            ConnectionImpl::Mysql(c) => c.simple(sql).await,
        }
    }

    async fn close(self) -> Result<()> {
        match self {
            ConnectionImpl::Sqlite(c) => c.close().await,
            ConnectionImpl::Postgres(c) => c.close().await,
            ConnectionImpl::Mysql(c) => c.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_impl_from_db_type() {
        let sqlite = DialectImpl::from_db_type("sqlite").unwrap();
        assert_eq!(sqlite.name(), "sqlite");

        let postgres = DialectImpl::from_db_type("postgres").unwrap();
        assert_eq!(postgres.name(), "postgresql");

        // Alternative names
        assert!(DialectImpl::from_db_type("pg").is_ok());
        assert_eq!(
            DialectImpl::from_db_type("MariaDB").unwrap().kind(),
            DialectKind::Mysql
        );

        // Unknown should error
        assert!(DialectImpl::from_db_type("mssql").is_err());
    }

    #[test]
    fn test_dialect_impl_dispatch() {
        let dialect = DialectImpl::for_kind(DialectKind::Postgresql);
        assert_eq!(dialect.quote_ident("table"), "\"table\"");
        assert_eq!(dialect.param_placeholder(1), "$1");
        assert!(dialect.transactional_writes());

        let dialect = DialectImpl::for_kind(DialectKind::Mysql);
        assert_eq!(dialect.quote_ident("table"), "`table`");
        assert_eq!(dialect.begin_statement(), "START TRANSACTION");

        let dialect = DialectImpl::for_kind(DialectKind::Sqlite);
        assert!(!dialect.transactional_writes());
    }

    #[test]
    fn test_dialect_kind_serde_aliases() {
        let kind: DialectKind = serde_json::from_str("\"postgres\"").unwrap();
        assert_eq!(kind, DialectKind::Postgresql);
        let kind: DialectKind = serde_json::from_str("\"sqlite3\"").unwrap();
        assert_eq!(kind, DialectKind::Sqlite);
        assert_eq!(serde_json::to_string(&DialectKind::Mysql).unwrap(), "\"mysql\"");
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(DialectKind::Postgresql.default_port(), Some(5432));
        assert_eq!(DialectKind::Mysql.default_port(), Some(3306));
        assert_eq!(DialectKind::Sqlite.default_port(), None);
        assert!(DialectKind::Sqlite.is_file_based());
    }
}
