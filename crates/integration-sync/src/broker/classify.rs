//! Translate driver errors into [`ErrorKind`] and operator-facing messages.

use std::io;

use serde::{Deserialize, Serialize};
use tokio_postgres::error::SqlState;

use crate::config::IntegrationDescriptor;
use crate::drivers::DialectKind;
use crate::error::{ErrorKind, SyncError};

// SQLite primary result codes (extended codes are masked to these).
const SQLITE_CORRUPT: i32 = 11;
const SQLITE_CANTOPEN: i32 = 14;
const SQLITE_AUTH: i32 = 23;
const SQLITE_NOTADB: i32 = 26;

// MySQL server error numbers.
const ER_DBACCESS_DENIED_ERROR: u16 = 1044;
const ER_ACCESS_DENIED_ERROR: u16 = 1045;
const ER_BAD_DB_ERROR: u16 = 1049;
const ER_ACCESS_DENIED_NO_PASSWORD_ERROR: u16 = 1698;

/// Raw driver codes attached to a failed probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Symbolic or SQLSTATE code, when the driver reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Numeric driver error number, when the driver reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i64>,
}

fn sqlite_code(err: &sqlx::Error) -> Option<i32> {
    match err {
        sqlx::Error::Database(db) => db.code().and_then(|c| c.parse::<i32>().ok()),
        _ => None,
    }
}

pub fn sqlite_kind(err: &sqlx::Error) -> ErrorKind {
    match err {
        sqlx::Error::Database(_) => match sqlite_code(err).map(|c| c & 0xff) {
            Some(SQLITE_NOTADB) | Some(SQLITE_CORRUPT) => ErrorKind::MalformedFile,
            Some(SQLITE_CANTOPEN) => ErrorKind::DatabaseMissing,
            Some(SQLITE_AUTH) => ErrorKind::AuthError,
            _ => ErrorKind::Unknown,
        },
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => ErrorKind::ConnectivityError,
        _ => ErrorKind::Unknown,
    }
}

pub fn postgres_kind(err: &tokio_postgres::Error) -> ErrorKind {
    if let Some(db) = err.as_db_error() {
        let code = db.code();
        return if *code == SqlState::INVALID_PASSWORD
            || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION
        {
            ErrorKind::AuthError
        } else if *code == SqlState::INVALID_CATALOG_NAME {
            ErrorKind::DatabaseMissing
        } else if code.code().starts_with("08") {
            ErrorKind::ConnectivityError
        } else {
            ErrorKind::Unknown
        };
    }

    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if inner.is::<io::Error>() {
            return ErrorKind::ConnectivityError;
        }
        source = inner.source();
    }

    if err.is_closed() || err.to_string().contains("timeout") {
        ErrorKind::ConnectivityError
    } else {
        ErrorKind::Unknown
    }
}

pub fn mysql_kind(err: &mysql_async::Error) -> ErrorKind {
    match err {
        mysql_async::Error::Server(server) => match server.code {
            ER_ACCESS_DENIED_ERROR | ER_DBACCESS_DENIED_ERROR | ER_ACCESS_DENIED_NO_PASSWORD_ERROR => {
                ErrorKind::AuthError
            }
            ER_BAD_DB_ERROR => ErrorKind::DatabaseMissing,
            _ => ErrorKind::Unknown,
        },
        mysql_async::Error::Io(_) => ErrorKind::ConnectivityError,
        mysql_async::Error::Driver(mysql_async::DriverError::ConnectionClosed) => {
            ErrorKind::ConnectivityError
        }
        _ => ErrorKind::Unknown,
    }
}

/// Driver codes for the innermost driver error of `err`, if any.
pub fn error_details(err: &SyncError) -> Option<ErrorDetails> {
    match err {
        SyncError::Sqlite(e) => sqlite_code(e).map(|c| ErrorDetails {
            code: Some(format!("SQLITE_{}", c)),
            errno: Some(i64::from(c)),
        }),
        SyncError::Postgres(e) => e.as_db_error().map(|db| ErrorDetails {
            code: Some(db.code().code().to_string()),
            errno: None,
        }),
        SyncError::Mysql(mysql_async::Error::Server(server)) => Some(ErrorDetails {
            code: Some(server.state.clone()),
            errno: Some(i64::from(server.code)),
        }),
        SyncError::Mysql(mysql_async::Error::Io(mysql_async::IoError::Io(io))) => {
            Some(ErrorDetails {
                code: Some(format!("{:?}", io.kind())),
                errno: io.raw_os_error().map(i64::from),
            })
        }
        SyncError::Write { source, .. }
        | SyncError::Transaction(source)
        | SyncError::PartialWrite { source, .. } => error_details(source),
        _ => None,
    }
}

/// Short dialect-aware explanation of a connection failure.
pub fn failure_message(descriptor: &IntegrationDescriptor, err: &SyncError) -> String {
    let engine = engine_name(descriptor.dialect);
    match err.kind() {
        ErrorKind::AuthError => format!(
            "Authentication failed for user '{}' on {} at {}",
            descriptor.username.as_deref().unwrap_or(""),
            engine,
            descriptor.address()
        ),
        ErrorKind::DatabaseMissing if descriptor.dialect.is_file_based() => format!(
            "Cannot create {} database file {}: its directory does not exist or is not writable",
            engine, descriptor.database
        ),
        ErrorKind::DatabaseMissing => format!(
            "Database '{}' does not exist on {} server {}",
            descriptor.database,
            engine,
            descriptor.host_or_default()
        ),
        ErrorKind::ConnectivityError if timed_out(err) => format!(
            "Timed out connecting to {} server at {}",
            engine,
            descriptor.address()
        ),
        ErrorKind::ConnectivityError => format!(
            "Cannot reach {} server at {}",
            engine,
            descriptor.address()
        ),
        ErrorKind::MalformedFile => format!(
            "{} exists but is not a valid {} database",
            descriptor.database, engine
        ),
        ErrorKind::ConfigError => format!("Invalid {} connection settings: {}", engine, err),
        _ => format!("Connection to {} failed: {}", engine, err),
    }
}

fn timed_out(err: &SyncError) -> bool {
    match err {
        SyncError::Timeout { .. } => true,
        SyncError::Sqlite(sqlx::Error::PoolTimedOut) => true,
        SyncError::Sqlite(sqlx::Error::Io(io))
        | SyncError::Mysql(mysql_async::Error::Io(mysql_async::IoError::Io(io))) => {
            io.kind() == io::ErrorKind::TimedOut
        }
        _ => false,
    }
}

/// Message for a successful probe.
pub fn success_message(descriptor: &IntegrationDescriptor, created: bool) -> String {
    let engine = engine_name(descriptor.dialect);
    if created {
        format!("Created new {} database at {}", engine, descriptor.address())
    } else {
        format!("Connected to {} database at {}", engine, descriptor.address())
    }
}

fn engine_name(kind: DialectKind) -> &'static str {
    match kind {
        DialectKind::Sqlite => "SQLite",
        DialectKind::Postgresql => "PostgreSQL",
        DialectKind::Mysql => "MySQL",
    }
}
