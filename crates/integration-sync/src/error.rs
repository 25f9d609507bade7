//! Error types for the integration sync library.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operator-facing error taxonomy.
///
/// Every failure the core reports is mapped onto one of these kinds so that
/// callers can react (retry, prompt for credentials, show the backup table)
/// without parsing driver messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Host unreachable, connection refused, DNS failure, dropped socket,
    /// or no answer within the connect timeout.
    ConnectivityError,
    /// Bad credentials or insufficient privileges.
    AuthError,
    /// The named database (or the directory of a database file) does not exist.
    DatabaseMissing,
    /// The target file exists but is not a usable database.
    MalformedFile,
    /// A live table does not match its required shape.
    SchemaDriftError,
    /// A statement failed inside a transaction; the transaction was rolled back.
    TransactionFailure,
    /// A statement failed on a dialect without an enclosing transaction;
    /// earlier statements stay committed.
    PartialWriteRisk,
    /// Invalid descriptor or configuration.
    ConfigError,
    /// Anything the classifier does not recognise.
    Unknown,
}

impl ErrorKind {
    /// Process exit code: 2 for configuration problems, 3 when the target
    /// could not be reached or opened, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            ErrorKind::ConfigError => 2,
            ErrorKind::ConnectivityError
            | ErrorKind::AuthError
            | ErrorKind::DatabaseMissing
            | ErrorKind::MalformedFile => 3,
            _ => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectivityError => "ConnectivityError",
            ErrorKind::AuthError => "AuthError",
            ErrorKind::DatabaseMissing => "DatabaseMissing",
            ErrorKind::MalformedFile => "MalformedFile",
            ErrorKind::SchemaDriftError => "SchemaDriftError",
            ErrorKind::TransactionFailure => "TransactionFailure",
            ErrorKind::PartialWriteRisk => "PartialWriteRisk",
            ErrorKind::ConfigError => "ConfigError",
            ErrorKind::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for broker, reconciler and orchestrator operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (invalid YAML, missing descriptor fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// SQLite driver error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// PostgreSQL driver error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// MySQL driver error
    #[error("MySQL error: {0}")]
    Mysql(#[from] mysql_async::Error),

    /// Connecting did not finish within the configured timeout
    #[error("Connection to {target} timed out after {}s", .after.as_secs())]
    Timeout { target: String, after: Duration },

    /// An operation was attempted on a handle that has been closed
    #[error("Connection handle for {0} is closed")]
    Closed(String),

    /// Live schema differs from the required shape and could not be repaired
    #[error("Schema drift on table {table}: {message}")]
    SchemaDrift { table: String, message: String },

    /// A unit of work failed and its transaction was rolled back
    #[error("Transaction rolled back: {0}")]
    Transaction(Box<SyncError>),

    /// A write failed on a dialect without an enclosing transaction
    #[error(
        "Write to {table} failed after {written} rows were already committed \
         (no enclosing transaction on this dialect): {source}"
    )]
    PartialWrite {
        table: String,
        written: usize,
        #[source]
        source: Box<SyncError>,
    },

    /// Writing a single record failed
    #[error("Write failed for {table} record {id}: {source}")]
    Write {
        table: String,
        id: String,
        #[source]
        source: Box<SyncError>,
    },

    /// A row could not be decoded into an entity
    #[error("Cannot decode row from {table}: {message}")]
    Decode { table: String, message: String },

    /// A referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A background job panicked or was cancelled
    #[error("Background job failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl SyncError {
    /// Create a SchemaDrift error
    pub fn drift(table: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::SchemaDrift {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Decode error
    pub fn decode(table: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Decode {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Wrap a statement error with the record it was writing
    pub fn write(table: impl Into<String>, id: impl Into<String>, source: SyncError) -> Self {
        SyncError::Write {
            table: table.into(),
            id: id.into(),
            source: Box::new(source),
        }
    }

    /// Classify this error into the operator-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Config(_) | SyncError::Yaml(_) => ErrorKind::ConfigError,
            SyncError::Sqlite(e) => crate::broker::classify::sqlite_kind(e),
            SyncError::Postgres(e) => crate::broker::classify::postgres_kind(e),
            SyncError::Mysql(e) => crate::broker::classify::mysql_kind(e),
            SyncError::Timeout { .. } | SyncError::Closed(_) => ErrorKind::ConnectivityError,
            SyncError::SchemaDrift { .. } => ErrorKind::SchemaDriftError,
            SyncError::Transaction(_) => ErrorKind::TransactionFailure,
            SyncError::PartialWrite { .. } => ErrorKind::PartialWriteRisk,
            SyncError::Write { source, .. } => source.kind(),
            _ => ErrorKind::Unknown,
        }
    }

    /// Exit code used by the command-line front end.
    pub fn exit_code(&self) -> u8 {
        self.kind().exit_code()
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
