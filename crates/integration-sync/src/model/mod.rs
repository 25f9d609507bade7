//! Data model: the five entities, their table shapes and the snapshot that
//! carries them between stores.

mod entities;
pub mod shapes;

use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use entities::{
    Environment, Integration, IntegrationStatus, IntegrationType, SessionStatus, SystemLog,
    TestSession, User, UserRole,
};

use crate::core::schema::TableShape;
use crate::core::value::{Row, SqlValue};
use crate::error::{Result, SyncError};

/// How records of an entity are written to a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Insert, or update non-key columns when the key exists.
    Upsert,
    /// Insert, or skip silently when the key exists.
    InsertIgnore,
}

/// A persisted record type with a fixed table shape.
///
/// `to_row` and `from_row` both use the column order of `SHAPE`.
pub trait Entity: Sized + Send + Sync {
    const SHAPE: &'static TableShape;
    const WRITE_MODE: WriteMode = WriteMode::Upsert;

    fn id(&self) -> &str;

    fn to_row(&self) -> Result<Row>;

    fn from_row(row: Row) -> Result<Self>;
}

/// Current UTC time as ISO-8601 text with second precision.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Sequential reader over one decoded row.
pub(crate) struct RowReader {
    table: &'static str,
    fields: std::vec::IntoIter<SqlValue>,
}

impl RowReader {
    pub(crate) fn new(table: &'static str, row: Row) -> Self {
        Self {
            table,
            fields: row.into_iter(),
        }
    }

    pub(crate) fn optional(&mut self) -> Option<String> {
        self.fields.next().and_then(SqlValue::into_text)
    }

    pub(crate) fn required(&mut self, column: &str) -> Result<String> {
        self.optional()
            .ok_or_else(|| SyncError::decode(self.table, format!("{} is NULL", column)))
    }

    /// Parse an enum-like text column; NULL yields `default`.
    pub(crate) fn parse<T: FromStr<Err = String>>(&mut self, column: &str, default: T) -> Result<T> {
        match self.optional() {
            Some(text) => text
                .parse()
                .map_err(|e| SyncError::decode(self.table, format!("{}: {}", column, e))),
            None => Ok(default),
        }
    }

    /// Deserialize a JSON text column; NULL or empty text yields `default`.
    pub(crate) fn json(&mut self, column: &str, default: Value) -> Result<Value> {
        match self.optional() {
            Some(text) if !text.trim().is_empty() => serde_json::from_str(&text)
                .map_err(|e| SyncError::decode(self.table, format!("{}: {}", column, e))),
            _ => Ok(default),
        }
    }
}

/// In-memory copy of every record in a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub integrations: Vec<Integration>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub test_sessions: Vec<TestSession>,
    #[serde(default)]
    pub system_logs: Vec<SystemLog>,
    #[serde(default)]
    pub environments: Vec<Environment>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Total number of records across all entities.
    pub fn total(&self) -> usize {
        self.counts().total()
    }

    pub fn counts(&self) -> EntityCounts {
        EntityCounts {
            integrations: self.integrations.len(),
            test_sessions: self.test_sessions.len(),
            users: self.users.len(),
            system_logs: self.system_logs.len(),
            environments: self.environments.len(),
        }
    }
}

/// Per-entity record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    pub integrations: usize,
    pub test_sessions: usize,
    pub users: usize,
    pub system_logs: usize,
    pub environments: usize,
}

impl EntityCounts {
    pub fn total(&self) -> usize {
        self.integrations + self.test_sessions + self.users + self.system_logs + self.environments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_counts() {
        let mut snapshot = Snapshot::default();
        assert!(snapshot.is_empty());

        snapshot
            .system_logs
            .push(SystemLog::new("boot", None, json!({})));
        snapshot
            .users
            .push(User::new("a", "b", None, UserRole::RegularUser));
        assert_eq!(snapshot.total(), 2);
        assert_eq!(snapshot.counts().system_logs, 1);
    }

    #[test]
    fn test_snapshot_deserializes_partial_json() {
        let snapshot: Snapshot = serde_json::from_str(r#"{"users": []}"#).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_now_iso_format() {
        let now = now_iso();
        assert_eq!(now.len(), "2024-01-01T00:00:00Z".len());
        assert!(now.ends_with('Z'));
    }

    #[test]
    fn test_row_reader_errors_name_column() {
        let mut reader = RowReader::new("users", vec![SqlValue::Null]);
        let err = reader.required("username").unwrap_err();
        assert!(err.to_string().contains("username is NULL"));
    }
}
