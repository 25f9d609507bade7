//! Required table shapes and live column metadata.
//!
//! A [`TableShape`] is the statically known layout a table must have; a
//! [`LiveColumn`] is what dialect introspection reports for a table that
//! already exists. The reconciler diffs one against the other.

use serde::{Deserialize, Serialize};

/// Dialect-neutral column type.
///
/// Each dialect maps these onto concrete DDL types (see
/// [`Dialect::column_type`](crate::core::Dialect::column_type)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Short indexable string: identifiers, enum tags, unique names.
    Key,
    /// Unbounded free text.
    Text,
    /// Serialized JSON document.
    Json,
    /// ISO-8601 timestamp stored as text.
    Timestamp,
    /// 64-bit integer.
    Integer,
}

/// Declared column default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnDefault {
    /// A string literal (unquoted here; dialects quote it).
    Literal(&'static str),
    /// An integer literal.
    Int(i64),
    /// The current UTC time rendered as ISO-8601 text.
    CurrentTimestamp,
}

/// One column of a required table shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub col_type: ColumnType,
    pub nullable: bool,
    pub default: Option<ColumnDefault>,
    pub primary_key: bool,
    pub unique: bool,
}

impl ColumnSpec {
    /// A nullable column with no default.
    pub const fn new(name: &'static str, col_type: ColumnType) -> Self {
        Self {
            name,
            col_type,
            nullable: true,
            default: None,
            primary_key: false,
            unique: false,
        }
    }

    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn default_value(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    /// Whether the column carries a declared default.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

/// Statically known required layout of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableShape {
    pub name: &'static str,
    pub columns: &'static [ColumnSpec],
}

impl TableShape {
    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    /// Primary key column names.
    pub fn primary_key(&self) -> Vec<&'static str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name)
            .collect()
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Column metadata reported by live introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveColumn {
    /// Column name as stored.
    pub name: String,
    /// Declared type exactly as the engine reports it (e.g. `varchar(255)`).
    pub data_type: String,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Default expression text, if any.
    pub default: Option<String>,
    /// Whether the column is part of the primary key.
    pub primary_key: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHAPE: TableShape = TableShape {
        name: "widgets",
        columns: &[
            ColumnSpec::new("id", ColumnType::Key).primary_key(),
            ColumnSpec::new("label", ColumnType::Key).not_null().unique(),
            ColumnSpec::new("payload", ColumnType::Json)
                .default_value(ColumnDefault::Literal("{}")),
        ],
    };

    #[test]
    fn test_builder_flags() {
        let id = SHAPE.column("id").unwrap();
        assert!(id.primary_key);
        assert!(!id.nullable);

        let label = SHAPE.column("label").unwrap();
        assert!(label.unique);
        assert!(!label.has_default());

        assert!(SHAPE.column("payload").unwrap().has_default());
    }

    #[test]
    fn test_column_names_and_pk() {
        assert_eq!(SHAPE.column_names(), vec!["id", "label", "payload"]);
        assert_eq!(SHAPE.primary_key(), vec!["id"]);
        assert!(SHAPE.column("missing").is_none());
    }
}
