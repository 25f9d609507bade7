//! Column-level diff between a live table and its required shape.
//!
//! Type comparison is deliberately loose: both sides are reduced to a
//! family token and compared by prefix, so `VARCHAR(255)`, `character
//! varying` and `TEXT` all agree.

use serde::{Deserialize, Serialize};

use crate::core::schema::{LiveColumn, TableShape};
use crate::core::traits::Dialect;

/// How one required column differs from the live table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnDrift {
    /// No live column with this name.
    Missing { column: String },
    /// The live column's type family differs from the required one.
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },
}

impl ColumnDrift {
    pub fn column(&self) -> &str {
        match self {
            ColumnDrift::Missing { column } | ColumnDrift::TypeMismatch { column, .. } => column,
        }
    }
}

/// Reduce a declared type to a lowercase family token.
pub fn normalize_type(declared: &str) -> String {
    let lower = declared.trim().to_lowercase();
    let base = lower.split('(').next().unwrap_or_default().trim();

    match base {
        "text" | "tinytext" | "mediumtext" | "longtext" | "varchar" | "character varying"
        | "char" | "character" | "nvarchar" | "nchar" | "bpchar" | "string" | "clob" => {
            "text".to_string()
        }
        "int" | "integer" | "bigint" | "smallint" | "tinyint" | "mediumint" | "int2" | "int4"
        | "int8" | "serial" | "bigserial" => "integer".to_string(),
        "json" | "jsonb" => "json".to_string(),
        "datetime" | "timestamptz" => "timestamp".to_string(),
        other if other.starts_with("timestamp") => "timestamp".to_string(),
        other if other.ends_with(" unsigned") => normalize_type(other.trim_end_matches(" unsigned")),
        other => other.to_string(),
    }
}

/// Loose type equality: either normalized token prefixes the other.
pub fn types_match(live: &str, required: &str) -> bool {
    let live = normalize_type(live);
    let required = normalize_type(required);
    live.starts_with(&required) || required.starts_with(&live)
}

/// Every required column that is missing or mismatched in `live`.
///
/// Extra live columns are not drift.
pub fn diff_columns<D: Dialect + ?Sized>(
    dialect: &D,
    shape: &TableShape,
    live: &[LiveColumn],
) -> Vec<ColumnDrift> {
    shape
        .columns
        .iter()
        .filter_map(|spec| {
            let required = dialect.column_type(spec);
            match live.iter().find(|c| c.name.eq_ignore_ascii_case(spec.name)) {
                None => Some(ColumnDrift::Missing {
                    column: spec.name.to_string(),
                }),
                Some(col) if !types_match(&col.data_type, &required) => {
                    Some(ColumnDrift::TypeMismatch {
                        column: spec.name.to_string(),
                        expected: required,
                        actual: col.data_type.clone(),
                    })
                }
                Some(_) => None,
            }
        })
        .collect()
}

/// Required columns that also exist live, in shape order.
pub fn common_columns(shape: &TableShape, live: &[LiveColumn]) -> Vec<&'static str> {
    shape
        .columns
        .iter()
        .filter(|spec| live.iter().any(|c| c.name.eq_ignore_ascii_case(spec.name)))
        .map(|spec| spec.name)
        .collect()
}
