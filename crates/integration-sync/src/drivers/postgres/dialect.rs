//! PostgreSQL SQL dialect (Strategy pattern).
//!
//! Provides PostgreSQL-specific SQL syntax for identifier quoting, DDL,
//! upserts and catalog introspection.

use crate::core::schema::{ColumnDefault, ColumnSpec, ColumnType};
use crate::core::traits::{sql_literal, Dialect};
use crate::drivers::DialectKind;

/// Columns of one table in the current schema, with primary key membership.
const INTROSPECT_SQL: &str = r#"SELECT c.column_name::text,
       c.data_type::text,
       c.is_nullable::text,
       c.column_default::text,
       CASE WHEN EXISTS (
           SELECT 1
           FROM information_schema.table_constraints tc
           JOIN information_schema.key_column_usage k
             ON tc.constraint_name = k.constraint_name
            AND tc.table_schema = k.table_schema
            AND tc.table_name = k.table_name
           WHERE tc.constraint_type = 'PRIMARY KEY'
             AND tc.table_schema = c.table_schema
             AND tc.table_name = c.table_name
             AND k.column_name = c.column_name
       ) THEN '1' ELSE '0' END
FROM information_schema.columns c
WHERE c.table_schema = current_schema()
  AND c.table_name::text = $1
ORDER BY c.ordinal_position"#;

/// PostgreSQL dialect implementation.
///
/// Implements the Strategy pattern for SQL syntax differences.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgresql"
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Postgresql
    }

    fn quote_ident(&self, name: &str) -> String {
        // PostgreSQL uses double quotes for identifier quoting
        // Handle names that contain double quotes by doubling them
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn param_placeholder(&self, index: usize) -> String {
        // PostgreSQL uses $1, $2, etc. (1-based)
        format!("${}", index)
    }

    fn column_type(&self, col: &ColumnSpec) -> String {
        match col.col_type {
            ColumnType::Key => "VARCHAR(255)",
            ColumnType::Text | ColumnType::Json => "TEXT",
            ColumnType::Timestamp => "VARCHAR(64)",
            ColumnType::Integer => "BIGINT",
        }
        .to_string()
    }

    fn default_expr(&self, _col: &ColumnSpec, default: ColumnDefault) -> String {
        match default {
            ColumnDefault::Literal(v) => sql_literal(v),
            ColumnDefault::Int(i) => i.to_string(),
            ColumnDefault::CurrentTimestamp => {
                "to_char(now() AT TIME ZONE 'UTC', 'YYYY-MM-DD\"T\"HH24:MI:SS\"Z\"')".to_string()
            }
        }
    }

    fn introspect_query(&self) -> String {
        INTROSPECT_SQL.to_string()
    }

    fn text_expr(&self, column: &str) -> String {
        format!("{}::text", self.quote_ident(column))
    }

    fn build_upsert(
        &self,
        table: &str,
        columns: &[&str],
        pk_columns: &[&str],
        immutable: &[&str],
    ) -> String {
        // PostgreSQL uses INSERT ... ON CONFLICT for upsert operations
        let quoted_cols = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let conflict_cols = pk_columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let update_cols: Vec<_> = columns
            .iter()
            .filter(|c| !pk_columns.contains(c) && !immutable.contains(c))
            .collect();

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO",
            self.quote_ident(table),
            quoted_cols,
            self.placeholders(columns.len()),
            conflict_cols
        );

        if update_cols.is_empty() {
            // No non-PK columns to update - just ignore duplicates
            sql.push_str(" NOTHING");
        } else {
            let update_set = update_cols
                .iter()
                .map(|c| format!("{} = EXCLUDED.{}", self.quote_ident(c), self.quote_ident(c)))
                .collect::<Vec<_>>()
                .join(", ");

            sql.push_str(&format!(" UPDATE SET {}", update_set));
        }

        sql
    }

    fn build_insert_ignore(&self, table: &str, columns: &[&str]) -> String {
        let quoted_cols = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
            self.quote_ident(table),
            quoted_cols,
            self.placeholders(columns.len())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::TableShape;

    #[test]
    fn test_quote_ident() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.quote_ident("name"), "\"name\"");
        assert_eq!(dialect.quote_ident("table\"name"), "\"table\"\"name\"");
        assert_eq!(dialect.quote_ident("Users"), "\"Users\"");
    }

    #[test]
    fn test_param_placeholder() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.param_placeholder(1), "$1");
        assert_eq!(dialect.param_placeholder(10), "$10");
        assert_eq!(dialect.placeholders(3), "$1, $2, $3");
    }

    #[test]
    fn test_build_upsert() {
        let dialect = PostgresDialect::new();
        let sql = dialect.build_upsert(
            "integrations",
            &["id", "name", "created_at"],
            &["id"],
            &["created_at"],
        );
        assert_eq!(
            sql,
            "INSERT INTO \"integrations\" (\"id\", \"name\", \"created_at\") VALUES ($1, $2, $3) \
             ON CONFLICT (\"id\") DO UPDATE SET \"name\" = EXCLUDED.\"name\""
        );
    }

    #[test]
    fn test_build_insert_ignore() {
        let dialect = PostgresDialect::new();
        let sql = dialect.build_insert_ignore("system_logs", &["id", "action"]);
        assert!(sql.ends_with("VALUES ($1, $2) ON CONFLICT DO NOTHING"));
    }

    #[test]
    fn test_create_table_types() {
        const SHAPE: TableShape = TableShape {
            name: "users",
            columns: &[
                ColumnSpec::new("id", ColumnType::Key).primary_key(),
                ColumnSpec::new("username", ColumnType::Key).not_null().unique(),
                ColumnSpec::new("profile", ColumnType::Json)
                    .default_value(ColumnDefault::Literal("{}")),
                ColumnSpec::new("created_at", ColumnType::Timestamp)
                    .default_value(ColumnDefault::CurrentTimestamp),
            ],
        };
        let sql = PostgresDialect::new().build_create_table(&SHAPE);
        assert!(sql.contains("\"id\" VARCHAR(255) NOT NULL PRIMARY KEY"));
        assert!(sql.contains("\"username\" VARCHAR(255) NOT NULL UNIQUE"));
        assert!(sql.contains("\"profile\" TEXT DEFAULT '{}'"));
        assert!(sql.contains("\"created_at\" VARCHAR(64) DEFAULT to_char(now()"));
        assert!(sql.ends_with(')'));
    }

    #[test]
    fn test_introspection_binds_table_name_as_text() {
        let sql = PostgresDialect::new().introspect_query();
        assert!(sql.contains("table_name::text = $1"));
        assert!(sql.contains("current_schema()"));
    }

    #[test]
    fn test_text_expr() {
        assert_eq!(PostgresDialect::new().text_expr("config"), "\"config\"::text");
    }
}
