//! SQLite SQL dialect (Strategy pattern).

use crate::core::schema::{ColumnDefault, ColumnSpec, ColumnType};
use crate::core::traits::{sql_literal, Dialect};
use crate::drivers::DialectKind;

/// SQLite dialect implementation.
///
/// Every canonical type except `Integer` is stored with TEXT affinity.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Create a new SQLite dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn column_type(&self, col: &ColumnSpec) -> String {
        match col.col_type {
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::Key | ColumnType::Text | ColumnType::Json | ColumnType::Timestamp => {
                "TEXT".to_string()
            }
        }
    }

    fn default_expr(&self, _col: &ColumnSpec, default: ColumnDefault) -> String {
        match default {
            ColumnDefault::Literal(v) => sql_literal(v),
            ColumnDefault::Int(i) => i.to_string(),
            ColumnDefault::CurrentTimestamp => "(strftime('%Y-%m-%dT%H:%M:%SZ','now'))".to_string(),
        }
    }

    fn introspect_query(&self) -> String {
        "SELECT name, type, \
                CASE WHEN \"notnull\" = 1 THEN 'NO' ELSE 'YES' END, \
                dflt_value, \
                CASE WHEN pk > 0 THEN '1' ELSE '0' END \
         FROM pragma_table_info(?) ORDER BY cid"
            .to_string()
    }

    fn text_expr(&self, column: &str) -> String {
        format!("CAST({} AS TEXT)", self.quote_ident(column))
    }

    /// Writes go statement by statement; see `orchestrator::migrate`.
    fn transactional_writes(&self) -> bool {
        false
    }

    fn build_upsert(
        &self,
        table: &str,
        columns: &[&str],
        pk_columns: &[&str],
        immutable: &[&str],
    ) -> String {
        let cols = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let conflict = pk_columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let updates: Vec<String> = columns
            .iter()
            .filter(|c| !pk_columns.contains(c) && !immutable.contains(c))
            .map(|c| format!("{} = excluded.{}", self.quote_ident(c), self.quote_ident(c)))
            .collect();

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) DO",
            self.quote_ident(table),
            cols,
            self.placeholders(columns.len()),
            conflict
        );
        if updates.is_empty() {
            sql.push_str(" NOTHING");
        } else {
            sql.push_str(" UPDATE SET ");
            sql.push_str(&updates.join(", "));
        }
        sql
    }

    fn build_insert_ignore(&self, table: &str, columns: &[&str]) -> String {
        let cols = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
            self.quote_ident(table),
            cols,
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
        let dialect = SqliteDialect::new();
        assert_eq!(dialect.quote_ident("name"), "\"name\"");
        assert_eq!(dialect.quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_upsert_skips_pk_and_immutable() {
        let dialect = SqliteDialect::new();
        let sql = dialect.build_upsert(
            "users",
            &["id", "username", "created_at"],
            &["id"],
            &["created_at"],
        );
        assert_eq!(
            sql,
            "INSERT INTO \"users\" (\"id\", \"username\", \"created_at\") VALUES (?, ?, ?) \
             ON CONFLICT(\"id\") DO UPDATE SET \"username\" = excluded.\"username\""
        );
    }

    #[test]
    fn test_upsert_with_only_key_does_nothing() {
        let dialect = SqliteDialect::new();
        let sql = dialect.build_upsert("t", &["id"], &["id"], &[]);
        assert!(sql.ends_with("DO NOTHING"));
    }

    #[test]
    fn test_insert_ignore() {
        let dialect = SqliteDialect::new();
        assert_eq!(
            dialect.build_insert_ignore("system_logs", &["id", "action"]),
            "INSERT OR IGNORE INTO \"system_logs\" (\"id\", \"action\") VALUES (?, ?)"
        );
    }

    #[test]
    fn test_create_table() {
        const SHAPE: TableShape = TableShape {
            name: "widgets",
            columns: &[
                ColumnSpec::new("id", ColumnType::Key).primary_key(),
                ColumnSpec::new("status", ColumnType::Key)
                    .default_value(ColumnDefault::Literal("idle")),
                ColumnSpec::new("created_at", ColumnType::Timestamp)
                    .default_value(ColumnDefault::CurrentTimestamp),
            ],
        };
        let sql = SqliteDialect::new().build_create_table(&SHAPE);
        assert!(sql.starts_with("CREATE TABLE \"widgets\" ("));
        assert!(sql.contains("\"id\" TEXT NOT NULL PRIMARY KEY"));
        assert!(sql.contains("\"status\" TEXT DEFAULT 'idle'"));
        assert!(sql.contains("DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))"));
    }

    #[test]
    fn test_not_transactional() {
        assert!(!SqliteDialect::new().transactional_writes());
    }

    #[test]
    fn test_keyed_statements() {
        let dialect = SqliteDialect::new();
        assert_eq!(
            dialect.build_update_by_key("integrations", &["status", "updated_at"], "id"),
            "UPDATE \"integrations\" SET \"status\" = ?, \"updated_at\" = ? WHERE \"id\" = ?"
        );
        assert_eq!(
            dialect.build_delete_where("test_sessions", "integration_id"),
            "DELETE FROM \"test_sessions\" WHERE \"integration_id\" = ?"
        );
        assert_eq!(
            dialect.build_select_text_by_key("users", &["id"], "id"),
            "SELECT CAST(\"id\" AS TEXT) FROM \"users\" WHERE \"id\" = ?"
        );
    }
}
