//! MySQL/MariaDB SQL dialect (Strategy pattern).
//!
//! Provides MySQL-specific SQL syntax for identifier quoting, DDL,
//! upserts and catalog introspection.

use crate::core::schema::{ColumnDefault, ColumnSpec, ColumnType};
use crate::core::traits::{sql_literal, Dialect};
use crate::drivers::DialectKind;

const INTROSPECT_SQL: &str = "SELECT CAST(COLUMN_NAME AS CHAR), \
        CAST(COLUMN_TYPE AS CHAR), \
        CAST(IS_NULLABLE AS CHAR), \
        CAST(COLUMN_DEFAULT AS CHAR), \
        CASE WHEN COLUMN_KEY = 'PRI' THEN '1' ELSE '0' END \
 FROM INFORMATION_SCHEMA.COLUMNS \
 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
 ORDER BY ORDINAL_POSITION";

/// MySQL/MariaDB dialect implementation.
///
/// Implements the Strategy pattern for SQL syntax differences.
/// Expression defaults on TEXT columns need MySQL 8.0.13+ or MariaDB 10.2+.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Mysql
    }

    fn quote_ident(&self, name: &str) -> String {
        // MySQL uses backticks for identifier quoting
        // Handle names that contain backticks by doubling them
        format!("`{}`", name.replace('`', "``"))
    }

    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn column_type(&self, col: &ColumnSpec) -> String {
        match col.col_type {
            ColumnType::Key => "VARCHAR(255)",
            ColumnType::Text => "TEXT",
            ColumnType::Json => "LONGTEXT",
            ColumnType::Timestamp => "VARCHAR(64)",
            ColumnType::Integer => "BIGINT",
        }
        .to_string()
    }

    fn default_expr(&self, col: &ColumnSpec, default: ColumnDefault) -> String {
        match default {
            // BLOB/TEXT columns only accept parenthesized expression defaults
            ColumnDefault::Literal(v) => match col.col_type {
                ColumnType::Text | ColumnType::Json => format!("({})", sql_literal(v)),
                _ => sql_literal(v),
            },
            ColumnDefault::Int(i) => i.to_string(),
            ColumnDefault::CurrentTimestamp => {
                "(DATE_FORMAT(UTC_TIMESTAMP(), '%Y-%m-%dT%H:%i:%sZ'))".to_string()
            }
        }
    }

    fn introspect_query(&self) -> String {
        INTROSPECT_SQL.to_string()
    }

    fn text_expr(&self, column: &str) -> String {
        format!("CAST({} AS CHAR)", self.quote_ident(column))
    }

    fn begin_statement(&self) -> &'static str {
        "START TRANSACTION"
    }

    fn table_options(&self) -> &'static str {
        " ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
    }

    fn build_upsert(
        &self,
        table: &str,
        columns: &[&str],
        pk_columns: &[&str],
        immutable: &[&str],
    ) -> String {
        // MySQL uses INSERT ... ON DUPLICATE KEY UPDATE
        // This requires that the target table has a PRIMARY KEY or UNIQUE index
        let update_cols: Vec<_> = columns
            .iter()
            .filter(|c| !pk_columns.contains(c) && !immutable.contains(c))
            .collect();

        if update_cols.is_empty() {
            // If only PK columns, use INSERT IGNORE to skip duplicates
            return self.build_insert_ignore(table, columns);
        }

        let insert_cols = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let update_set = update_cols
            .iter()
            .map(|c| format!("{} = VALUES({})", self.quote_ident(c), self.quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON DUPLICATE KEY UPDATE {}",
            self.quote_ident(table),
            insert_cols,
            self.placeholders(columns.len()),
            update_set
        )
    }

    fn build_insert_ignore(&self, table: &str, columns: &[&str]) -> String {
        let insert_cols = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT IGNORE INTO {} ({}) VALUES ({})",
            self.quote_ident(table),
            insert_cols,
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
        let dialect = MysqlDialect::new();
        assert_eq!(dialect.quote_ident("name"), "`name`");
        assert_eq!(dialect.quote_ident("table`name"), "`table``name`");
        assert_eq!(dialect.quote_ident("Users"), "`Users`");
    }

    #[test]
    fn test_param_placeholder() {
        let dialect = MysqlDialect::new();
        assert_eq!(dialect.param_placeholder(1), "?");
        assert_eq!(dialect.placeholders(3), "?, ?, ?");
    }

    #[test]
    fn test_build_upsert() {
        let dialect = MysqlDialect::new();
        let sql = dialect.build_upsert(
            "users",
            &["id", "username", "created_at"],
            &["id"],
            &["created_at"],
        );
        assert_eq!(
            sql,
            "INSERT INTO `users` (`id`, `username`, `created_at`) VALUES (?, ?, ?) \
             ON DUPLICATE KEY UPDATE `username` = VALUES(`username`)"
        );
    }

    #[test]
    fn test_build_upsert_pk_only_falls_back_to_ignore() {
        let dialect = MysqlDialect::new();
        let sql = dialect.build_upsert("t", &["id"], &["id"], &[]);
        assert_eq!(sql, "INSERT IGNORE INTO `t` (`id`) VALUES (?)");
    }

    #[test]
    fn test_create_table_defaults_and_engine() {
        const SHAPE: TableShape = TableShape {
            name: "integrations",
            columns: &[
                ColumnSpec::new("id", ColumnType::Key).primary_key(),
                ColumnSpec::new("status", ColumnType::Key)
                    .default_value(ColumnDefault::Literal("disconnected")),
                ColumnSpec::new("config", ColumnType::Json)
                    .default_value(ColumnDefault::Literal("{}")),
                ColumnSpec::new("created_at", ColumnType::Timestamp)
                    .default_value(ColumnDefault::CurrentTimestamp),
            ],
        };
        let sql = MysqlDialect::new().build_create_table(&SHAPE);
        assert!(sql.contains("`status` VARCHAR(255) DEFAULT 'disconnected'"));
        assert!(sql.contains("`config` LONGTEXT DEFAULT ('{}')"));
        assert!(sql.contains("DEFAULT (DATE_FORMAT(UTC_TIMESTAMP()"));
        assert!(sql.ends_with(") ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"));
    }

    #[test]
    fn test_begin_statement() {
        assert_eq!(MysqlDialect::new().begin_statement(), "START TRANSACTION");
    }
}
