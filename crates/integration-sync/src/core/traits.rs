//! Core traits for dialect-agnostic schema reconciliation and data copying.
//!
//! - [`Dialect`]: SQL syntax strategy for one database engine
//! - [`Connection`]: one open driver connection (statement, query, close)
//! - [`UnitOfWork`]: a block of statements run against a [`Handle`]
//!
//! # Design Patterns
//!
//! - **Strategy**: `Dialect` provides interchangeable SQL generation
//! - **Template Method**: default `Dialect` methods build DDL/DML skeletons
//!   from the few per-dialect primitives

use async_trait::async_trait;

use crate::broker::Handle;
use crate::drivers::DialectKind;
use crate::error::Result;

use super::schema::{ColumnDefault, ColumnSpec, TableShape};
use super::value::{Row, SqlValue};

/// SQL syntax strategy for different database engines.
///
/// Selected once at connect time and carried by the [`Handle`]; nothing
/// downstream branches on the dialect name.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g., "sqlite", "postgresql").
    fn name(&self) -> &str;

    /// Which engine this dialect targets.
    fn kind(&self) -> DialectKind;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_ident(&self, name: &str) -> String;

    /// Get a parameter placeholder for the given 1-based index.
    fn param_placeholder(&self, index: usize) -> String;

    /// Concrete DDL type for a canonical column type.
    fn column_type(&self, col: &ColumnSpec) -> String;

    /// Render a declared default as a DDL expression.
    fn default_expr(&self, col: &ColumnSpec, default: ColumnDefault) -> String;

    /// Introspection query returning one row per column of the table named
    /// by the single bound parameter: `(name, type, nullable 'YES'/'NO',
    /// default, pk '1'/'0')`, all as text, in ordinal order. A table that
    /// does not exist yields zero rows.
    fn introspect_query(&self) -> String;

    /// Expression that selects a column as text (used for exports).
    fn text_expr(&self, column: &str) -> String;

    /// Statement that opens a transaction.
    fn begin_statement(&self) -> &'static str {
        "BEGIN"
    }

    /// Whether snapshot writes are wrapped in a single transaction.
    ///
    /// Dialects that return `false` write statement by statement: a failure
    /// part way through leaves earlier rows committed.
    fn transactional_writes(&self) -> bool {
        true
    }

    /// Trailing table options appended after the column list.
    fn table_options(&self) -> &'static str {
        ""
    }

    /// Build an upsert keyed on `pk_columns`; `immutable` columns are
    /// written on insert but never overwritten on conflict.
    fn build_upsert(
        &self,
        table: &str,
        columns: &[&str],
        pk_columns: &[&str],
        immutable: &[&str],
    ) -> String;

    /// Build an insert that silently skips rows whose key already exists.
    fn build_insert_ignore(&self, table: &str, columns: &[&str]) -> String;

    /// Render one column definition for CREATE TABLE.
    fn column_definition(&self, col: &ColumnSpec) -> String {
        let mut def = format!("{} {}", self.quote_ident(col.name), self.column_type(col));
        if !col.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = col.default {
            def.push_str(" DEFAULT ");
            def.push_str(&self.default_expr(col, default));
        }
        if col.primary_key {
            def.push_str(" PRIMARY KEY");
        }
        if col.unique {
            def.push_str(" UNIQUE");
        }
        def
    }

    /// Build CREATE TABLE for a required shape.
    fn build_create_table(&self, shape: &TableShape) -> String {
        let col_defs: Vec<String> = shape
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();

        format!(
            "CREATE TABLE {} (\n    {}\n){}",
            self.quote_ident(shape.name),
            col_defs.join(",\n    "),
            self.table_options()
        )
    }

    /// Build a full-copy backup of `table` into `backup`.
    fn build_backup(&self, table: &str, backup: &str) -> String {
        format!(
            "CREATE TABLE {} AS SELECT * FROM {}",
            self.quote_ident(backup),
            self.quote_ident(table)
        )
    }

    fn build_drop_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote_ident(table))
    }

    /// Build a bulk copy of `columns` from `source` into `target`.
    fn build_copy(&self, source: &str, target: &str, columns: &[&str]) -> String {
        let cols = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            self.quote_ident(target),
            cols,
            cols,
            self.quote_ident(source)
        )
    }

    fn build_delete_all(&self, table: &str) -> String {
        format!("DELETE FROM {}", self.quote_ident(table))
    }

    fn build_count(&self, table: &str) -> String {
        format!("SELECT COUNT(*) FROM {}", self.quote_ident(table))
    }

    /// Build a SELECT of the given columns as text, ordered by `order_by`.
    fn build_select_text(&self, table: &str, columns: &[&str], order_by: &str) -> String {
        let cols = columns
            .iter()
            .map(|c| self.text_expr(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT {} FROM {} ORDER BY {}",
            cols,
            self.quote_ident(table),
            self.quote_ident(order_by)
        )
    }

    /// Build a SELECT of the given columns as text for the row whose
    /// `key` equals the single bound parameter.
    fn build_select_text_by_key(&self, table: &str, columns: &[&str], key: &str) -> String {
        let cols = columns
            .iter()
            .map(|c| self.text_expr(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT {} FROM {} WHERE {} = {}",
            cols,
            self.quote_ident(table),
            self.quote_ident(key),
            self.param_placeholder(1)
        )
    }

    /// Build a plain INSERT; a duplicate key is an error.
    fn build_insert(&self, table: &str, columns: &[&str]) -> String {
        let cols = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote_ident(table),
            cols,
            self.placeholders(columns.len())
        )
    }

    /// Build `UPDATE table SET c1 = ?, ... WHERE key = ?`, with the key
    /// bound last.
    fn build_update_by_key(&self, table: &str, columns: &[&str], key: &str) -> String {
        let sets = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = {}", self.quote_ident(c), self.param_placeholder(i + 1)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.quote_ident(table),
            sets,
            self.quote_ident(key),
            self.param_placeholder(columns.len() + 1)
        )
    }

    /// Build `DELETE FROM table WHERE column = ?`.
    fn build_delete_where(&self, table: &str, column: &str) -> String {
        format!(
            "DELETE FROM {} WHERE {} = {}",
            self.quote_ident(table),
            self.quote_ident(column),
            self.param_placeholder(1)
        )
    }

    /// Comma-separated placeholder list for `count` parameters.
    fn placeholders(&self, count: usize) -> String {
        (1..=count)
            .map(|i| self.param_placeholder(i))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// One open driver connection.
///
/// Implementations are deliberately thin: they bind [`SqlValue`]s, decode
/// rows into [`Row`]s and close. Everything dialect-specific about SQL text
/// lives in [`Dialect`].
#[async_trait]
pub trait Connection: Send {
    /// Run a statement, returning the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Run a parameterized query, returning all rows.
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    /// Run a parameterless control statement (BEGIN, COMMIT, ...).
    async fn simple(&mut self, sql: &str) -> Result<()>;

    /// Close the connection, releasing its socket or file descriptor.
    async fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// A block of statements executed against a handle.
///
/// Passed to [`Handle::transaction`] to run inside BEGIN/COMMIT with
/// rollback on error, or to [`crate::broker::with_connection`] to run on a
/// freshly opened handle that is closed on every exit path.
#[async_trait]
pub trait UnitOfWork: Send {
    type Output: Send;

    async fn run(self, handle: &mut Handle) -> Result<Self::Output>;
}

/// Render a string as a single-quoted SQL literal.
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_literal_escapes_quotes() {
        assert_eq!(sql_literal("{}"), "'{}'");
        assert_eq!(sql_literal("it's"), "'it''s'");
    }
}
