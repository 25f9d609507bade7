//! The per-operation connection handle.

use tracing::{debug, warn};

use crate::core::schema::LiveColumn;
use crate::core::traits::{Connection, Dialect, UnitOfWork};
use crate::core::value::{Row, SqlValue};
use crate::drivers::{ConnectionImpl, DialectImpl, DialectKind};
use crate::error::{Result, SyncError};

/// One open connection plus the dialect chosen for it.
///
/// Handles are short-lived: opened for one operation and closed explicitly.
/// [`Handle::close`] is idempotent, and any statement issued after it fails
/// with [`SyncError::Closed`] instead of panicking.
pub struct Handle {
    dialect: DialectImpl,
    conn: Option<ConnectionImpl>,
    label: String,
}

impl Handle {
    pub(crate) fn new(dialect: DialectImpl, conn: ConnectionImpl, label: String) -> Self {
        Self {
            dialect,
            conn: Some(conn),
            label,
        }
    }

    /// SQL strategy for this connection.
    pub fn dialect(&self) -> &DialectImpl {
        &self.dialect
    }

    pub fn kind(&self) -> DialectKind {
        self.dialect.kind()
    }

    /// Human-readable address of the connected database.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    fn conn(&mut self) -> Result<&mut ConnectionImpl> {
        match self.conn.as_mut() {
            Some(conn) => Ok(conn),
            None => Err(SyncError::Closed(self.label.clone())),
        }
    }

    /// Run a statement, returning the number of affected rows.
    pub async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        debug!("[{}] {}", self.label, sql);
        self.conn()?.execute(sql, params).await
    }

    /// Run a parameterized query, returning all rows.
    pub async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        debug!("[{}] {}", self.label, sql);
        self.conn()?.query(sql, params).await
    }

    pub async fn begin(&mut self) -> Result<()> {
        let sql = self.dialect.begin_statement();
        debug!("[{}] {}", self.label, sql);
        self.conn()?.simple(sql).await
    }

    pub async fn commit(&mut self) -> Result<()> {
        debug!("[{}] COMMIT", self.label);
        self.conn()?.simple("COMMIT").await
    }

    pub async fn rollback(&mut self) -> Result<()> {
        debug!("[{}] ROLLBACK", self.label);
        self.conn()?.simple("ROLLBACK").await
    }

    /// Run `work` inside BEGIN/COMMIT.
    ///
    /// Any error from the work or from COMMIT rolls the transaction back and
    /// is returned wrapped in [`SyncError::Transaction`].
    pub async fn transaction<W: UnitOfWork>(&mut self, work: W) -> Result<W::Output> {
        self.begin().await?;

        let outcome = match work.run(self).await {
            Ok(output) => self.commit().await.map(|()| output),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(output) => Ok(output),
            Err(e) => {
                if let Err(rb) = self.rollback().await {
                    warn!("[{}] rollback failed: {}", self.label, rb);
                }
                Err(SyncError::Transaction(Box::new(e)))
            }
        }
    }

    /// Describe the live columns of `table`, or `None` if it does not exist.
    pub async fn introspect(&mut self, table: &str) -> Result<Option<Vec<LiveColumn>>> {
        let sql = self.dialect.introspect_query();
        let rows = self.query(&sql, &[SqlValue::from(table)]).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        rows.into_iter()
            .map(|row| live_column(table, row))
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    /// Number of rows in `table`.
    pub async fn count(&mut self, table: &str) -> Result<i64> {
        let sql = self.dialect.build_count(table);
        let rows = self.query(&sql, &[]).await?;
        rows.first()
            .and_then(|row| row.first())
            .and_then(SqlValue::as_i64)
            .ok_or_else(|| SyncError::decode(table, "COUNT(*) returned no value"))
    }

    /// Close the connection. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => {
                debug!("[{}] closing connection", self.label);
                conn.close().await
            }
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("dialect", &self.dialect.name())
            .field("label", &self.label)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Decode one introspection row: `(name, type, nullable, default, pk)`.
fn live_column(table: &str, row: Row) -> Result<LiveColumn> {
    let mut fields = row.into_iter().map(SqlValue::into_text);

    let name = fields
        .next()
        .flatten()
        .ok_or_else(|| SyncError::decode(table, "introspection row has no column name"))?;
    let data_type = fields.next().flatten().unwrap_or_default();
    let nullable = fields
        .next()
        .flatten()
        .map_or(true, |v| v.eq_ignore_ascii_case("YES"));
    let default = fields.next().flatten();
    let primary_key = fields.next().flatten().is_some_and(|v| v == "1");

    Ok(LiveColumn {
        name,
        data_type,
        nullable,
        default,
        primary_key,
    })
}
