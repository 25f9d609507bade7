//! SQLite connection backed by a single `sqlx::SqliteConnection`.

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Connection as _, Row as _, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::core::traits::Connection;
use crate::core::value::{Row, SqlValue};
use crate::error::Result;

/// One open SQLite file.
pub struct SqliteConn {
    conn: SqliteConnection,
}

impl SqliteConn {
    /// Open `path`, creating the file if it does not exist.
    ///
    /// Returns the connection and whether the file was created. A file that
    /// exists but is not a database is rejected here rather than on first use.
    pub async fn open(path: &Path) -> Result<(Self, bool)> {
        let created = !path.exists();

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(false);

        let mut conn = SqliteConnection::connect_with(&options).await?;

        // SQLite reads the header lazily; force it so a malformed file fails now.
        sqlx::query("SELECT COUNT(*) FROM sqlite_master")
            .fetch_one(&mut conn)
            .await?;

        if created {
            info!("Created SQLite database at {}", path.display());
        } else {
            debug!("Opened SQLite database at {}", path.display());
        }

        Ok((Self { conn }, created))
    }

    fn decode_row(row: &SqliteRow) -> Result<Row> {
        let mut values = Vec::with_capacity(row.len());
        for i in 0..row.len() {
            let raw = row.try_get_raw(i)?;
            if raw.is_null() {
                values.push(SqlValue::Null);
                continue;
            }
            let type_name = raw.type_info().name().to_ascii_uppercase();
            let value = match type_name.as_str() {
                "INTEGER" | "INT" | "BIGINT" | "BOOLEAN" => {
                    SqlValue::Int(row.try_get_unchecked::<i64, _>(i)?)
                }
                "REAL" => SqlValue::Text(row.try_get_unchecked::<f64, _>(i)?.to_string()),
                _ => SqlValue::Text(row.try_get_unchecked::<String, _>(i)?),
            };
            values.push(value);
        }
        Ok(values)
    }
}

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    params: &[SqlValue],
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Text(s) => query.bind(s.clone()),
            SqlValue::Int(i) => query.bind(*i),
        };
    }
    query
}

#[async_trait]
impl Connection for SqliteConn {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let result = bind_all(sqlx::query(sql), params)
            .execute(&mut self.conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let rows = bind_all(sqlx::query(sql), params)
            .fetch_all(&mut self.conn)
            .await?;
        rows.iter().map(Self::decode_row).collect()
    }

    async fn simple(&mut self, sql: &str) -> Result<()> {
        sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(sql)).await?;
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}
