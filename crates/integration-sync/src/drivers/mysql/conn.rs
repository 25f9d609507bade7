//! MySQL/MariaDB connection backed by a single `mysql_async::Conn`.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder, Params, SslOpts, Value};
use tracing::{info, warn};

use crate::config::{ConnectionMethod, IntegrationDescriptor};
use crate::core::traits::Connection;
use crate::core::value::{Row, SqlValue};
use crate::drivers::common::SslMode;
use crate::error::Result;

/// One open MySQL session.
pub struct MysqlConn {
    conn: Conn,
}

impl MysqlConn {
    /// Connect to the server described by `descriptor`.
    pub async fn connect(descriptor: &IntegrationDescriptor) -> Result<Self> {
        let ssl_opts = match SslMode::from_descriptor(descriptor) {
            SslMode::Disable => {
                if descriptor.connection_method == ConnectionMethod::Direct {
                    warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
                }
                None
            }
            SslMode::Require => {
                warn!("ssl is enabled without sslVerify: the MySQL server certificate is NOT verified.");
                Some(SslOpts::default().with_danger_accept_invalid_certs(true))
            }
            SslMode::VerifyFull => Some(SslOpts::default()),
        };

        let mut builder = OptsBuilder::default()
            .db_name(Some(&descriptor.database))
            .user(descriptor.username.as_deref())
            .pass(descriptor.password.as_deref())
            // Use utf8mb4 for full Unicode support
            .init(vec!["SET NAMES utf8mb4"]);

        builder = match descriptor.connection_method {
            ConnectionMethod::Direct => builder
                .ip_or_hostname(descriptor.host_or_default())
                .tcp_port(descriptor.port_or_default())
                .prefer_socket(false),
            ConnectionMethod::Socket => builder.socket(Some(descriptor.host_or_default())),
        };

        if let Some(ssl) = ssl_opts {
            builder = builder.ssl_opts(ssl);
        }

        let conn = Conn::new(builder).await?;
        info!("Connected to MySQL: {}", descriptor.address());
        Ok(Self { conn })
    }

    fn to_params(params: &[SqlValue]) -> Params {
        if params.is_empty() {
            return Params::Empty;
        }
        Params::Positional(
            params
                .iter()
                .map(|p| match p {
                    SqlValue::Null => Value::NULL,
                    SqlValue::Text(s) => Value::Bytes(s.clone().into_bytes()),
                    SqlValue::Int(i) => Value::Int(*i),
                })
                .collect(),
        )
    }

    fn decode_row(row: &mysql_async::Row) -> Row {
        (0..row.len())
            .map(|i| match row.as_ref(i) {
                None | Some(Value::NULL) => SqlValue::Null,
                Some(Value::Bytes(b)) => SqlValue::Text(String::from_utf8_lossy(b).into_owned()),
                Some(Value::Int(v)) => SqlValue::Int(*v),
                Some(Value::UInt(v)) => match i64::try_from(*v) {
                    Ok(v) => SqlValue::Int(v),
                    Err(_) => SqlValue::Text(v.to_string()),
                },
                Some(Value::Float(v)) => SqlValue::Text(v.to_string()),
                Some(Value::Double(v)) => SqlValue::Text(v.to_string()),
                Some(other) => SqlValue::Text(other.as_sql(true).trim_matches('\'').to_string()),
            })
            .collect()
    }
}

#[async_trait]
impl Connection for MysqlConn {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.conn.exec_drop(sql, Self::to_params(params)).await?;
        Ok(self.conn.affected_rows())
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let rows: Vec<mysql_async::Row> = self.conn.exec(sql, Self::to_params(params)).await?;
        Ok(rows.iter().map(Self::decode_row).collect())
    }

    async fn simple(&mut self, sql: &str) -> Result<()> {
        self.conn.query_drop(sql).await?;
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.conn.disconnect().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_params() {
        assert_eq!(MysqlConn::to_params(&[]), Params::Empty);
        let params = MysqlConn::to_params(&[
            SqlValue::Null,
            SqlValue::Text("a1".into()),
            SqlValue::Int(3),
        ]);
        assert_eq!(
            params,
            Params::Positional(vec![
                Value::NULL,
                Value::Bytes(b"a1".to_vec()),
                Value::Int(3)
            ])
        );
    }
}
