//! PostgreSQL connection backed by a single `tokio_postgres::Client`.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::task::JoinHandle;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tracing::{debug, info, warn};

use crate::config::{ConnectionMethod, IntegrationDescriptor};
use crate::core::traits::Connection;
use crate::core::value::{Row, SqlValue};
use crate::drivers::common::{SslMode, TlsBuilder};
use crate::error::{Result, SyncError};

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Text(s) => s.to_sql(ty, out),
            SqlValue::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::INT8 => i.to_sql(ty, out),
                _ => i.to_string().to_sql(ty, out),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// One open PostgreSQL session.
pub struct PgConn {
    client: Client,
    driver: JoinHandle<()>,
}

impl PgConn {
    /// Connect to the server described by `descriptor`.
    pub async fn connect(descriptor: &IntegrationDescriptor, timeout: Duration) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        match descriptor.connection_method {
            ConnectionMethod::Direct => {
                pg_config.host(descriptor.host_or_default());
            }
            #[cfg(unix)]
            ConnectionMethod::Socket => {
                pg_config.host_path(descriptor.host_or_default());
            }
            #[cfg(not(unix))]
            ConnectionMethod::Socket => {
                return Err(SyncError::Config(
                    "socket connections are only supported on unix".into(),
                ));
            }
        }
        pg_config.port(descriptor.port_or_default());
        pg_config.dbname(&descriptor.database);
        if let Some(user) = &descriptor.username {
            pg_config.user(user);
        }
        if let Some(password) = &descriptor.password {
            pg_config.password(password);
        }
        pg_config.connect_timeout(timeout);
        pg_config.application_name("integration-sync");

        let address = descriptor.address();
        let tls = TlsBuilder::new(SslMode::from_descriptor(descriptor)).build()?;

        // The connection object drives the socket; it must run on its own task.
        let (client, driver) = match tls {
            None => {
                if descriptor.connection_method == ConnectionMethod::Direct {
                    warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                }
                let (client, connection) = pg_config.connect(NoTls).await?;
                let driver = tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        debug!("PostgreSQL connection closed with error: {}", e);
                    }
                });
                (client, driver)
            }
            Some(connector) => {
                let (client, connection) = pg_config.connect(connector).await?;
                let driver = tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        debug!("PostgreSQL connection closed with error: {}", e);
                    }
                });
                (client, driver)
            }
        };

        info!("Connected to PostgreSQL: {}", address);
        Ok(Self { client, driver })
    }

    fn decode_row(row: &tokio_postgres::Row) -> Result<Row> {
        let mut values = Vec::with_capacity(row.len());
        for (i, column) in row.columns().iter().enumerate() {
            let value: SqlValue = match *column.type_() {
                Type::INT2 => row.try_get::<_, Option<i16>>(i)?.map(i64::from).into(),
                Type::INT4 => row.try_get::<_, Option<i32>>(i)?.map(i64::from).into(),
                Type::INT8 => row.try_get::<_, Option<i64>>(i)?.into(),
                _ => row
                    .try_get::<_, Option<String>>(i)
                    .map_err(|e| {
                        SyncError::decode(
                            "result set",
                            format!(
                                "column {} of type {} is not text: {}",
                                column.name(),
                                column.type_(),
                                e
                            ),
                        )
                    })?
                    .into(),
            };
            values.push(value);
        }
        Ok(values)
    }
}

fn as_params(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

#[async_trait]
impl Connection for PgConn {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let params = as_params(params);
        Ok(self.client.execute(sql, &params).await?)
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let params = as_params(params);
        let rows = self.client.query(sql, &params).await?;
        rows.iter().map(Self::decode_row).collect()
    }

    async fn simple(&mut self, sql: &str) -> Result<()> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    async fn close(self) -> Result<()> {
        // Dropping the client sends Terminate and lets the driver task finish.
        drop(self.client);
        if let Err(e) = self.driver.await {
            debug!("PostgreSQL driver task ended abnormally: {}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_sql_null_and_text() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            SqlValue::Null.to_sql(&Type::TEXT, &mut buf).unwrap(),
            IsNull::Yes
        ));
        assert!(matches!(
            SqlValue::Text("abc".into()).to_sql(&Type::TEXT, &mut buf).unwrap(),
            IsNull::No
        ));
        assert_eq!(&buf[..], b"abc");
    }

    #[test]
    fn test_to_sql_int_narrows_to_column_type() {
        let mut buf = BytesMut::new();
        SqlValue::Int(7).to_sql(&Type::INT4, &mut buf).unwrap();
        assert_eq!(buf.len(), 4);

        let mut buf = BytesMut::new();
        assert!(SqlValue::Int(i64::MAX).to_sql(&Type::INT2, &mut buf).is_err());
    }

    #[test]
    fn test_to_sql_int_into_text_column() {
        let mut buf = BytesMut::new();
        SqlValue::Int(42).to_sql(&Type::VARCHAR, &mut buf).unwrap();
        assert_eq!(&buf[..], b"42");
    }
}
