//! Connection broker: one logical connection to SQLite, PostgreSQL or MySQL
//! behind a single operation surface.
//!
//! - [`connect`] opens a [`Handle`] (creating a missing SQLite file)
//! - [`test_connection`] probes a descriptor and never fails past its boundary
//! - [`with_connection`] runs a [`UnitOfWork`] on a fresh handle and always
//!   closes it
//!
//! There are no retries at this layer; the only timeout is the configured
//! connect timeout.

pub mod classify;
mod handle;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use classify::ErrorDetails;
pub use handle::Handle;

use crate::config::{validate_descriptor, ConnectionConfig, IntegrationDescriptor};
use crate::core::traits::UnitOfWork;
use crate::drivers::{ConnectionImpl, DialectImpl, DialectKind, MysqlConn, PgConn, SqliteConn};
use crate::error::{ErrorKind, Result, SyncError};

/// An open handle plus whether connecting created the database.
#[derive(Debug)]
pub struct Connected {
    pub handle: Handle,
    /// True only for the file dialect when the file did not exist before.
    pub created: bool,
}

/// Outcome of [`test_connection`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
    /// Whether probing created a new SQLite file.
    #[serde(default)]
    pub created: bool,
}

impl ProbeResult {
    fn succeeded(descriptor: &IntegrationDescriptor, created: bool) -> Self {
        Self {
            success: true,
            message: Some(classify::success_message(descriptor, created)),
            error: None,
            error_kind: None,
            details: None,
            created,
        }
    }

    fn failed(descriptor: &IntegrationDescriptor, err: &SyncError) -> Self {
        Self {
            success: false,
            message: Some(classify::failure_message(descriptor, err)),
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            details: classify::error_details(err),
            created: false,
        }
    }
}

/// Open one connection to the database described by `descriptor`.
pub async fn connect(
    descriptor: &IntegrationDescriptor,
    cfg: &ConnectionConfig,
) -> Result<Connected> {
    validate_descriptor(descriptor)?;

    let timeout = cfg.connect_timeout();
    match tokio::time::timeout(timeout, open(descriptor, timeout)).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout {
            target: descriptor.address(),
            after: timeout,
        }),
    }
}

async fn open(descriptor: &IntegrationDescriptor, timeout: Duration) -> Result<Connected> {
    let dialect = DialectImpl::for_kind(descriptor.dialect);
    let (conn, created) = match descriptor.dialect {
        DialectKind::Sqlite => {
            let (conn, created) = SqliteConn::open(Path::new(&descriptor.database)).await?;
            (ConnectionImpl::Sqlite(conn), created)
        }
        DialectKind::Postgresql => (
            ConnectionImpl::Postgres(PgConn::connect(descriptor, timeout).await?),
            false,
        ),
        DialectKind::Mysql => (
            ConnectionImpl::Mysql(MysqlConn::connect(descriptor).await?),
            false,
        ),
    };

    Ok(Connected {
        handle: Handle::new(dialect, conn, descriptor.address()),
        created,
    })
}

/// Probe a descriptor: connect, run one round trip, close.
///
/// Every failure is classified and reported in the result instead of being
/// returned as an error.
pub async fn test_connection(
    descriptor: &IntegrationDescriptor,
    cfg: &ConnectionConfig,
) -> ProbeResult {
    let Connected {
        mut handle,
        created,
    } = match connect(descriptor, cfg).await {
        Ok(connected) => connected,
        Err(e) => {
            warn!("Connection test for {} failed: {}", descriptor.address(), e);
            return ProbeResult::failed(descriptor, &e);
        }
    };

    let ping = handle.query("SELECT 1", &[]).await;
    let closed = handle.close().await;

    match ping.and(closed) {
        Ok(_) => {
            info!("Connection test for {} succeeded", descriptor.address());
            ProbeResult::succeeded(descriptor, created)
        }
        Err(e) => {
            warn!("Connection test for {} failed: {}", descriptor.address(), e);
            ProbeResult::failed(descriptor, &e)
        }
    }
}

/// Run `work` on a freshly opened handle, closing it on every exit path.
pub async fn with_connection<W: UnitOfWork>(
    descriptor: &IntegrationDescriptor,
    cfg: &ConnectionConfig,
    work: W,
) -> Result<W::Output> {
    let Connected { mut handle, .. } = connect(descriptor, cfg).await?;

    let result = work.run(&mut handle).await;
    if let Err(e) = handle.close().await {
        warn!("Closing {} failed: {}", handle.label(), e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_result_serializes_camel_case() {
        let descriptor = IntegrationDescriptor::sqlite("/tmp/x.db");
        let err = SyncError::Config("database is required".into());
        let probe = ProbeResult::failed(&descriptor, &err);

        let json = serde_json::to_value(&probe).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errorKind"], "ConfigError");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn test_probe_result_success_shape() {
        let descriptor = IntegrationDescriptor::sqlite("/tmp/x.db");
        let probe = ProbeResult::succeeded(&descriptor, true);
        assert!(probe.success);
        assert!(probe.created);
        assert!(probe.error_kind.is_none());
    }
}
