//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::drivers::DialectKind;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Authoritative local store.
    #[serde(default)]
    pub local: LocalConfig,

    /// Connection behaviour shared by every dialect.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// External database used by commands that need a destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<IntegrationDescriptor>,
}

/// Local embedded store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// SQLite file path (default: "defaultRecorder.db").
    #[serde(default = "default_local_path")]
    pub path: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            path: default_local_path(),
        }
    }
}

/// Connection behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Seconds to wait for a connection to open (default: 10).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// How a client-server dialect reaches its server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMethod {
    /// TCP to `host:port`.
    #[default]
    #[serde(alias = "tcp", alias = "standard")]
    Direct,
    /// Unix domain socket; `host` holds the socket path (MySQL) or the
    /// socket directory (PostgreSQL).
    Socket,
}

/// Everything needed to reach one external database.
///
/// For the file dialect `database` is the path of the database file and the
/// network fields are ignored.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationDescriptor {
    pub dialect: DialectKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Port (default: 5432 for PostgreSQL, 3306 for MySQL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    pub database: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default)]
    pub connection_method: ConnectionMethod,

    /// Use TLS for client-server dialects (default: false).
    #[serde(default)]
    pub ssl: bool,

    /// Verify the server certificate and host name when `ssl` is set
    /// (default: false, encrypt only).
    #[serde(default)]
    pub ssl_verify: bool,
}

impl IntegrationDescriptor {
    /// Descriptor for a SQLite file.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            dialect: DialectKind::Sqlite,
            host: None,
            port: None,
            database: path.into(),
            username: None,
            password: None,
            connection_method: ConnectionMethod::Direct,
            ssl: false,
            ssl_verify: false,
        }
    }

    /// Host name, or `localhost` when unset.
    pub fn host_or_default(&self) -> &str {
        self.host.as_deref().unwrap_or("localhost")
    }

    /// Explicit port or the dialect's default port.
    pub fn port_or_default(&self) -> u16 {
        self.port
            .or_else(|| self.dialect.default_port())
            .unwrap_or_default()
    }

    /// Short human-readable address used in logs and messages.
    pub fn address(&self) -> String {
        match (self.dialect, self.connection_method) {
            (DialectKind::Sqlite, _) => self.database.clone(),
            (_, ConnectionMethod::Socket) => {
                format!("{} (socket)/{}", self.host_or_default(), self.database)
            }
            _ => format!(
                "{}:{}/{}",
                self.host_or_default(),
                self.port_or_default(),
                self.database
            ),
        }
    }
}

/// Custom Debug implementation that redacts the password.
impl fmt::Debug for IntegrationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrationDescriptor")
            .field("dialect", &self.dialect)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("connection_method", &self.connection_method)
            .field("ssl", &self.ssl)
            .field("ssl_verify", &self.ssl_verify)
            .finish()
    }
}

fn default_local_path() -> PathBuf {
    PathBuf::from("defaultRecorder.db")
}

fn default_connect_timeout_secs() -> u64 {
    10
}
