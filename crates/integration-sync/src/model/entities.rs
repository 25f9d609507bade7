//! The five persisted entities and their row mappings.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::shapes::{ENVIRONMENTS, INTEGRATIONS, SYSTEM_LOGS, TEST_SESSIONS, USERS};
use super::{now_iso, Entity, RowReader, WriteMode};
use crate::config::IntegrationDescriptor;
use crate::core::schema::TableShape;
use crate::core::value::{Row, SqlValue};
use crate::error::{Result, SyncError};

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, String> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    )),
                }
            }
        }
    };
}

string_enum! {
    /// What an integration connects to.
    IntegrationType {
        Database => "database",
        Proxy => "proxy",
        Vpn => "vpn",
    }
}

string_enum! {
    IntegrationStatus {
        Disconnected => "disconnected",
        Connected => "connected",
    }
}

string_enum! {
    SessionStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Stopped => "stopped",
    }
}

string_enum! {
    /// Account role tag.
    UserRole {
        SystemUser => "SystemUser",
        RegularUser => "RegularUser",
        TestUser => "TestUser",
    }
}

/// An external system the application can mirror its data into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: IntegrationType,
    pub status: IntegrationStatus,
    /// Connection settings; for database integrations an
    /// [`IntegrationDescriptor`] in JSON form.
    #[serde(default = "empty_object")]
    pub config: Value,
    #[serde(default)]
    pub last_sync: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Integration {
    /// A new disconnected integration with a fresh id.
    pub fn new(name: impl Into<String>, kind: IntegrationType, config: Value) -> Self {
        let now = now_iso();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            kind,
            status: IntegrationStatus::Disconnected,
            config,
            last_sync: None,
            created_at: Some(now.clone()),
            updated_at: Some(now),
        }
    }

    /// A database integration whose config is `descriptor`.
    pub fn database(name: impl Into<String>, descriptor: &IntegrationDescriptor) -> Result<Self> {
        Ok(Self::new(
            name,
            IntegrationType::Database,
            serde_json::to_value(descriptor)?,
        ))
    }

    /// Parse `config` as a database descriptor.
    pub fn descriptor(&self) -> Result<IntegrationDescriptor> {
        serde_json::from_value(self.config.clone()).map_err(|e| {
            SyncError::Config(format!(
                "integration {} has no usable database config: {}",
                self.id, e
            ))
        })
    }
}

impl Entity for Integration {
    const SHAPE: &'static TableShape = &INTEGRATIONS;

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Result<Row> {
        Ok(vec![
            self.id.as_str().into(),
            self.name.as_str().into(),
            self.kind.as_str().into(),
            self.status.as_str().into(),
            serde_json::to_string(&self.config)?.into(),
            self.last_sync.clone().into(),
            stamp(&self.created_at),
            stamp(&self.updated_at),
        ])
    }

    fn from_row(row: Row) -> Result<Self> {
        let mut r = RowReader::new(Self::SHAPE.name, row);
        Ok(Self {
            id: r.required("id")?,
            name: r.required("name")?,
            kind: r.parse("type", IntegrationType::Database)?,
            status: r.parse("status", IntegrationStatus::Disconnected)?,
            config: r.json("config", empty_object())?,
            last_sync: r.optional(),
            created_at: r.optional(),
            updated_at: r.optional(),
        })
    }
}

/// An application account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: UserRole,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl User {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        email: Option<String>,
        role: UserRole,
    ) -> Self {
        let now = now_iso();
        Self {
            id: Uuid::new_v4().to_string(),
            username: username.into(),
            password: password.into(),
            email,
            role,
            created_by: None,
            created_at: Some(now.clone()),
            updated_at: Some(now),
        }
    }
}

impl Entity for User {
    const SHAPE: &'static TableShape = &USERS;

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Result<Row> {
        Ok(vec![
            self.id.as_str().into(),
            self.username.as_str().into(),
            self.password.as_str().into(),
            self.email.clone().into(),
            self.role.as_str().into(),
            self.created_by.clone().into(),
            stamp(&self.created_at),
            stamp(&self.updated_at),
        ])
    }

    fn from_row(row: Row) -> Result<Self> {
        let mut r = RowReader::new(Self::SHAPE.name, row);
        Ok(Self {
            id: r.required("id")?,
            username: r.required("username")?,
            password: r.required("password")?,
            email: r.optional(),
            role: r.parse("role", UserRole::RegularUser)?,
            created_by: r.optional(),
            created_at: r.optional(),
            updated_at: r.optional(),
        })
    }
}

/// One automation run against an integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSession {
    pub id: String,
    #[serde(default)]
    pub integration_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub status: SessionStatus,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default = "empty_object")]
    pub results: Value,
    #[serde(default = "empty_array")]
    pub logs: Value,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Entity for TestSession {
    const SHAPE: &'static TableShape = &TEST_SESSIONS;

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Result<Row> {
        Ok(vec![
            self.id.as_str().into(),
            self.integration_id.clone().into(),
            self.user_id.clone().into(),
            self.status.as_str().into(),
            self.start_time.clone().into(),
            self.end_time.clone().into(),
            serde_json::to_string(&self.results)?.into(),
            serde_json::to_string(&self.logs)?.into(),
            stamp(&self.created_at),
        ])
    }

    fn from_row(row: Row) -> Result<Self> {
        let mut r = RowReader::new(Self::SHAPE.name, row);
        Ok(Self {
            id: r.required("id")?,
            integration_id: r.optional(),
            user_id: r.optional(),
            status: r.parse("status", SessionStatus::Pending)?,
            start_time: r.optional(),
            end_time: r.optional(),
            results: r.json("results", empty_object())?,
            logs: r.json("logs", empty_array())?,
            created_at: r.optional(),
        })
    }
}

/// Append-only audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemLog {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub action: String,
    #[serde(default = "empty_object")]
    pub details: Value,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl SystemLog {
    pub fn new(action: impl Into<String>, user_id: Option<String>, details: Value) -> Self {
        let now = now_iso();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            action: action.into(),
            details,
            timestamp: Some(now.clone()),
            created_at: Some(now),
        }
    }
}

impl Entity for SystemLog {
    const SHAPE: &'static TableShape = &SYSTEM_LOGS;
    const WRITE_MODE: WriteMode = WriteMode::InsertIgnore;

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Result<Row> {
        Ok(vec![
            self.id.as_str().into(),
            self.user_id.clone().into(),
            self.action.as_str().into(),
            serde_json::to_string(&self.details)?.into(),
            stamp(&self.timestamp),
            stamp(&self.created_at),
        ])
    }

    fn from_row(row: Row) -> Result<Self> {
        let mut r = RowReader::new(Self::SHAPE.name, row);
        Ok(Self {
            id: r.required("id")?,
            user_id: r.optional(),
            action: r.required("action")?,
            details: r.json("details", empty_object())?,
            timestamp: r.optional(),
            created_at: r.optional(),
        })
    }
}

/// A named set of entity-type to integration-id bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub bindings: BTreeMap<String, String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Entity for Environment {
    const SHAPE: &'static TableShape = &ENVIRONMENTS;

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Result<Row> {
        Ok(vec![
            self.id.as_str().into(),
            self.name.as_str().into(),
            serde_json::to_string(&self.bindings)?.into(),
            stamp(&self.created_at),
            stamp(&self.updated_at),
        ])
    }

    fn from_row(row: Row) -> Result<Self> {
        let mut r = RowReader::new(Self::SHAPE.name, row);
        let id = r.required("id")?;
        let name = r.required("name")?;
        let bindings = serde_json::from_value(r.json("bindings", empty_object())?)
            .map_err(|e| SyncError::decode(Self::SHAPE.name, format!("bindings: {}", e)))?;
        Ok(Self {
            id,
            name,
            bindings,
            created_at: r.optional(),
            updated_at: r.optional(),
        })
    }
}

/// Timestamp column value, filled with the current time when unset.
fn stamp(value: &Option<String>) -> SqlValue {
    SqlValue::Text(value.clone().unwrap_or_else(now_iso))
}

fn empty_object() -> Value {
    json!({})
}

fn empty_array() -> Value {
    json!([])
}
