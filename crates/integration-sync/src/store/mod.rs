//! The authoritative local SQLite store.
//!
//! Every operation opens a short-lived handle on the store file and closes
//! it before returning, the same way external integrations are reached.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::broker::{self, Handle};
use crate::config::{Config, ConnectionConfig, IntegrationDescriptor};
use crate::core::traits::{Dialect, UnitOfWork};
use crate::core::value::SqlValue;
use crate::error::{Result, SyncError};
use crate::model::shapes::{INTEGRATIONS, TEST_SESSIONS};
use crate::model::{
    now_iso, Entity, Integration, IntegrationStatus, Snapshot, SystemLog, User, UserRole,
};
use crate::orchestrator::{self, MigrateResult};
use crate::reconcile::{self, ReconcileAction, ReconcileResult};

/// Credentials for the administrator account seeded by [`LocalStore::reset`].
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
}

/// Handle-per-call access to the local store file.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
    descriptor: IntegrationDescriptor,
    connection: ConnectionConfig,
}

impl LocalStore {
    pub fn new(path: impl AsRef<Path>, connection: ConnectionConfig) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            descriptor: IntegrationDescriptor::sqlite(path.to_string_lossy()),
            path,
            connection,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.local.path, config.connection.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Connection settings shared with external integrations.
    pub fn connection(&self) -> &ConnectionConfig {
        &self.connection
    }

    async fn open(&self) -> Result<Handle> {
        Ok(broker::connect(&self.descriptor, &self.connection).await?.handle)
    }

    /// Create or repair the five tables.
    ///
    /// Repaired tables are recorded in the audit log. Fails if any table
    /// could not be brought in line.
    pub async fn ensure_schema(&self) -> Result<Vec<ReconcileResult>> {
        let mut handle = self.open().await?;
        let results = reconcile::reconcile_all(&mut handle).await;

        let mut audited = Ok(());
        for log in results.iter().filter_map(migration_log) {
            audited = insert_log(&mut handle, &log).await;
            if audited.is_err() {
                break;
            }
        }
        finish(handle, audited).await?;

        if let Some(failed) = results.iter().find(|r| !r.success) {
            return Err(SyncError::drift(
                failed.table.clone(),
                failed.error.clone().unwrap_or_default(),
            ));
        }
        Ok(results)
    }

    /// Every record in the store.
    pub async fn snapshot(&self) -> Result<Snapshot> {
        let mut handle = self.open().await?;
        let result = orchestrator::export(&mut handle).await;
        finish(handle, result).await
    }

    /// Upsert a snapshot into the store.
    pub async fn import(&self, snapshot: &Snapshot) -> Result<MigrateResult> {
        let mut handle = self.open().await?;
        let result = orchestrator::migrate(snapshot, &mut handle).await;
        finish(handle, result).await
    }

    pub async fn insert_integration(&self, integration: &Integration) -> Result<()> {
        let mut handle = self.open().await?;
        let result = insert_row(&mut handle, integration).await;
        finish(handle, result).await?;
        info!("Added integration {} ({})", integration.name, integration.id);
        Ok(())
    }

    pub async fn get_integration(&self, id: &str) -> Result<Integration> {
        let mut handle = self.open().await?;
        let result = get_integration(&mut handle, id).await;
        finish(handle, result).await
    }

    pub async fn list_integrations(&self) -> Result<Vec<Integration>> {
        let mut handle = self.open().await?;
        let result = orchestrator::read_entities::<Integration>(&mut handle).await;
        finish(handle, result).await
    }

    /// The integration currently marked connected, if any.
    pub async fn connected_integration(&self) -> Result<Option<Integration>> {
        Ok(self
            .list_integrations()
            .await?
            .into_iter()
            .find(|i| i.status == IntegrationStatus::Connected))
    }

    pub async fn set_status(&self, id: &str, status: IntegrationStatus) -> Result<()> {
        self.update_integration(
            id,
            &["status", "updated_at"],
            vec![status.as_str().into(), now_iso().into()],
        )
        .await
    }

    /// Stamp `last_sync` with the current time and return it.
    pub async fn touch_last_sync(&self, id: &str) -> Result<String> {
        let now = now_iso();
        self.update_integration(
            id,
            &["last_sync", "updated_at"],
            vec![now.clone().into(), now.clone().into()],
        )
        .await?;
        Ok(now)
    }

    async fn update_integration(
        &self,
        id: &str,
        columns: &[&str],
        mut params: Vec<SqlValue>,
    ) -> Result<()> {
        let mut handle = self.open().await?;
        let sql = handle
            .dialect()
            .build_update_by_key(INTEGRATIONS.name, columns, "id");
        params.push(id.into());
        let result = handle.execute(&sql, &params).await;

        match finish(handle, result).await? {
            0 => Err(SyncError::NotFound(format!("integration {}", id))),
            _ => Ok(()),
        }
    }

    /// Delete an integration together with its test sessions.
    pub async fn delete_integration(&self, id: &str) -> Result<()> {
        let mut handle = self.open().await?;
        let result = handle
            .transaction(DeleteIntegration { id: id.to_string() })
            .await;

        match finish(handle, result).await? {
            0 => Err(SyncError::NotFound(format!("integration {}", id))),
            _ => {
                info!("Deleted integration {}", id);
                Ok(())
            }
        }
    }

    /// Append one audit entry.
    pub async fn append_log(&self, log: &SystemLog) -> Result<()> {
        let mut handle = self.open().await?;
        let result = insert_log(&mut handle, log).await;
        finish(handle, result).await
    }

    /// Replace the store with a fresh one holding only the seeded admin
    /// account and a `database_reset` log entry.
    pub async fn reset(&self, seed: &AdminSeed) -> Result<User> {
        for suffix in ["", "-journal", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            match tokio::fs::remove_file(&file).await {
                Ok(()) => info!("Removed {}", Path::new(&file).display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let results = self.ensure_schema().await?;

        let admin = User::new(
            seed.username.clone(),
            seed.password.clone(),
            seed.email.clone(),
            UserRole::SystemUser,
        );
        let log = SystemLog::new(
            "database_reset",
            Some(admin.id.clone()),
            json!({
                "description": "Local store reset",
                "tables_created": results.len(),
                "initial_user": admin.username,
            }),
        );

        let mut handle = self.open().await?;
        let result = handle
            .transaction(SeedAdmin {
                admin: admin.clone(),
                log,
            })
            .await;
        finish(handle, result).await?;

        info!(
            "Reset local store {} with admin user {}",
            self.path.display(),
            admin.username
        );
        Ok(admin)
    }
}

/// Audit entry for a table whose drift was repaired.
pub fn migration_log(result: &ReconcileResult) -> Option<SystemLog> {
    if result.action != ReconcileAction::Migrated {
        return None;
    }
    Some(SystemLog::new(
        "schema_migrated",
        None,
        json!({
            "table": result.table,
            "backupTable": result.backup_table,
            "drift": result.drift,
        }),
    ))
}

/// Close `handle` and hand back `result`; a close failure is only logged.
async fn finish<T>(mut handle: Handle, result: Result<T>) -> Result<T> {
    if let Err(e) = handle.close().await {
        warn!("Closing {} failed: {}", handle.label(), e);
    }
    result
}

async fn insert_row<E: Entity>(handle: &mut Handle, record: &E) -> Result<()> {
    let shape = E::SHAPE;
    let sql = handle.dialect().build_insert(shape.name, &shape.column_names());
    let row = record.to_row()?;
    handle
        .execute(&sql, &row)
        .await
        .map_err(|e| SyncError::write(shape.name, record.id(), e))?;
    Ok(())
}

async fn insert_log(handle: &mut Handle, log: &SystemLog) -> Result<()> {
    let shape = SystemLog::SHAPE;
    let sql = handle
        .dialect()
        .build_insert_ignore(shape.name, &shape.column_names());
    handle.execute(&sql, &log.to_row()?).await?;
    Ok(())
}

async fn get_integration(handle: &mut Handle, id: &str) -> Result<Integration> {
    let sql = handle.dialect().build_select_text_by_key(
        INTEGRATIONS.name,
        &INTEGRATIONS.column_names(),
        "id",
    );
    let rows = handle.query(&sql, &[id.into()]).await?;
    match rows.into_iter().next() {
        Some(row) => Integration::from_row(row),
        None => Err(SyncError::NotFound(format!("integration {}", id))),
    }
}

struct DeleteIntegration {
    id: String,
}

#[async_trait]
impl UnitOfWork for DeleteIntegration {
    type Output = u64;

    async fn run(self, handle: &mut Handle) -> Result<u64> {
        let id = SqlValue::from(self.id.as_str());

        let sql = handle
            .dialect()
            .build_delete_where(TEST_SESSIONS.name, "integration_id");
        handle.execute(&sql, std::slice::from_ref(&id)).await?;

        let sql = handle.dialect().build_delete_where(INTEGRATIONS.name, "id");
        handle.execute(&sql, &[id]).await
    }
}

/// Admin account and its `database_reset` entry, written together.
struct SeedAdmin {
    admin: User,
    log: SystemLog,
}

#[async_trait]
impl UnitOfWork for SeedAdmin {
    type Output = ();

    async fn run(self, handle: &mut Handle) -> Result<()> {
        insert_row(handle, &self.admin).await?;
        insert_log(handle, &self.log).await
    }
}
