//! Attach and detach external database integrations.
//!
//! `attach` probes the target, reconciles its schema, pushes the local
//! snapshot into it and marks the integration connected. `detach`
//! optionally pulls the target's data back into the local store, scrubs the
//! target and removes the integration.
//!
//! At most one run per integration happens at a time (keyed async mutex),
//! and attaches are serialized so that at most one integration is ever
//! connected.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::broker::{self, Handle, ProbeResult};
use crate::core::traits::UnitOfWork;
use crate::error::{ErrorKind, Result, SyncError};
use crate::model::{Integration, IntegrationStatus, IntegrationType, Snapshot, SystemLog};
use crate::orchestrator::{self, MigrateResult, ScrubResult};
use crate::reconcile::{self, ReconcileResult};
use crate::store::{migration_log, LocalStore};

/// Outcome of [`SyncService::attach`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachReport {
    pub integration_id: String,
    pub success: bool,
    pub probe: ProbeResult,
    #[serde(default)]
    pub schema: Vec<ReconcileResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrate: Option<MigrateResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl AttachReport {
    fn fail(mut self, err: &SyncError) -> Self {
        self.success = false;
        self.error = Some(err.to_string());
        self.error_kind = Some(err.kind());
        self
    }
}

/// Outcome of [`SyncService::detach`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachReport {
    pub integration_id: String,
    pub success: bool,
    /// Records pulled back into the local store, when exporting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imported: Option<MigrateResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scrubbed: Option<ScrubResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl DetachReport {
    fn fail(mut self, err: &SyncError) -> Self {
        self.success = false;
        self.error = Some(err.to_string());
        self.error_kind = Some(err.kind());
        self
    }
}

/// Coordinates integration runs against the local store.
#[derive(Debug)]
pub struct SyncService {
    store: LocalStore,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    attach_gate: tokio::sync::Mutex<()>,
}

impl SyncService {
    pub fn new(store: LocalStore) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
            attach_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Shared run lock for one integration.
    ///
    /// Entries nobody else holds are dropped on each call, so the map only
    /// keeps integrations with a run in flight.
    fn lock_for(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.retain(|key, lock| key == id || Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(id.to_string()).or_default())
    }

    /// Run [`attach`](Self::attach) on the tokio runtime.
    pub fn spawn_attach(self: &Arc<Self>, id: impl Into<String>) -> JoinHandle<Result<AttachReport>> {
        let service = Arc::clone(self);
        let id = id.into();
        tokio::spawn(async move { service.attach(&id).await })
    }

    /// Run [`detach`](Self::detach) on the tokio runtime.
    pub fn spawn_detach(
        self: &Arc<Self>,
        id: impl Into<String>,
        export: bool,
    ) -> JoinHandle<Result<DetachReport>> {
        let service = Arc::clone(self);
        let id = id.into();
        tokio::spawn(async move { service.detach(&id, export).await })
    }

    /// Connect a database integration and push the local data into it.
    ///
    /// Errors are returned only for local problems (unknown id, wrong
    /// integration type, another integration already connected). Failures
    /// reaching or writing the target are reported in the result.
    pub async fn attach(&self, id: &str) -> Result<AttachReport> {
        let lock = self.lock_for(id);
        let _run = lock.lock().await;
        let _gate = self.attach_gate.lock().await;

        let integration = self.store.get_integration(id).await?;
        if integration.kind != IntegrationType::Database {
            return Err(SyncError::Config(format!(
                "integration {} is a {} integration; only database integrations can be attached",
                id, integration.kind
            )));
        }
        if let Some(other) = self.store.connected_integration().await? {
            if other.id != integration.id {
                return Err(SyncError::Config(format!(
                    "integration {} ({}) is already connected; detach it first",
                    other.name, other.id
                )));
            }
        }
        let descriptor = integration.descriptor()?;

        info!("Attaching integration {} ({})", integration.name, id);
        let probe = broker::test_connection(&descriptor, self.store.connection()).await;
        let mut report = AttachReport {
            integration_id: id.to_string(),
            success: probe.success,
            probe,
            schema: Vec::new(),
            migrate: None,
            last_sync: None,
            error: None,
            error_kind: None,
        };
        if !report.success {
            report.error = report.probe.error.clone();
            report.error_kind = report.probe.error_kind;
            warn!("Attach of {} stopped: target unreachable", id);
            return Ok(report);
        }

        let snapshot = self.store.snapshot().await?;
        let pushed = broker::with_connection(
            &descriptor,
            self.store.connection(),
            PushSnapshot { snapshot },
        )
        .await;

        let (schema, migrated) = match pushed {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Attach of {} failed: {}", id, e);
                return Ok(report.fail(&e));
            }
        };

        for log in schema.iter().filter_map(migration_log) {
            self.store.append_log(&log).await?;
        }
        report.schema = schema;

        let migrated = match migrated {
            Ok(result) => result,
            Err(e) => {
                error!("Attach of {} failed: {}", id, e);
                return Ok(report.fail(&e));
            }
        };

        self.store
            .set_status(id, IntegrationStatus::Connected)
            .await?;
        let last_sync = self.store.touch_last_sync(id).await?;
        self.store
            .append_log(&SystemLog::new(
                "integration_attached",
                None,
                json!({
                    "integrationId": id,
                    "name": integration.name,
                    "migrated": migrated.migrated,
                }),
            ))
            .await?;

        info!(
            "Attached {} ({} records pushed)",
            integration.name,
            migrated.migrated.total()
        );
        report.migrate = Some(migrated);
        report.last_sync = Some(last_sync);
        Ok(report)
    }

    /// Disconnect an integration, optionally pulling its data back first.
    ///
    /// The target is scrubbed only after exported data has been imported
    /// locally. The integration row is removed once the target is clean.
    pub async fn detach(&self, id: &str, export: bool) -> Result<DetachReport> {
        let lock = self.lock_for(id);
        let _run = lock.lock().await;

        let integration = self.store.get_integration(id).await?;
        let descriptor = integration.descriptor()?;
        let cfg = self.store.connection();

        info!(
            "Detaching integration {} ({}){}",
            integration.name,
            id,
            if export { " with export" } else { "" }
        );
        let mut report = DetachReport {
            integration_id: id.to_string(),
            success: true,
            imported: None,
            scrubbed: None,
            error: None,
            error_kind: None,
        };

        if export {
            let snapshot = match broker::with_connection(&descriptor, cfg, ExportSnapshot).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    error!("Export from {} failed: {}", id, e);
                    return Ok(report.fail(&e));
                }
            };
            report.imported = Some(self.store.import(&snapshot).await?);
        }

        match broker::with_connection(&descriptor, cfg, ScrubTarget).await {
            Ok(scrubbed) => report.scrubbed = Some(scrubbed),
            Err(e) => {
                error!("Scrub of {} failed: {}", id, e);
                return Ok(report.fail(&e));
            }
        }

        self.store.delete_integration(id).await?;
        self.store
            .append_log(&SystemLog::new(
                "integration_detached",
                None,
                json!({
                    "integrationId": id,
                    "name": integration.name,
                    "exported": report.imported.as_ref().map(|r| r.migrated),
                    "scrubbedRows": report.scrubbed.as_ref().map(ScrubResult::total),
                }),
            ))
            .await?;

        info!("Detached {}", integration.name);
        Ok(report)
    }

    /// All integrations in the local store.
    pub async fn integrations(&self) -> Result<Vec<Integration>> {
        self.store.list_integrations().await
    }
}

/// Reconcile the target, then migrate into it if every table is usable.
struct PushSnapshot {
    snapshot: Snapshot,
}

#[async_trait]
impl UnitOfWork for PushSnapshot {
    type Output = (Vec<ReconcileResult>, Result<MigrateResult>);

    async fn run(self, handle: &mut Handle) -> Result<Self::Output> {
        let schema = reconcile::reconcile_all(handle).await;
        if let Some(failed) = schema.iter().find(|r| !r.success) {
            let err = SyncError::drift(
                failed.table.clone(),
                failed.error.clone().unwrap_or_default(),
            );
            return Ok((schema, Err(err)));
        }
        let migrated = orchestrator::migrate(&self.snapshot, handle).await;
        Ok((schema, migrated))
    }
}

struct ExportSnapshot;

#[async_trait]
impl UnitOfWork for ExportSnapshot {
    type Output = Snapshot;

    async fn run(self, handle: &mut Handle) -> Result<Snapshot> {
        orchestrator::export(handle).await
    }
}

struct ScrubTarget;

#[async_trait]
impl UnitOfWork for ScrubTarget {
    type Output = ScrubResult;

    async fn run(self, handle: &mut Handle) -> Result<ScrubResult> {
        orchestrator::scrub(handle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;

    #[test]
    fn test_lock_is_shared_per_integration() {
        let service = SyncService::new(LocalStore::new(
            "/tmp/unused.db",
            ConnectionConfig::default(),
        ));
        let a = service.lock_for("a1");
        let again = service.lock_for("a1");
        let b = service.lock_for("b1");
        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_idle_locks_are_pruned() {
        let service = SyncService::new(LocalStore::new(
            "/tmp/unused.db",
            ConnectionConfig::default(),
        ));
        for id in ["a1", "b1", "c1"] {
            drop(service.lock_for(id));
        }
        let held = service.lock_for("d1");
        let _other = service.lock_for("e1");
        assert_eq!(service.locks.lock().unwrap().len(), 2);

        drop(held);
        let _again = service.lock_for("e1");
        let locks = service.locks.lock().unwrap();
        assert_eq!(locks.len(), 1);
        assert!(locks.contains_key("e1"));
    }

    #[test]
    fn test_attach_report_failure_fields() {
        let report = AttachReport {
            integration_id: "a1".into(),
            success: true,
            probe: ProbeResult {
                success: true,
                message: None,
                error: None,
                error_kind: None,
                details: None,
                created: false,
            },
            schema: Vec::new(),
            migrate: None,
            last_sync: None,
            error: None,
            error_kind: None,
        }
        .fail(&SyncError::drift("users", "copy failed"));

        assert!(!report.success);
        assert_eq!(report.error_kind, Some(ErrorKind::SchemaDriftError));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["integrationId"], "a1");
        assert_eq!(json["errorKind"], "SchemaDriftError");
    }
}
