//! Local store and attach/detach workflow, with SQLite files on both sides.

use std::sync::Arc;

use integration_sync::{
    broker, AdminSeed, ConnectionConfig, ErrorKind, Integration, IntegrationDescriptor,
    IntegrationStatus, IntegrationType, LocalStore, SyncError, SyncService,
};
use serde_json::json;
use tempfile::TempDir;

fn seed() -> AdminSeed {
    AdminSeed {
        username: "admin".into(),
        password: "change-me".into(),
        email: Some("admin@example.com".into()),
    }
}

async fn fresh_store(dir: &TempDir) -> LocalStore {
    let store = LocalStore::new(dir.path().join("local.db"), ConnectionConfig::default());
    store.reset(&seed()).await.unwrap();
    store
}

fn target(dir: &TempDir, name: &str) -> IntegrationDescriptor {
    IntegrationDescriptor::sqlite(dir.path().join(name).to_string_lossy())
}

async fn target_count(descriptor: &IntegrationDescriptor, table: &str) -> i64 {
    let mut conn = broker::connect(descriptor, &ConnectionConfig::default())
        .await
        .unwrap();
    let count = conn.handle.count(table).await.unwrap();
    conn.handle.close().await.unwrap();
    count
}

#[tokio::test]
async fn test_reset_seeds_admin_and_log() {
    let dir = TempDir::new().unwrap();
    let store = fresh_store(&dir).await;

    let snapshot = store.snapshot().await.unwrap();
    assert_eq!(snapshot.users.len(), 1);
    assert_eq!(snapshot.users[0].username, "admin");
    assert_eq!(snapshot.system_logs.len(), 1);
    assert_eq!(snapshot.system_logs[0].action, "database_reset");
    assert!(snapshot.integrations.is_empty());

    // A second reset starts over rather than accumulating.
    store.reset(&seed()).await.unwrap();
    assert_eq!(store.snapshot().await.unwrap().total(), 2);
}

#[tokio::test]
async fn test_integration_crud() {
    let dir = TempDir::new().unwrap();
    let store = fresh_store(&dir).await;

    let integration = Integration::new("vpn", IntegrationType::Vpn, json!({}));
    store.insert_integration(&integration).await.unwrap();

    let loaded = store.get_integration(&integration.id).await.unwrap();
    assert_eq!(loaded, integration);

    store
        .set_status(&integration.id, IntegrationStatus::Connected)
        .await
        .unwrap();
    let stamp = store.touch_last_sync(&integration.id).await.unwrap();
    let loaded = store.get_integration(&integration.id).await.unwrap();
    assert_eq!(loaded.status, IntegrationStatus::Connected);
    assert_eq!(loaded.last_sync.as_deref(), Some(stamp.as_str()));

    store.delete_integration(&integration.id).await.unwrap();
    assert!(matches!(
        store.get_integration(&integration.id).await,
        Err(SyncError::NotFound(_))
    ));
    assert!(matches!(
        store.delete_integration(&integration.id).await,
        Err(SyncError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_attach_pushes_local_data() {
    let dir = TempDir::new().unwrap();
    let store = fresh_store(&dir).await;
    let descriptor = target(&dir, "remote.db");
    let integration = Integration::database("remote", &descriptor).unwrap();
    store.insert_integration(&integration).await.unwrap();

    let service = SyncService::new(store);
    let report = service.attach(&integration.id).await.unwrap();
    assert!(report.success, "{:?}", report);
    assert!(report.probe.created);
    assert_eq!(report.schema.len(), 5);
    let migrated = report.migrate.unwrap().migrated;
    assert_eq!(migrated.integrations, 1);
    assert_eq!(migrated.users, 1);
    assert!(report.last_sync.is_some());

    assert_eq!(target_count(&descriptor, "users").await, 1);
    assert_eq!(target_count(&descriptor, "integrations").await, 1);

    let local = service.store().get_integration(&integration.id).await.unwrap();
    assert_eq!(local.status, IntegrationStatus::Connected);
    assert_eq!(local.last_sync, report.last_sync);

    let logs = service.store().snapshot().await.unwrap().system_logs;
    assert!(logs.iter().any(|l| l.action == "integration_attached"));

    // Re-attaching the same integration is a re-sync, not a conflict.
    let again = service.attach(&integration.id).await.unwrap();
    assert!(again.success);
    assert_eq!(target_count(&descriptor, "integrations").await, 1);
}

#[tokio::test]
async fn test_only_one_integration_connected() {
    let dir = TempDir::new().unwrap();
    let store = fresh_store(&dir).await;
    let first = Integration::database("first", &target(&dir, "one.db")).unwrap();
    let second = Integration::database("second", &target(&dir, "two.db")).unwrap();
    store.insert_integration(&first).await.unwrap();
    store.insert_integration(&second).await.unwrap();

    let service = SyncService::new(store);
    assert!(service.attach(&first.id).await.unwrap().success);

    let err = service.attach(&second.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigError);
    assert!(err.to_string().contains("already connected"));
}

#[tokio::test]
async fn test_only_database_integrations_attach() {
    let dir = TempDir::new().unwrap();
    let store = fresh_store(&dir).await;
    let proxy = Integration::new("proxy", IntegrationType::Proxy, json!({}));
    store.insert_integration(&proxy).await.unwrap();

    let service = SyncService::new(store);
    let err = service.attach(&proxy.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigError);
}

#[tokio::test]
async fn test_unreachable_target_is_reported() {
    let dir = TempDir::new().unwrap();
    let store = fresh_store(&dir).await;
    let descriptor = IntegrationDescriptor {
        host: Some("127.0.0.1".into()),
        port: Some(1),
        username: Some("app".into()),
        ..IntegrationDescriptor::sqlite("recorder")
    };
    let descriptor = IntegrationDescriptor {
        dialect: integration_sync::DialectKind::Postgresql,
        ..descriptor
    };
    let integration = Integration::database("pg", &descriptor).unwrap();
    store.insert_integration(&integration).await.unwrap();

    let service = SyncService::new(store);
    let report = service.attach(&integration.id).await.unwrap();
    assert!(!report.success);
    assert_eq!(report.error_kind, Some(ErrorKind::ConnectivityError));

    let local = service.store().get_integration(&integration.id).await.unwrap();
    assert_eq!(local.status, IntegrationStatus::Disconnected);
}

#[tokio::test]
async fn test_detach_with_export_scrubs_target() {
    let dir = TempDir::new().unwrap();
    let store = fresh_store(&dir).await;
    let descriptor = target(&dir, "remote.db");
    let integration = Integration::database("remote", &descriptor).unwrap();
    store.insert_integration(&integration).await.unwrap();

    let service = Arc::new(SyncService::new(store));
    let attached = service.spawn_attach(integration.id.clone()).await.unwrap().unwrap();
    assert!(attached.success);

    let report = service
        .spawn_detach(integration.id.clone(), true)
        .await
        .unwrap()
        .unwrap();
    assert!(report.success, "{:?}", report);
    assert_eq!(report.imported.unwrap().migrated.users, 1);
    assert!(report.scrubbed.unwrap().total() > 0);

    for table in ["integrations", "users", "system_logs"] {
        assert_eq!(target_count(&descriptor, table).await, 0);
    }

    let local = service.store().snapshot().await.unwrap();
    assert!(local.integrations.is_empty());
    assert_eq!(local.users.len(), 1);
    assert!(local
        .system_logs
        .iter()
        .any(|l| l.action == "integration_detached"));
}

#[tokio::test]
async fn test_concurrent_attach_runs_are_serialized() {
    let dir = TempDir::new().unwrap();
    let store = fresh_store(&dir).await;
    let descriptor = target(&dir, "remote.db");
    let integration = Integration::database("remote", &descriptor).unwrap();
    store.insert_integration(&integration).await.unwrap();

    let service = Arc::new(SyncService::new(store));
    let a = service.spawn_attach(integration.id.clone());
    let b = service.spawn_attach(integration.id.clone());

    assert!(a.await.unwrap().unwrap().success);
    assert!(b.await.unwrap().unwrap().success);
    assert_eq!(target_count(&descriptor, "integrations").await, 1);
}
