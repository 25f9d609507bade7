//! # integration-sync
//!
//! Mirror a local SQLite store into external SQLite, PostgreSQL or MySQL
//! databases.
//!
//! The library is built from three layers:
//!
//! - **Connection broker** ([`broker`]): short-lived [`Handle`]s behind one
//!   operation surface, with driver errors classified into [`ErrorKind`]
//! - **Schema reconciler** ([`reconcile`]): create missing tables and repair
//!   drifted ones through backup, drop, recreate and copy
//! - **Migration orchestrator** ([`orchestrator`]): idempotent upsert of a
//!   full [`Snapshot`], plus export and scrub
//!
//! [`LocalStore`] and [`SyncService`] build the attach/detach workflow on
//! top of them.
//!
//! ## Example
//!
//! ```rust,no_run
//! use integration_sync::{broker, orchestrator, reconcile, Config, LocalStore};
//!
//! #[tokio::main]
//! async fn main() -> integration_sync::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let store = LocalStore::from_config(&config);
//!     store.ensure_schema().await?;
//!
//!     if let Some(target) = &config.target {
//!         let mut conn = broker::connect(target, &config.connection).await?;
//!         reconcile::reconcile_all(&mut conn.handle).await;
//!         let result = orchestrator::migrate(&store.snapshot().await?, &mut conn.handle).await?;
//!         println!("Migrated {} records", result.migrated.total());
//!         conn.handle.close().await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod reconcile;
pub mod service;
pub mod store;

// Re-exports for convenient access
pub use broker::{connect, test_connection, with_connection, Connected, Handle, ProbeResult};
pub use config::{Config, ConnectionConfig, ConnectionMethod, IntegrationDescriptor, LocalConfig};
pub use self::core::{Dialect, SqlValue, UnitOfWork};
pub use drivers::{DialectImpl, DialectKind};
pub use error::{ErrorKind, Result, SyncError};
pub use model::{
    EntityCounts, Environment, Integration, IntegrationStatus, IntegrationType, SessionStatus,
    Snapshot, SystemLog, TestSession, User, UserRole,
};
pub use orchestrator::{MigrateResult, ScrubResult};
pub use reconcile::{ReconcileAction, ReconcileResult};
pub use service::{AttachReport, DetachReport, SyncService};
pub use store::{AdminSeed, LocalStore};
