//! Schema reconciler: make live tables match their required shapes.
//!
//! Per table:
//!
//! 1. Introspect live columns.
//! 2. Absent: create it (`created`).
//! 3. Present: diff it. No drift: `exists`.
//! 4. Drift: repair by backup, drop, recreate, copy (`migrated`). If the
//!    backup cannot be taken the original is left untouched
//!    (`backup_failed`).
//!
//! The repair steps are not wrapped in a transaction; the backup table is
//! the recovery mechanism. Each table is reconciled independently and a
//! failure on one never stops the others.

pub mod diff;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

pub use diff::{normalize_type, types_match, ColumnDrift};

use crate::broker::Handle;
use crate::core::schema::{LiveColumn, TableShape};
use crate::core::traits::Dialect;
use crate::error::SyncError;
use crate::model::shapes::ALL_SHAPES;

/// Terminal outcome for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    /// Live table already matched.
    Exists,
    /// Table was absent and has been created.
    Created,
    /// Drift was repaired; the pre-repair data is kept in the backup table.
    Migrated,
    /// The backup could not be taken; the original table is untouched.
    BackupFailed,
    /// Introspection, creation, or a repair step after the backup failed.
    Failed,
}

/// One step of the drift repair sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStep {
    Inspect,
    Create,
    Backup,
    Drop,
    Recreate,
    Copy,
}

/// Progress of a drift repair.
///
/// Each transition performs exactly one statement; the backup name is
/// carried from the moment it exists so any later failure can report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairState {
    Drifted,
    BackedUp { backup: String },
    Dropped { backup: String },
    Recreated { backup: String },
    Copied { backup: String, rows: u64 },
}

impl RepairState {
    /// The step that moves this state forward, or `None` when done.
    pub fn next_step(&self) -> Option<RepairStep> {
        match self {
            RepairState::Drifted => Some(RepairStep::Backup),
            RepairState::BackedUp { .. } => Some(RepairStep::Drop),
            RepairState::Dropped { .. } => Some(RepairStep::Recreate),
            RepairState::Recreated { .. } => Some(RepairStep::Copy),
            RepairState::Copied { .. } => None,
        }
    }

    pub fn backup(&self) -> Option<&str> {
        match self {
            RepairState::Drifted => None,
            RepairState::BackedUp { backup }
            | RepairState::Dropped { backup }
            | RepairState::Recreated { backup }
            | RepairState::Copied { backup, .. } => Some(backup),
        }
    }
}

/// Per-table reconcile report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResult {
    pub table: String,
    pub action: ReconcileAction,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<RepairStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drift: Vec<ColumnDrift>,
    /// Rows copied back from the backup during a repair.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_copied: Option<u64>,
}

impl ReconcileResult {
    fn ok(table: &str, action: ReconcileAction) -> Self {
        Self {
            table: table.to_string(),
            action,
            success: true,
            backup_table: None,
            failed_step: None,
            error: None,
            drift: Vec::new(),
            rows_copied: None,
        }
    }

    fn failed(table: &str, action: ReconcileAction, step: RepairStep, err: &SyncError) -> Self {
        Self {
            success: false,
            failed_step: Some(step),
            error: Some(err.to_string()),
            ..Self::ok(table, action)
        }
    }
}

/// Reconcile all five entity tables, in write order.
pub async fn reconcile_all(handle: &mut Handle) -> Vec<ReconcileResult> {
    reconcile_shapes(handle, &ALL_SHAPES).await
}

/// Reconcile each shape independently.
pub async fn reconcile_shapes(handle: &mut Handle, shapes: &[&TableShape]) -> Vec<ReconcileResult> {
    let mut results = Vec::with_capacity(shapes.len());
    for shape in shapes {
        results.push(reconcile_table(handle, shape).await);
    }
    results
}

/// Bring one table in line with `shape`.
pub async fn reconcile_table(handle: &mut Handle, shape: &TableShape) -> ReconcileResult {
    reconcile_table_with(handle, shape, backup_table_name).await
}

/// Like [`reconcile_table`], naming any repair backup with `backup_name`.
pub async fn reconcile_table_with(
    handle: &mut Handle,
    shape: &TableShape,
    backup_name: fn(&str) -> String,
) -> ReconcileResult {
    let table = shape.name;

    let live = match handle.introspect(table).await {
        Ok(live) => live,
        Err(e) => {
            error!("{}: introspection failed: {}", table, e);
            return ReconcileResult::failed(table, ReconcileAction::Failed, RepairStep::Inspect, &e);
        }
    };

    let Some(live) = live else {
        let ddl = handle.dialect().build_create_table(shape);
        return match handle.execute(&ddl, &[]).await {
            Ok(_) => {
                info!("{}: created", table);
                ReconcileResult::ok(table, ReconcileAction::Created)
            }
            Err(e) => {
                error!("{}: create failed: {}", table, e);
                ReconcileResult::failed(table, ReconcileAction::Failed, RepairStep::Create, &e)
            }
        };
    };

    let drift = diff::diff_columns(handle.dialect(), shape, &live);
    if drift.is_empty() {
        info!("{}: exists", table);
        return ReconcileResult::ok(table, ReconcileAction::Exists);
    }

    warn!(
        "{}: schema drift on {}; repairing",
        table,
        drift
            .iter()
            .map(ColumnDrift::column)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut result = match repair(handle, shape, &live, backup_name(table)).await {
        Ok(RepairState::Copied { backup, rows }) => {
            info!("{}: migrated ({} rows kept, backup {})", table, rows, backup);
            ReconcileResult {
                backup_table: Some(backup),
                rows_copied: Some(rows),
                ..ReconcileResult::ok(table, ReconcileAction::Migrated)
            }
        }
        Ok(state) => {
            // repair() only returns once no step remains
            let err = SyncError::drift(table, format!("repair stopped early in {:?}", state));
            ReconcileResult {
                backup_table: state.backup().map(str::to_string),
                ..ReconcileResult::failed(table, ReconcileAction::Failed, RepairStep::Copy, &err)
            }
        }
        Err((state, step, e)) => {
            let action = if step == RepairStep::Backup {
                ReconcileAction::BackupFailed
            } else {
                ReconcileAction::Failed
            };
            match state.backup() {
                Some(backup) => error!(
                    "{}: repair failed at {:?}; data preserved in {}: {}",
                    table, step, backup, e
                ),
                None => error!("{}: backup failed, table left untouched: {}", table, e),
            }
            ReconcileResult {
                backup_table: state.backup().map(str::to_string),
                ..ReconcileResult::failed(table, action, step, &e)
            }
        }
    };
    result.drift = drift;
    result
}

type RepairError = (RepairState, RepairStep, SyncError);

/// Drive the repair state machine to `Copied`.
async fn repair(
    handle: &mut Handle,
    shape: &TableShape,
    live: &[LiveColumn],
    backup_name: String,
) -> std::result::Result<RepairState, RepairError> {
    let table = shape.name;
    let mut state = RepairState::Drifted;

    while let Some(step) = state.next_step() {
        let sql = match (&state, step) {
            (RepairState::Drifted, _) => handle.dialect().build_backup(table, &backup_name),
            (_, RepairStep::Drop) => handle.dialect().build_drop_table(table),
            (_, RepairStep::Recreate) => handle.dialect().build_create_table(shape),
            (RepairState::Recreated { backup }, RepairStep::Copy) => {
                let columns = diff::common_columns(shape, live);
                handle.dialect().build_copy(backup, table, &columns)
            }
            _ => unreachable!("next_step() pairs every state with its own step"),
        };

        let affected = match handle.execute(&sql, &[]).await {
            Ok(n) => n,
            Err(e) => return Err((state, step, e)),
        };

        state = match state {
            RepairState::Drifted => RepairState::BackedUp {
                backup: backup_name.clone(),
            },
            RepairState::BackedUp { backup } => RepairState::Dropped { backup },
            RepairState::Dropped { backup } => RepairState::Recreated { backup },
            RepairState::Recreated { backup } => RepairState::Copied {
                backup,
                rows: affected,
            },
            done @ RepairState::Copied { .. } => done,
        };
    }

    Ok(state)
}

/// `{table}_backup_{YYYYmmddHHMMSSmmm}` in UTC.
pub fn backup_table_name(table: &str) -> String {
    format!("{}_backup_{}", table, Utc::now().format("%Y%m%d%H%M%S%3f"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_state_sequence() {
        let backup = "t_backup_1".to_string();
        assert_eq!(RepairState::Drifted.next_step(), Some(RepairStep::Backup));
        assert_eq!(RepairState::Drifted.backup(), None);

        let state = RepairState::BackedUp {
            backup: backup.clone(),
        };
        assert_eq!(state.next_step(), Some(RepairStep::Drop));
        assert_eq!(state.backup(), Some("t_backup_1"));

        let done = RepairState::Copied { backup, rows: 3 };
        assert_eq!(done.next_step(), None);
    }

    #[test]
    fn test_backup_table_name_format() {
        let name = backup_table_name("integrations");
        let suffix = name.strip_prefix("integrations_backup_").unwrap();
        assert_eq!(suffix.len(), 17);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_result_serialization() {
        let err = SyncError::drift("users", "boom");
        let result = ReconcileResult {
            backup_table: Some("users_backup_1".into()),
            ..ReconcileResult::failed("users", ReconcileAction::Failed, RepairStep::Copy, &err)
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["action"], "failed");
        assert_eq!(json["failedStep"], "copy");
        assert_eq!(json["backupTable"], "users_backup_1");
        assert_eq!(json["success"], false);
        assert!(json.get("drift").is_none());
    }
}
