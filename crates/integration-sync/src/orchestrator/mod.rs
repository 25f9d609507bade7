//! Migration orchestrator: copy a snapshot of all five entities into a
//! destination, read it back out, or clear it.
//!
//! Records are written in dependency order (integrations, sessions, users,
//! logs, environments). Client-server dialects write the whole snapshot in
//! one transaction; SQLite upserts statement by statement, so a failure part
//! way through leaves earlier rows committed and is reported as a partial
//! write.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::broker::Handle;
use crate::core::traits::{Dialect, UnitOfWork};
use crate::core::value::{Row, SqlValue};
use crate::drivers::DialectImpl;
use crate::error::{Result, SyncError};
use crate::model::shapes::{IMMUTABLE_COLUMNS, SCRUB_ORDER};
use crate::model::{
    Entity, EntityCounts, Environment, Integration, Snapshot, SystemLog, TestSession, User,
    WriteMode,
};

/// Result of a [`migrate`] run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateResult {
    pub success: bool,
    /// Records written per entity.
    pub migrated: EntityCounts,
    /// True when the destination writes without an enclosing transaction.
    pub partial_write_risk: bool,
}

/// Rows removed from one table by [`scrub`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRows {
    pub table: String,
    pub rows: u64,
}

/// Result of a [`scrub`] run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrubResult {
    pub success: bool,
    pub deleted: Vec<TableRows>,
    /// Tables that do not exist on the destination.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

impl ScrubResult {
    pub fn total(&self) -> u64 {
        self.deleted.iter().map(|t| t.rows).sum()
    }
}

/// Write progress, kept so a non-transactional failure can say how far it got.
#[derive(Debug, Default)]
struct Progress {
    counts: EntityCounts,
    written: usize,
    table: &'static str,
}

/// Upsert every record of `snapshot` into the destination behind `handle`.
///
/// Running this twice with the same snapshot leaves row counts unchanged.
pub async fn migrate(snapshot: &Snapshot, handle: &mut Handle) -> Result<MigrateResult> {
    let partial_write_risk = !handle.dialect().transactional_writes();

    if snapshot.is_empty() {
        info!("Snapshot is empty, nothing to migrate to {}", handle.label());
        return Ok(MigrateResult {
            success: true,
            migrated: EntityCounts::default(),
            partial_write_risk,
        });
    }

    info!(
        "Migrating {} records to {} ({})",
        snapshot.total(),
        handle.label(),
        handle.dialect().name()
    );

    let migrated = if partial_write_risk {
        let mut progress = Progress::default();
        if let Err(e) = write_snapshot(handle, snapshot, &mut progress).await {
            warn!(
                "Write to {} failed after {} rows; earlier rows stay committed",
                progress.table, progress.written
            );
            return Err(SyncError::PartialWrite {
                table: progress.table.to_string(),
                written: progress.written,
                source: Box::new(e),
            });
        }
        progress.counts
    } else {
        handle.transaction(WriteSnapshot { snapshot }).await?
    };

    info!(
        "Migrated {} integrations, {} sessions, {} users, {} logs, {} environments",
        migrated.integrations,
        migrated.test_sessions,
        migrated.users,
        migrated.system_logs,
        migrated.environments
    );

    Ok(MigrateResult {
        success: true,
        migrated,
        partial_write_risk,
    })
}

/// The whole snapshot as one unit of work, for use inside a transaction.
struct WriteSnapshot<'a> {
    snapshot: &'a Snapshot,
}

#[async_trait]
impl UnitOfWork for WriteSnapshot<'_> {
    type Output = EntityCounts;

    async fn run(self, handle: &mut Handle) -> Result<EntityCounts> {
        let mut progress = Progress::default();
        write_snapshot(handle, self.snapshot, &mut progress).await?;
        Ok(progress.counts)
    }
}

async fn write_snapshot(
    handle: &mut Handle,
    snapshot: &Snapshot,
    progress: &mut Progress,
) -> Result<()> {
    let n = write_entities(handle, &snapshot.integrations, progress).await?;
    progress.counts.integrations = n;
    let n = write_entities(handle, &snapshot.test_sessions, progress).await?;
    progress.counts.test_sessions = n;
    let n = write_entities(handle, &snapshot.users, progress).await?;
    progress.counts.users = n;
    let n = write_entities(handle, &snapshot.system_logs, progress).await?;
    progress.counts.system_logs = n;
    let n = write_entities(handle, &snapshot.environments, progress).await?;
    progress.counts.environments = n;
    Ok(())
}

/// Write statement for an entity, chosen by its write mode.
fn write_statement<E: Entity>(dialect: &DialectImpl) -> String {
    let shape = E::SHAPE;
    let columns = shape.column_names();
    match E::WRITE_MODE {
        WriteMode::Upsert => {
            dialect.build_upsert(shape.name, &columns, &shape.primary_key(), IMMUTABLE_COLUMNS)
        }
        WriteMode::InsertIgnore => dialect.build_insert_ignore(shape.name, &columns),
    }
}

async fn write_entities<E: Entity>(
    handle: &mut Handle,
    records: &[E],
    progress: &mut Progress,
) -> Result<usize> {
    let table = E::SHAPE.name;
    progress.table = table;
    if records.is_empty() {
        return Ok(0);
    }

    let sql = write_statement::<E>(handle.dialect());
    for record in records {
        let row = record.to_row()?;
        handle
            .execute(&sql, &row)
            .await
            .map_err(|e| SyncError::write(table, record.id(), e))?;
        progress.written += 1;
    }

    debug!("{}: wrote {} records", table, records.len());
    Ok(records.len())
}

/// Read all five tables into a snapshot.
///
/// Tables that do not exist yield empty lists; columns that do not exist
/// read as NULL and take their entity default.
pub async fn export(handle: &mut Handle) -> Result<Snapshot> {
    let snapshot = Snapshot {
        integrations: read_entities::<Integration>(handle).await?,
        test_sessions: read_entities::<TestSession>(handle).await?,
        users: read_entities::<User>(handle).await?,
        system_logs: read_entities::<SystemLog>(handle).await?,
        environments: read_entities::<Environment>(handle).await?,
    };
    info!("Exported {} records from {}", snapshot.total(), handle.label());
    Ok(snapshot)
}

pub(crate) async fn read_entities<E: Entity>(handle: &mut Handle) -> Result<Vec<E>> {
    let shape = E::SHAPE;
    let Some(live) = handle.introspect(shape.name).await? else {
        debug!("{}: table absent, exporting nothing", shape.name);
        return Ok(Vec::new());
    };

    let present: Vec<&'static str> = shape
        .column_names()
        .into_iter()
        .filter(|name| live.iter().any(|c| c.name.eq_ignore_ascii_case(name)))
        .collect();

    let key = shape
        .primary_key()
        .first()
        .copied()
        .filter(|k| present.contains(k))
        .ok_or_else(|| SyncError::drift(shape.name, "primary key column is missing"))?;

    let sql = handle
        .dialect()
        .build_select_text(shape.name, &present, key);
    let rows = handle.query(&sql, &[]).await?;

    rows.into_iter()
        .map(|row| E::from_row(spread_row(&shape.column_names(), &present, row)))
        .collect()
}

/// Lay out `row` (values for `present`, in order) over the full column list,
/// filling absent columns with NULL.
fn spread_row(all: &[&str], present: &[&str], row: Row) -> Row {
    let mut values = row.into_iter();
    all.iter()
        .map(|name| {
            if present.contains(name) {
                values.next().unwrap_or(SqlValue::Null)
            } else {
                SqlValue::Null
            }
        })
        .collect()
}

/// Delete every row from the five tables, children first.
pub async fn scrub(handle: &mut Handle) -> Result<ScrubResult> {
    let result = handle.transaction(ScrubTables).await?;
    info!(
        "Scrubbed {} rows from {} ({} tables absent)",
        result.total(),
        handle.label(),
        result.skipped.len()
    );
    Ok(result)
}

struct ScrubTables;

#[async_trait]
impl UnitOfWork for ScrubTables {
    type Output = ScrubResult;

    async fn run(self, handle: &mut Handle) -> Result<ScrubResult> {
        let mut deleted = Vec::new();
        let mut skipped = Vec::new();

        for table in SCRUB_ORDER {
            if handle.introspect(table).await?.is_none() {
                skipped.push(table.to_string());
                continue;
            }
            let sql = handle.dialect().build_delete_all(table);
            let rows = handle.execute(&sql, &[]).await?;
            debug!("{}: deleted {} rows", table, rows);
            deleted.push(TableRows {
                table: table.to_string(),
                rows,
            });
        }

        Ok(ScrubResult {
            success: true,
            deleted,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::DialectKind;

    #[test]
    fn test_logs_use_insert_ignore() {
        let sqlite = DialectImpl::for_kind(DialectKind::Sqlite);
        let sql = write_statement::<SystemLog>(&sqlite);
        assert!(sql.starts_with("INSERT OR IGNORE INTO \"system_logs\""));

        let pg = DialectImpl::for_kind(DialectKind::Postgresql);
        let sql = write_statement::<SystemLog>(&pg);
        assert!(sql.ends_with("ON CONFLICT DO NOTHING"));
    }

    #[test]
    fn test_upsert_never_overwrites_created_at() {
        let pg = DialectImpl::for_kind(DialectKind::Postgresql);
        let sql = write_statement::<Integration>(&pg);
        assert!(sql.contains("ON CONFLICT (\"id\") DO UPDATE SET"));
        assert!(sql.contains("\"updated_at\" = EXCLUDED.\"updated_at\""));
        assert!(!sql.contains("\"created_at\" = EXCLUDED"));
    }

    #[test]
    fn test_spread_row_fills_absent_columns() {
        let row = spread_row(
            &["id", "name", "last_sync"],
            &["id", "last_sync"],
            vec![SqlValue::from("a1"), SqlValue::from("2024-01-01T00:00:00Z")],
        );
        assert_eq!(
            row,
            vec![
                SqlValue::from("a1"),
                SqlValue::Null,
                SqlValue::from("2024-01-01T00:00:00Z"),
            ]
        );
    }

    #[test]
    fn test_migrate_result_shape() {
        let result = MigrateResult {
            success: true,
            migrated: EntityCounts {
                integrations: 1,
                ..Default::default()
            },
            partial_write_risk: true,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["partialWriteRisk"], true);
        assert_eq!(json["migrated"]["integrations"], 1);
        assert_eq!(json["migrated"]["test_sessions"], 0);
    }
}
