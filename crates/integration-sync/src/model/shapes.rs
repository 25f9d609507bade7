//! Required table shapes for the five persisted entities.

use crate::core::schema::{ColumnDefault, ColumnSpec, ColumnType, TableShape};

const NOW: ColumnDefault = ColumnDefault::CurrentTimestamp;
const EMPTY_OBJECT: ColumnDefault = ColumnDefault::Literal("{}");

pub const INTEGRATIONS: TableShape = TableShape {
    name: "integrations",
    columns: &[
        ColumnSpec::new("id", ColumnType::Key).primary_key(),
        ColumnSpec::new("name", ColumnType::Text).not_null(),
        ColumnSpec::new("type", ColumnType::Key).not_null(),
        ColumnSpec::new("status", ColumnType::Key)
            .default_value(ColumnDefault::Literal("disconnected")),
        ColumnSpec::new("config", ColumnType::Json).default_value(EMPTY_OBJECT),
        ColumnSpec::new("last_sync", ColumnType::Timestamp),
        ColumnSpec::new("created_at", ColumnType::Timestamp).default_value(NOW),
        ColumnSpec::new("updated_at", ColumnType::Timestamp).default_value(NOW),
    ],
};

pub const TEST_SESSIONS: TableShape = TableShape {
    name: "test_sessions",
    columns: &[
        ColumnSpec::new("id", ColumnType::Key).primary_key(),
        ColumnSpec::new("integration_id", ColumnType::Key),
        ColumnSpec::new("user_id", ColumnType::Key),
        ColumnSpec::new("status", ColumnType::Key).default_value(ColumnDefault::Literal("pending")),
        ColumnSpec::new("start_time", ColumnType::Timestamp),
        ColumnSpec::new("end_time", ColumnType::Timestamp),
        ColumnSpec::new("results", ColumnType::Json).default_value(EMPTY_OBJECT),
        ColumnSpec::new("logs", ColumnType::Json).default_value(ColumnDefault::Literal("[]")),
        ColumnSpec::new("created_at", ColumnType::Timestamp).default_value(NOW),
    ],
};

pub const USERS: TableShape = TableShape {
    name: "users",
    columns: &[
        ColumnSpec::new("id", ColumnType::Key).primary_key(),
        ColumnSpec::new("username", ColumnType::Key).not_null().unique(),
        ColumnSpec::new("password", ColumnType::Text).not_null(),
        ColumnSpec::new("email", ColumnType::Text),
        ColumnSpec::new("role", ColumnType::Key)
            .default_value(ColumnDefault::Literal("RegularUser")),
        ColumnSpec::new("created_by", ColumnType::Key),
        ColumnSpec::new("created_at", ColumnType::Timestamp).default_value(NOW),
        ColumnSpec::new("updated_at", ColumnType::Timestamp).default_value(NOW),
    ],
};

pub const SYSTEM_LOGS: TableShape = TableShape {
    name: "system_logs",
    columns: &[
        ColumnSpec::new("id", ColumnType::Key).primary_key(),
        ColumnSpec::new("user_id", ColumnType::Key),
        ColumnSpec::new("action", ColumnType::Text).not_null(),
        ColumnSpec::new("details", ColumnType::Json).default_value(EMPTY_OBJECT),
        ColumnSpec::new("timestamp", ColumnType::Timestamp).default_value(NOW),
        ColumnSpec::new("created_at", ColumnType::Timestamp).default_value(NOW),
    ],
};

pub const ENVIRONMENTS: TableShape = TableShape {
    name: "environments",
    columns: &[
        ColumnSpec::new("id", ColumnType::Key).primary_key(),
        ColumnSpec::new("name", ColumnType::Key).not_null().unique(),
        ColumnSpec::new("bindings", ColumnType::Json).default_value(EMPTY_OBJECT),
        ColumnSpec::new("created_at", ColumnType::Timestamp).default_value(NOW),
        ColumnSpec::new("updated_at", ColumnType::Timestamp).default_value(NOW),
    ],
};

/// All shapes in dependency (write) order.
pub const ALL_SHAPES: [&TableShape; 5] = [
    &INTEGRATIONS,
    &TEST_SESSIONS,
    &USERS,
    &SYSTEM_LOGS,
    &ENVIRONMENTS,
];

/// Tables in delete order: children before the rows they reference.
pub const SCRUB_ORDER: [&str; 5] = [
    SYSTEM_LOGS.name,
    TEST_SESSIONS.name,
    ENVIRONMENTS.name,
    USERS.name,
    INTEGRATIONS.name,
];

/// Columns written on insert but never overwritten by an upsert.
pub const IMMUTABLE_COLUMNS: &[&str] = &["created_at"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_shape_has_single_id_key() {
        for shape in ALL_SHAPES {
            assert_eq!(shape.primary_key(), vec!["id"], "{}", shape.name);
        }
    }

    #[test]
    fn test_unique_names() {
        assert!(USERS.column("username").unwrap().unique);
        assert!(ENVIRONMENTS.column("name").unwrap().unique);
    }

    #[test]
    fn test_scrub_order_covers_all_tables() {
        let mut scrub = SCRUB_ORDER.to_vec();
        scrub.sort_unstable();
        let mut all: Vec<_> = ALL_SHAPES.iter().map(|s| s.name).collect();
        all.sort_unstable();
        assert_eq!(scrub, all);
    }
}
