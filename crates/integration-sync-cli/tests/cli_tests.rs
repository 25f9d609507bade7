//! CLI integration tests for integration-sync.
//!
//! These tests verify command-line argument parsing, help output, exit
//! codes, and a full local round trip against temporary SQLite files.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

/// Get a command for the integration-sync binary.
fn cmd() -> Command {
    Command::cargo_bin("integration-sync").unwrap()
}

/// Write a config whose local store lives in `dir`.
fn config_in(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("config.yaml");
    let local = dir.path().join("local.db");
    std::fs::write(
        &path,
        format!("local:\n  path: {}\nconnection:\n  connect_timeout_secs: 5\n", local.display()),
    )
    .unwrap();
    path
}

fn s(path: &Path) -> &str {
    path.to_str().unwrap()
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("test-connection"))
        .stdout(predicate::str::contains("setup-schema"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("scrub"))
        .stdout(predicate::str::contains("init-local"))
        .stdout(predicate::str::contains("attach"))
        .stdout(predicate::str::contains("detach"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("integration-sync"));
}

#[test]
fn test_export_subcommand_help() {
    cmd()
        .args(["export", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--output"))
        .stdout(predicate::str::contains("--import"))
        .stdout(predicate::str::contains("--sqlite"));
}

#[test]
fn test_detach_subcommand_help() {
    cmd()
        .args(["detach", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--no-export"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flags_exist() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_2() {
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "list"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn test_invalid_yaml_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "list"])
        .assert()
        .code(2);
}

#[test]
fn test_invalid_target_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "target:").unwrap();
    writeln!(file, "  dialect: postgresql").unwrap();
    writeln!(file, "  database: recorder").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "test-connection"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_target_exits_with_code_2() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    cmd()
        .args(["--config", s(&config), "setup-schema"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no target configured"));
}

#[test]
fn test_scrub_requires_confirmation() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let target = dir.path().join("target.db");

    cmd()
        .args(["--config", s(&config), "scrub", "--sqlite", s(&target)])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn test_malformed_target_exits_with_code_3() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let target = dir.path().join("garbage.db");
    std::fs::write(&target, "not a database\n".repeat(100)).unwrap();

    cmd()
        .args([
            "--config",
            s(&config),
            "--output-json",
            "test-connection",
            "--sqlite",
            s(&target),
        ])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("\"errorKind\": \"MalformedFile\""));
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

// =============================================================================
// Workflow Tests
// =============================================================================

#[test]
fn test_connection_creates_sqlite_target() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let target = dir.path().join("fresh.db");

    cmd()
        .args(["--config", s(&config), "test-connection", "--sqlite", s(&target)])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created new SQLite database"));
    assert!(target.exists());
}

#[test]
fn test_setup_schema_twice() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let target = dir.path().join("target.db");

    cmd()
        .args(["--config", s(&config), "setup-schema", "--sqlite", s(&target)])
        .assert()
        .success()
        .stdout(predicate::str::contains("created"));

    cmd()
        .args(["--config", s(&config), "setup-schema", "--sqlite", s(&target)])
        .assert()
        .success()
        .stdout(predicate::str::contains("exists"))
        .stdout(predicate::str::contains("created").not());
}

#[test]
fn test_init_migrate_export_scrub() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let target = dir.path().join("target.db");
    let dump = dir.path().join("dump.json");

    cmd()
        .args([
            "--config",
            s(&config),
            "init-local",
            "--admin-user",
            "admin",
            "--admin-password",
            "change-me",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Admin: admin"));

    cmd()
        .args([
            "--config",
            s(&config),
            "--output-json",
            "migrate",
            "--sqlite",
            s(&target),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"users\": 1"))
        .stdout(predicate::str::contains("\"partialWriteRisk\": true"));

    cmd()
        .args([
            "--config",
            s(&config),
            "export",
            "--sqlite",
            s(&target),
            "--output",
            s(&dump),
        ])
        .assert()
        .success();
    let exported = std::fs::read_to_string(&dump).unwrap();
    assert!(exported.contains("\"username\": \"admin\""));
    assert!(exported.contains("database_reset"));

    cmd()
        .args([
            "--config",
            s(&config),
            "scrub",
            "--sqlite",
            s(&target),
            "--yes",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("users: 1 rows deleted"));
}

#[test]
fn test_attach_and_detach() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let target = dir.path().join("remote.db");

    cmd()
        .args([
            "--config",
            s(&config),
            "init-local",
            "--admin-user",
            "admin",
            "--admin-password",
            "change-me",
        ])
        .assert()
        .success();

    let output = cmd()
        .args([
            "--config",
            s(&config),
            "add-integration",
            "--name",
            "remote",
            "--sqlite",
            s(&target),
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let id = String::from_utf8(output.stdout).unwrap().trim().to_string();
    assert!(!id.is_empty());

    cmd()
        .args(["--config", s(&config), "attach", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Attached"));

    cmd()
        .args(["--config", s(&config), "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("connected"));

    cmd()
        .args(["--config", s(&config), "detach", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Detached"));

    cmd()
        .args(["--config", s(&config), "attach", &id])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Not found"));
}
