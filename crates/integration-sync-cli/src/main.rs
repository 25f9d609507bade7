//! integration-sync CLI - mirror the local store into external databases.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use integration_sync::{
    broker, orchestrator, reconcile, AdminSeed, Config, Integration, IntegrationDescriptor,
    LocalStore, ReconcileResult, Snapshot, SyncError, SyncService,
};
use serde::Serialize;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "integration-sync")]
#[command(about = "Mirror a local SQLite store into SQLite, PostgreSQL or MySQL databases")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file [default: config.yaml, if present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

/// Which external database a command talks to.
#[derive(Args)]
struct TargetArgs {
    /// Use this SQLite file instead of the configured target
    #[arg(long, value_name = "PATH")]
    sqlite: Option<PathBuf>,
}

impl TargetArgs {
    fn descriptor(&self, config: &Config) -> Result<IntegrationDescriptor, SyncError> {
        match (&self.sqlite, &config.target) {
            (Some(path), _) => Ok(IntegrationDescriptor::sqlite(path.to_string_lossy())),
            (None, Some(target)) => Ok(target.clone()),
            (None, None) => Err(SyncError::Config(
                "no target configured; add a `target` section or pass --sqlite".to_string(),
            )),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Test the connection to the target database
    TestConnection {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Create or repair the five tables on the target database
    SetupSchema {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Push the local store into the target database
    Migrate {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Read every record from the target database
    Export {
        #[command(flatten)]
        target: TargetArgs,

        /// Write the snapshot to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Upsert the exported records into the local store
        #[arg(long)]
        import: bool,
    },

    /// Delete every row from the five tables on the target database
    Scrub {
        #[command(flatten)]
        target: TargetArgs,

        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Recreate the local store with a single admin account
    InitLocal {
        /// Admin username
        #[arg(long)]
        admin_user: String,

        /// Admin password
        #[arg(long)]
        admin_password: String,

        /// Admin email
        #[arg(long)]
        admin_email: Option<String>,
    },

    /// Register the target database as an integration in the local store
    AddIntegration {
        /// Display name
        #[arg(long)]
        name: String,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// List integrations in the local store
    List,

    /// Connect an integration and push the local store into it
    Attach {
        /// Integration id
        id: String,
    },

    /// Disconnect an integration, pulling its data back first
    Detach {
        /// Integration id
        id: String,

        /// Scrub the target without importing its data
        #[arg(long)]
        no_export: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, SyncError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = load_config(cli.config.as_deref())?;
    let json = cli.output_json;

    match cli.command {
        Commands::TestConnection { target } => {
            let descriptor = target.descriptor(&config)?;
            let probe = broker::test_connection(&descriptor, &config.connection).await;

            if json {
                print_json(&probe)?;
            } else if probe.success {
                println!("OK: {}", probe.message.as_deref().unwrap_or_default());
            } else {
                println!("FAILED: {}", probe.message.as_deref().unwrap_or_default());
                if let Some(kind) = probe.error_kind {
                    println!("  Kind: {}", kind);
                }
                if let Some(err) = &probe.error {
                    println!("  Error: {}", err);
                }
            }

            Ok(match probe.error_kind {
                Some(kind) if !probe.success => ExitCode::from(kind.exit_code()),
                _ => ExitCode::SUCCESS,
            })
        }

        Commands::SetupSchema { target } => {
            let descriptor = target.descriptor(&config)?;
            let mut conn = broker::connect(&descriptor, &config.connection).await?;
            let results = reconcile::reconcile_all(&mut conn.handle).await;
            conn.handle.close().await?;

            if json {
                print_json(&results)?;
            } else {
                print_schema(&results);
            }
            Ok(schema_exit(&results))
        }

        Commands::Migrate { target } => {
            let descriptor = target.descriptor(&config)?;
            let store = LocalStore::from_config(&config);
            store.ensure_schema().await?;
            let snapshot = store.snapshot().await?;

            let mut conn = broker::connect(&descriptor, &config.connection).await?;
            let results = reconcile::reconcile_all(&mut conn.handle).await;
            if results.iter().any(|r| !r.success) {
                conn.handle.close().await?;
                print_schema(&results);
                return Ok(schema_exit(&results));
            }
            let migrated = orchestrator::migrate(&snapshot, &mut conn.handle).await;
            conn.handle.close().await?;
            let result = migrated?;

            if json {
                print_json(&result)?;
            } else {
                println!("Migration completed!");
                println!("  Integrations: {}", result.migrated.integrations);
                println!("  Test sessions: {}", result.migrated.test_sessions);
                println!("  Users: {}", result.migrated.users);
                println!("  System logs: {}", result.migrated.system_logs);
                println!("  Environments: {}", result.migrated.environments);
                if result.partial_write_risk {
                    println!("  Note: target writes without a transaction");
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Export {
            target,
            output,
            import,
        } => {
            let descriptor = target.descriptor(&config)?;
            let mut conn = broker::connect(&descriptor, &config.connection).await?;
            let exported = orchestrator::export(&mut conn.handle).await;
            conn.handle.close().await?;
            let snapshot = exported?;

            match &output {
                Some(path) => {
                    std::fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
                    info!("Wrote {} records to {}", snapshot.total(), path.display());
                }
                None if !import => print_json(&snapshot)?,
                None => {}
            }

            if import {
                let result = import_snapshot(&config, &snapshot).await?;
                if json {
                    print_json(&result)?;
                } else {
                    println!("Imported {} records", result.migrated.total());
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Scrub { target, yes } => {
            if !yes {
                return Err(SyncError::Config(
                    "scrub deletes every row on the target; pass --yes to confirm".to_string(),
                ));
            }
            let descriptor = target.descriptor(&config)?;
            let mut conn = broker::connect(&descriptor, &config.connection).await?;
            let scrubbed = orchestrator::scrub(&mut conn.handle).await;
            conn.handle.close().await?;
            let result = scrubbed?;

            if json {
                print_json(&result)?;
            } else {
                for table in &result.deleted {
                    println!("  {}: {} rows deleted", table.table, table.rows);
                }
                for table in &result.skipped {
                    println!("  {}: absent", table);
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::InitLocal {
            admin_user,
            admin_password,
            admin_email,
        } => {
            let store = LocalStore::from_config(&config);
            let admin = store
                .reset(&AdminSeed {
                    username: admin_user,
                    password: admin_password,
                    email: admin_email,
                })
                .await?;

            if json {
                print_json(&serde_json::json!({
                    "path": store.path(),
                    "adminId": admin.id,
                    "adminUser": admin.username,
                }))?;
            } else {
                println!("Local store ready at {}", store.path().display());
                println!("  Admin: {} ({})", admin.username, admin.id);
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::AddIntegration { name, target } => {
            let descriptor = target.descriptor(&config)?;
            let store = LocalStore::from_config(&config);
            store.ensure_schema().await?;
            let integration = Integration::database(name, &descriptor)?;
            store.insert_integration(&integration).await?;

            if json {
                print_json(&integration)?;
            } else {
                println!("{}", integration.id);
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::List => {
            let store = LocalStore::from_config(&config);
            store.ensure_schema().await?;
            let integrations = store.list_integrations().await?;

            if json {
                print_json(&integrations)?;
            } else {
                for i in &integrations {
                    println!(
                        "{}  {:<12} {:<8} {}  last sync: {}",
                        i.id,
                        i.status.as_str(),
                        i.kind.as_str(),
                        i.name,
                        i.last_sync.as_deref().unwrap_or("never")
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Attach { id } => {
            let store = LocalStore::from_config(&config);
            store.ensure_schema().await?;
            let report = SyncService::new(store).attach(&id).await?;

            if json {
                print_json(&report)?;
            } else if report.success {
                println!("Attached {}", id);
                if let Some(migrate) = &report.migrate {
                    println!("  Records pushed: {}", migrate.migrated.total());
                }
            } else {
                println!("Attach failed: {}", report.error.as_deref().unwrap_or_default());
            }
            Ok(report_exit(report.success, report.error_kind))
        }

        Commands::Detach { id, no_export } => {
            let store = LocalStore::from_config(&config);
            store.ensure_schema().await?;
            let report = SyncService::new(store).detach(&id, !no_export).await?;

            if json {
                print_json(&report)?;
            } else if report.success {
                println!("Detached {}", id);
                if let Some(imported) = &report.imported {
                    println!("  Records imported: {}", imported.migrated.total());
                }
            } else {
                println!("Detach failed: {}", report.error.as_deref().unwrap_or_default());
            }
            Ok(report_exit(report.success, report.error_kind))
        }
    }
}

/// Load `path`, or `config.yaml` when it exists, or built-in defaults.
fn load_config(path: Option<&Path>) -> Result<Config, SyncError> {
    match path {
        Some(path) if !path.exists() => Err(SyncError::Config(format!(
            "config file not found: {}",
            path.display()
        ))),
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        }
        None if Path::new("config.yaml").exists() => Config::load("config.yaml"),
        None => Ok(Config::default()),
    }
}

async fn import_snapshot(
    config: &Config,
    snapshot: &Snapshot,
) -> Result<integration_sync::MigrateResult, SyncError> {
    let store = LocalStore::from_config(config);
    store.ensure_schema().await?;
    store.import(snapshot).await
}

fn print_json<T: Serialize>(value: &T) -> Result<(), SyncError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_schema(results: &[ReconcileResult]) {
    for r in results {
        let action = serde_json::to_value(r.action)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        print!("  {:<14} {}", r.table, action);
        if let Some(backup) = &r.backup_table {
            print!(" (backup: {})", backup);
        }
        if let Some(err) = &r.error {
            print!(" - {}", err);
        }
        println!();
    }
}

fn schema_exit(results: &[ReconcileResult]) -> ExitCode {
    if results.iter().all(|r| r.success) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn report_exit(success: bool, kind: Option<integration_sync::ErrorKind>) -> ExitCode {
    match kind {
        _ if success => ExitCode::SUCCESS,
        Some(kind) => ExitCode::from(kind.exit_code()),
        None => ExitCode::FAILURE,
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
