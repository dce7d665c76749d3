use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use app_version_gate::api::{AppState, serve};
use app_version_gate::config::GateConfig;
use app_version_gate::logging::init_logging;
use app_version_gate::version::catalog::{CatalogStore, SqliteCatalog};
use app_version_gate::version::checker::{check_client_version, list_records_for};
use app_version_gate::version::gate::VersionGate;
use app_version_gate::version::ingest::RecordDraft;
use app_version_gate::version::types::{ClientPlatform, ClientVersionQuery};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

#[derive(Parser)]
#[command(name = "app-version-gate")]
#[command(version, about = "App version rollout rules and update gating")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the catalog database (overrides the configuration)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the update decision for a client as JSON
    Check {
        #[arg(long)]
        platform: ClientPlatform,
        #[arg(long = "client-version")]
        current_version: String,
        #[arg(long)]
        build: Option<u64>,
    },
    /// Administer version records
    Records {
        #[command(subcommand)]
        action: RecordsAction,
    },
}

#[derive(Subcommand)]
enum RecordsAction {
    /// List records, newest first
    List {
        #[arg(long)]
        platform: Option<ClientPlatform>,
    },
    /// Create a record from a JSON draft file ("-" reads stdin)
    Add { draft: PathBuf },
    /// Replace a record from a JSON draft file ("-" reads stdin)
    Update { id: i64, draft: PathBuf },
    /// Delete a record
    Remove { id: i64 },
    /// Mark a record as the latest for its platform
    SetLatest { id: i64 },
    /// Make a record visible to gating
    Activate { id: i64 },
    /// Hide a record from gating
    Deactivate { id: i64 },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        GateConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(database) = cli.database {
        config.database = Some(database);
    }

    let _log_guard = init_logging(&config.log)?;

    let catalog = open_catalog(&config.database_path())?;
    let gate = VersionGate::new(config.gate.malformed_records);

    match cli.command {
        Command::Serve { host, port } => {
            let address = format!(
                "{}:{}",
                host.unwrap_or(config.server.host),
                port.unwrap_or(config.server.port)
            );
            let state = AppState::new(Arc::new(catalog), gate);
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(serve(&address, state))
        }
        Command::Check {
            platform,
            current_version,
            build,
        } => {
            let query = ClientVersionQuery {
                platform,
                current_version,
                current_build_number: build,
            };
            let decision = check_client_version(&catalog, &gate, &query, Utc::now())?;
            print_json(&decision)
        }
        Command::Records { action } => run_records(&catalog, action),
    }
}

fn open_catalog(path: &Path) -> anyhow::Result<SqliteCatalog> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create data directory {parent:?}"))?;
    }
    SqliteCatalog::new(path).with_context(|| format!("failed to open catalog at {path:?}"))
}

fn run_records(catalog: &SqliteCatalog, action: RecordsAction) -> anyhow::Result<()> {
    match action {
        RecordsAction::List { platform } => print_json(&list_records_for(catalog, platform)?),
        RecordsAction::Add { draft } => {
            let record = read_draft(&draft)?.validate()?;
            print_json(&catalog.insert_record(&record)?)
        }
        RecordsAction::Update { id, draft } => {
            let record = read_draft(&draft)?.validate()?;
            print_json(&catalog.update_record(id, &record)?)
        }
        RecordsAction::Remove { id } => {
            catalog.delete_record(id)?;
            info!("Removed version record {}", id);
            Ok(())
        }
        RecordsAction::SetLatest { id } => print_json(&catalog.set_latest(id)?),
        RecordsAction::Activate { id } => print_json(&catalog.set_active(id, true)?),
        RecordsAction::Deactivate { id } => print_json(&catalog.set_active(id, false)?),
    }
}

fn read_draft(path: &Path) -> anyhow::Result<RecordDraft> {
    let content = if path.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("failed to read draft from stdin")?
    } else {
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path:?}"))?
    };
    serde_json::from_str(&content).context("draft is not a valid version record")
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
