pub mod audit;
pub mod cli;
pub mod data;
pub mod error;
pub mod import;
pub mod io_utils;
pub mod materialize;
pub mod schema;
pub mod store;
pub mod table;
pub mod upload;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, error, info, warn};

use crate::{
    cli::{Cli, Commands},
    error::ImportError,
    import::{ImportOptions, import_upload, plan_upload},
    store::{SqliteStore, Store},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_importer", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    let dotenv_path = dotenvy::dotenv().ok();
    init_logging();
    if let Some(path) = dotenv_path {
        debug!("Loaded environment from {path:?}");
    }
    let cli = Cli::parse();
    match &cli.command {
        Commands::Import(args) => handle_import(&cli.database_url, args),
        Commands::Plan(args) => handle_plan(args),
        Commands::History(args) => handle_history(&cli.database_url, args),
        Commands::Show(args) => handle_show(&cli.database_url, args),
    }
}

fn open_store(database_url: &str) -> Result<SqliteStore> {
    debug!("Connecting to {database_url}");
    SqliteStore::connect(database_url)
        .with_context(|| format!("Connecting to database {database_url}"))
}

fn import_options(encoding: Option<&str>) -> Result<ImportOptions> {
    Ok(ImportOptions {
        encoding: io_utils::resolve_encoding(encoding)?,
    })
}

/// Logs a failed upload at a level matching who has to act on it and turns it into the CLI error line.
fn report_failure(filename: &str, err: ImportError) -> anyhow::Error {
    if err.kind().is_client_error() {
        warn!("Rejected upload '{filename}': {err}");
    } else {
        error!("Upload '{filename}' failed: {err}");
    }
    anyhow!("{}: {err}", err.kind())
}

fn handle_import(database_url: &str, args: &cli::ImportArgs) -> Result<()> {
    let options = import_options(args.input_encoding.as_deref())?;
    let upload = io_utils::read_upload(&args.input, args.filename.as_deref())?;
    let store = open_store(database_url)?;
    match import_upload(&store, &upload, &options) {
        Ok(summary) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "Imported {} rows into {}",
                    summary.rows_imported, summary.table_name
                );
            }
            Ok(())
        }
        Err(err) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&err.response())?);
            }
            Err(report_failure(&upload.filename, err))
        }
    }
}

fn handle_plan(args: &cli::PlanArgs) -> Result<()> {
    let options = import_options(args.input_encoding.as_deref())?;
    let upload = io_utils::read_upload(&args.input, None)?;
    let plan = plan_upload(&upload, &options).map_err(|err| report_failure(&upload.filename, err))?;
    info!(
        "Inferred {} column(s) for {:?}",
        plan.columns.len(),
        args.input
    );
    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", table::render_plan(&plan));
    }
    Ok(())
}

fn handle_history(database_url: &str, args: &cli::HistoryArgs) -> Result<()> {
    let store = open_store(database_url)?;
    let records = store
        .recent_audit(args.limit)
        .context("Reading audit log")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        print!("{}", table::render_history(&records));
    }
    Ok(())
}

fn handle_show(database_url: &str, args: &cli::ShowArgs) -> Result<()> {
    let store = open_store(database_url)?;
    let record = store
        .audit_record(args.id)
        .with_context(|| format!("Reading audit record {}", args.id))?
        .ok_or_else(|| anyhow!("Audit record {} not found", args.id))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
