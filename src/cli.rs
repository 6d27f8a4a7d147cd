use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data.db";
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Parser)]
#[command(author, version, about = "Import CSV uploads into freshly created tables", long_about = None)]
pub struct Cli {
    /// Database connection string for the backing store
    #[arg(
        long = "database-url",
        env = "DATABASE_URL",
        default_value = DEFAULT_DATABASE_URL,
        global = true
    )]
    pub database_url: String,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import a CSV file into a new table and record its rows in the audit log
    Import(ImportArgs),
    /// Show the column plan inferred for a CSV file without importing it
    Plan(PlanArgs),
    /// List the most recent audit records
    History(HistoryArgs),
    /// Show a single audit record
    Show(ShowArgs),
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// CSV file to import
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Filename recorded for the upload (defaults to the input file name)
    #[arg(long)]
    pub filename: Option<String>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// CSV file to inspect
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Maximum number of records to list
    #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
    pub limit: usize,
    /// Print the records as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Audit record id
    #[arg(long)]
    pub id: i64,
}
