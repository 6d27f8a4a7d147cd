//! Backing-store capability handed to the materializer and the audit trail.
//!
//! Nothing in the engine reaches for a global connection; callers pass a `&dyn Store` (or any
//! `S: Store`) explicitly. [`SqliteStore`] is the production implementation and [`MemoryStore`] an
//! in-process double whose failures can be scripted.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use itertools::Itertools;
use thiserror::Error;

use crate::{
    audit::{AuditRecord, NewAuditRecord},
    data::Value,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Backend(#[from] sqlx::Error),
    #[error("Failed to start storage runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("Malformed audit payload: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
    pub primary_key: bool,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn create_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|column| {
                let mut definition = format!("{} {}", quote_identifier(&column.name), column.sql_type);
                if !column.nullable {
                    definition.push_str(" NOT NULL");
                }
                if column.primary_key {
                    definition.push_str(" PRIMARY KEY AUTOINCREMENT");
                }
                definition
            })
            .join(", ");
        format!("CREATE TABLE {} ({columns})", quote_identifier(&self.name))
    }

    pub fn insertable_columns(&self) -> impl Iterator<Item = &ColumnDef> + '_ {
        self.columns.iter().filter(|column| !column.primary_key)
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn insert_sql(table: &str, columns: &[String]) -> String {
    let names = columns.iter().map(|name| quote_identifier(name)).join(", ");
    let placeholders = columns.iter().map(|_| "?").join(", ");
    format!(
        "INSERT INTO {} ({names}) VALUES ({placeholders})",
        quote_identifier(table)
    )
}

pub trait Store {
    /// Creates a new table; fails if an object with the same name already exists.
    fn create_table(&self, table: &TableDef) -> Result<(), StoreError>;

    /// Inserts every row or none of them. Each row lists values in `columns` order.
    fn insert_rows(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> Result<u64, StoreError>;

    fn drop_table(&self, table: &str) -> Result<(), StoreError>;

    fn table_exists(&self, table: &str) -> Result<bool, StoreError>;

    fn row_count(&self, table: &str) -> Result<u64, StoreError>;

    /// Persists a batch of audit records atomically.
    fn append_audit(&self, records: &[NewAuditRecord]) -> Result<(), StoreError>;

    /// Most recent audit records first.
    fn recent_audit(&self, limit: usize) -> Result<Vec<AuditRecord>, StoreError>;

    fn audit_record(&self, id: i64) -> Result<Option<AuditRecord>, StoreError>;
}
