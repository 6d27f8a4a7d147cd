use std::str::FromStr;

use chrono::NaiveDateTime;
use log::debug;
use sqlx::{
    Row, Sqlite,
    query::Query,
    sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
};
use tokio::runtime::{Builder, Runtime};

use crate::{
    audit::{AuditRecord, NewAuditRecord, RowData},
    data::Value,
};

use super::{Store, StoreError, TableDef, insert_sql, quote_identifier};

const AUDIT_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS csv_import (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename VARCHAR(256),
    imported_at DATETIME,
    row_data JSON
)";

/// SQLite-backed [`Store`]. Owns a single-threaded runtime so callers see blocking calls.
pub struct SqliteStore {
    pool: SqlitePool,
    runtime: Runtime,
}

impl SqliteStore {
    /// Connects to `database_url` (e.g. `sqlite://data.db`), creating the file and the audit table
    /// when missing.
    pub fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        Self::with_options(options, SqlitePoolOptions::new().max_connections(5))
    }

    /// Private in-memory database. Limited to one connection, since every SQLite in-memory
    /// connection sees its own database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool_options = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
        Self::with_options(options, pool_options)
    }

    fn with_options(
        options: SqliteConnectOptions,
        pool_options: SqlitePoolOptions,
    ) -> Result<Self, StoreError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let pool = runtime.block_on(async {
            let pool = pool_options.connect_with(options).await?;
            sqlx::query(AUDIT_TABLE_SQL).execute(&pool).await?;
            Ok::<_, sqlx::Error>(pool)
        })?;
        Ok(Self { pool, runtime })
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        self.runtime.block_on(self.pool.close());
    }
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Integer(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.as_str()),
        Value::Timestamp(ts) => query.bind(*ts),
    }
}

fn audit_from_row(row: &SqliteRow) -> Result<AuditRecord, StoreError> {
    let filename: Option<String> = row.try_get("filename")?;
    let imported_at: NaiveDateTime = row.try_get("imported_at")?;
    let payload: String = row.try_get("row_data")?;
    let row_data: RowData = serde_json::from_str(&payload)?;
    Ok(AuditRecord {
        id: row.try_get("id")?,
        filename: filename.unwrap_or_default(),
        imported_at,
        row_data,
    })
}

impl Store for SqliteStore {
    fn create_table(&self, table: &TableDef) -> Result<(), StoreError> {
        let sql = table.create_sql();
        debug!("{sql}");
        self.runtime
            .block_on(sqlx::query(&sql).execute(&self.pool))?;
        Ok(())
    }

    fn insert_rows(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> Result<u64, StoreError> {
        let sql = insert_sql(table, columns);
        self.runtime.block_on(async {
            let mut tx = self.pool.begin().await?;
            let mut inserted = 0u64;
            for row in rows {
                let query = row
                    .iter()
                    .fold(sqlx::query(&sql), |query, value| bind_value(query, value));
                inserted += query.execute(&mut *tx).await?.rows_affected();
            }
            tx.commit().await?;
            Ok::<_, StoreError>(inserted)
        })
    }

    fn drop_table(&self, table: &str) -> Result<(), StoreError> {
        let sql = format!("DROP TABLE {}", quote_identifier(table));
        self.runtime
            .block_on(sqlx::query(&sql).execute(&self.pool))?;
        Ok(())
    }

    fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let count: i64 = self.runtime.block_on(async {
            sqlx::query(
                "SELECT COUNT(*) AS matches FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&self.pool)
            .await?
            .try_get("matches")
        })?;
        Ok(count > 0)
    }

    fn row_count(&self, table: &str) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) AS row_count FROM {}", quote_identifier(table));
        let count: i64 = self.runtime.block_on(async {
            sqlx::query(&sql)
                .fetch_one(&self.pool)
                .await?
                .try_get("row_count")
        })?;
        Ok(count.max(0) as u64)
    }

    fn append_audit(&self, records: &[NewAuditRecord]) -> Result<(), StoreError> {
        let payloads = records
            .iter()
            .map(|record| serde_json::to_string(&record.row_data))
            .collect::<Result<Vec<_>, _>>()?;
        self.runtime.block_on(async {
            let mut tx = self.pool.begin().await?;
            for (record, payload) in records.iter().zip(&payloads) {
                sqlx::query(
                    "INSERT INTO csv_import (filename, imported_at, row_data) VALUES (?, ?, ?)",
                )
                .bind(&record.filename)
                .bind(record.imported_at)
                .bind(payload)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            Ok::<_, sqlx::Error>(())
        })?;
        Ok(())
    }

    fn recent_audit(&self, limit: usize) -> Result<Vec<AuditRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self.runtime.block_on(
            sqlx::query(
                "SELECT id, filename, imported_at, row_data FROM csv_import \
                 ORDER BY imported_at DESC, id DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool),
        )?;
        rows.iter().map(audit_from_row).collect()
    }

    fn audit_record(&self, id: i64) -> Result<Option<AuditRecord>, StoreError> {
        let row = self.runtime.block_on(
            sqlx::query("SELECT id, filename, imported_at, row_data FROM csv_import WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool),
        )?;
        row.as_ref().map(audit_from_row).transpose()
    }
}
