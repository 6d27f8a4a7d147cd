//! Intake audit trail: one record per uploaded row, written before any table is materialized.
//!
//! Audit records outlive the dynamic table. If materialization later fails the records stay, since they
//! describe what was received rather than what was imported.

use chrono::NaiveDateTime;
use log::info;
use serde::Serialize;

use crate::{error::ImportError, schema::ColumnPlan, store::Store, upload::RawTable};

pub type RowData = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub id: i64,
    pub filename: String,
    pub imported_at: NaiveDateTime,
    pub row_data: RowData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditRecord {
    pub filename: String,
    pub imported_at: NaiveDateTime,
    pub row_data: RowData,
}

/// Builds the audit batch for an upload: each row's non-null cells keyed by source header, in header
/// order. Cells take their column's planned type, so text columns keep the text exactly as uploaded.
pub fn audit_records(
    raw: &RawTable,
    plan: &ColumnPlan,
    filename: &str,
    now: NaiveDateTime,
) -> Vec<NewAuditRecord> {
    let keys = raw.audit_keys();
    let types = plan
        .source_columns()
        .map(|column| column.column_type)
        .collect::<Vec<_>>();
    raw.records
        .iter()
        .map(|record| NewAuditRecord {
            filename: filename.to_string(),
            imported_at: now,
            row_data: keys
                .iter()
                .zip(&types)
                .zip(record)
                .filter(|(_, cell)| !cell.value.is_null())
                .map(|((key, ty), cell)| (key.clone(), cell.value.coerce(ty, &cell.text).to_json()))
                .collect(),
        })
        .collect()
}

/// Writes the audit batch for `raw` and returns how many records were stored.
pub fn record_intake<S>(
    store: &S,
    raw: &RawTable,
    plan: &ColumnPlan,
    filename: &str,
    now: NaiveDateTime,
) -> Result<usize, ImportError>
where
    S: Store + ?Sized,
{
    let records = audit_records(raw, plan, filename, now);
    store
        .append_audit(&records)
        .map_err(|err| ImportError::AuditWrite(err.to_string()))?;
    info!(
        "Recorded {} audit row(s) for '{}'",
        records.len(),
        filename
    );
    Ok(records.len())
}
