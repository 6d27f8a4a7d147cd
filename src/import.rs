use chrono::Utc;
use encoding_rs::{Encoding, UTF_8};
use log::info;
use serde::Serialize;

use crate::{
    audit,
    error::ImportError,
    materialize::materialize_at,
    schema::{ColumnPlan, infer},
    store::Store,
    upload::{UploadedFile, parse_csv, validate_upload},
};

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    pub encoding: &'static Encoding,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self { encoding: UTF_8 }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub table_name: String,
    pub rows_imported: usize,
    #[serde(skip)]
    pub plan: ColumnPlan,
}

/// Runs one upload end to end: validate, parse, infer, audit, then create and load the table.
///
/// Audit rows are committed before the table is created and are kept even when materialization fails.
pub fn import_upload<S>(
    store: &S,
    file: &UploadedFile,
    options: &ImportOptions,
) -> Result<ImportSummary, ImportError>
where
    S: Store + ?Sized,
{
    validate_upload(file)?;
    let raw = parse_csv(&file.bytes, options.encoding)?;
    let plan = infer(&raw)?;
    info!(
        "Importing '{}': {} row(s), {} column(s)",
        file.filename,
        raw.row_count(),
        raw.column_count()
    );

    let now = Utc::now();
    let rows_imported = audit::record_intake(store, &raw, &plan, &file.filename, now.naive_utc())?;

    let rows = plan.rows(&raw);
    let table = materialize_at(store, &plan, &rows, &file.filename, now)?;
    info!(
        "Imported {} row(s) into {}",
        rows_imported, table.name
    );
    Ok(ImportSummary {
        table_name: table.name,
        rows_imported,
        plan,
    })
}

/// Parses and infers without touching storage.
pub fn plan_upload(file: &UploadedFile, options: &ImportOptions) -> Result<ColumnPlan, ImportError> {
    validate_upload(file)?;
    let raw = parse_csv(&file.bytes, options.encoding)?;
    infer(&raw)
}
