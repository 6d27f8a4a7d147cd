//! Table materialization: turns a [`ColumnPlan`] into a new table and loads the upload's rows.
//!
//! Creation and loading are two separate store calls. A load failure triggers a best-effort drop of the
//! new table; the drop's own outcome is logged and never replaces the load error.

use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, info};

use crate::{
    data::Value,
    error::ImportError,
    schema::{ColumnPlan, ColumnRole, Row, sanitize_identifier},
    store::{ColumnDef, Store, TableDef},
};

pub const TABLE_PREFIX: &str = "data";
pub const TABLE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const FALLBACK_TABLE_BASE: &str = "upload";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedTable {
    pub name: String,
    pub rows_loaded: u64,
}

/// `data_<sanitized label without extension>_<YYYYMMDD_HHMMSS>`. Directory parts of the label are kept
/// and sanitized along with the file name.
pub fn table_name_for(label: &str, now: DateTime<Utc>) -> String {
    let base = sanitize_identifier(strip_extension(label));
    let base = if base.is_empty() {
        FALLBACK_TABLE_BASE.to_string()
    } else {
        base
    };
    format!(
        "{TABLE_PREFIX}_{base}_{}",
        now.format(TABLE_TIMESTAMP_FORMAT)
    )
}

/// Drops the last `.ext` of the final path component. Leading dots of that component are part of the
/// name, so `.csv` alone has no extension.
fn strip_extension(label: &str) -> &str {
    let name_start = label.rfind(['/', '\\']).map_or(0, |idx| idx + 1);
    let name = &label[name_start..];
    let leading_dots = name.len() - name.trim_start_matches('.').len();
    match name[leading_dots..].rfind('.') {
        Some(dot) => &label[..name_start + leading_dots + dot],
        None => label,
    }
}

pub fn table_def(name: &str, plan: &ColumnPlan) -> TableDef {
    let columns = plan
        .columns
        .iter()
        .map(|column| {
            let primary_key = column.role == ColumnRole::PrimaryKey;
            ColumnDef {
                name: column.target_name.clone(),
                sql_type: column.column_type.sql_type(),
                primary_key,
                nullable: !primary_key,
            }
        })
        .collect();
    TableDef {
        name: name.to_string(),
        columns,
    }
}

pub fn materialize<S>(
    store: &S,
    plan: &ColumnPlan,
    rows: &[Row],
    label: &str,
) -> Result<MaterializedTable, ImportError>
where
    S: Store + ?Sized,
{
    materialize_at(store, plan, rows, label, Utc::now())
}

/// Same as [`materialize`] with an explicit clock reading, used for both the table name and the
/// `imported_at` stamp of every row.
pub fn materialize_at<S>(
    store: &S,
    plan: &ColumnPlan,
    rows: &[Row],
    label: &str,
    now: DateTime<Utc>,
) -> Result<MaterializedTable, ImportError>
where
    S: Store + ?Sized,
{
    let name = table_name_for(label, now);
    let table = table_def(&name, plan);

    store
        .create_table(&table)
        .map_err(|err| ImportError::SchemaCreation(err.to_string()))?;
    info!(
        "Created table {} with {} column(s)",
        name,
        table.columns.len()
    );

    let columns = table
        .insertable_columns()
        .map(|column| column.name.clone())
        .collect::<Vec<_>>();
    let batch = stamped_rows(plan, rows, now.naive_utc(), label);
    debug!("Loading {} row(s) into {}", batch.len(), name);

    match store.insert_rows(&name, &columns, &batch) {
        Ok(rows_loaded) => {
            info!("Loaded {rows_loaded} row(s) into {name}");
            Ok(MaterializedTable { name, rows_loaded })
        }
        Err(err) => {
            let message = err.to_string();
            discard_table(store, &name);
            Err(ImportError::DataLoad {
                table: name,
                message,
            })
        }
    }
}

/// Row values in the insert order of [`table_def`]: source columns, then `imported_at` and
/// `source_filename`.
fn stamped_rows(
    plan: &ColumnPlan,
    rows: &[Row],
    imported_at: NaiveDateTime,
    label: &str,
) -> Vec<Vec<Value>> {
    rows.iter()
        .map(|row| {
            let mut values = row.values().to_vec();
            values.reserve(2);
            for column in &plan.columns {
                match column.role {
                    ColumnRole::ImportedAt => values.push(Value::Timestamp(imported_at)),
                    ColumnRole::SourceFilename => values.push(Value::Text(label.to_string())),
                    ColumnRole::PrimaryKey | ColumnRole::Source => {}
                }
            }
            values
        })
        .collect()
}

fn discard_table<S>(store: &S, name: &str)
where
    S: Store + ?Sized,
{
    match store.drop_table(name) {
        Ok(()) => info!("Dropped {name} after failed load"),
        Err(err) => info!("Could not drop {name} after failed load: {err}"),
    }
}
