//! Column plan model and the schema inference engine.
//!
//! This module owns the [`ColumnPlan`] (the ordered target columns for one
//! upload), the [`ColumnType`] enum (the five storage types a column can be
//! given), and [`infer`], which derives a plan from a parsed [`RawTable`].
//!
//! ## Responsibilities
//!
//! - Identifier sanitisation for column and table names
//! - Deterministic, left-to-right collision resolution (`a`, `a_1`, `a_2`, ...)
//! - Column-wide type inference over every non-null cell
//! - Synthetic `id`, `imported_at` and `source_filename` columns
//!
//! Inference is a pure function of its input; nothing here touches storage.

use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, LazyLock},
};

use log::debug;
use regex::Regex;
use serde::{Serialize, Serializer};

use crate::{
    data::{Value, is_boolean_token},
    error::ImportError,
    upload::RawTable,
};

pub const PRIMARY_KEY_COLUMN: &str = "id";
pub const IMPORTED_AT_COLUMN: &str = "imported_at";
pub const SOURCE_FILENAME_COLUMN: &str = "source_filename";
pub const FALLBACK_COLUMN_NAME: &str = "col";
pub const VARCHAR_LENGTH: u32 = 255;

static NON_ALPHANUMERIC_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9a-zA-Z]+").expect("valid identifier pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    DateTime,
    VarChar(u32),
    Text,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::DateTime => "datetime",
            ColumnType::VarChar(_) => "varchar",
            ColumnType::Text => "text",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ColumnType::VarChar(len) => format!("varchar({len})"),
            _ => self.as_str().to_string(),
        }
    }

    /// Column type as written in a `CREATE TABLE` statement.
    pub fn sql_type(&self) -> String {
        match self {
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::Float => "FLOAT".to_string(),
            ColumnType::DateTime => "DATETIME".to_string(),
            ColumnType::VarChar(len) => format!("VARCHAR({len})"),
            ColumnType::Text => "TEXT".to_string(),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

impl Serialize for ColumnType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.describe())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    PrimaryKey,
    Source,
    ImportedAt,
    SourceFilename,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedColumn {
    /// Header the column came from; `None` for synthetic columns.
    pub source_name: Option<String>,
    pub target_name: String,
    pub column_type: ColumnType,
    pub role: ColumnRole,
}

impl PlannedColumn {
    fn synthetic(name: &str, column_type: ColumnType, role: ColumnRole) -> Self {
        Self {
            source_name: None,
            target_name: name.to_string(),
            column_type,
            role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnPlan {
    pub columns: Vec<PlannedColumn>,
}

impl ColumnPlan {
    pub fn source_columns(&self) -> impl Iterator<Item = &PlannedColumn> + '_ {
        self.columns
            .iter()
            .filter(|column| column.role == ColumnRole::Source)
    }

    pub fn target_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|column| column.target_name.as_str())
            .collect()
    }

    /// Builds one [`Row`] per source record, coercing each cell to its column's type.
    pub fn rows(&self, raw: &RawTable) -> Vec<Row> {
        let sources = self.source_columns().collect::<Vec<_>>();
        let targets: Arc<[String]> = sources
            .iter()
            .map(|column| column.target_name.clone())
            .collect();
        raw.records
            .iter()
            .map(|record| Row {
                values: sources
                    .iter()
                    .enumerate()
                    .map(|(idx, column)| match record.get(idx) {
                        Some(cell) => cell.value.coerce(&column.column_type, &cell.text),
                        None => Value::Null,
                    })
                    .collect(),
                targets: Arc::clone(&targets),
            })
            .collect()
    }
}

/// One source row keyed by target column name; absent cells are [`Value::Null`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    targets: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn get(&self, target_name: &str) -> Option<&Value> {
        self.targets
            .iter()
            .position(|name| name == target_name)
            .and_then(|idx| self.values.get(idx))
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// Collapses runs of non-alphanumeric characters to `_`, trims underscores and lowercases.
/// Returns an empty string when nothing usable remains.
pub fn sanitize_identifier(name: &str) -> String {
    NON_ALPHANUMERIC_RUN
        .replace_all(name, "_")
        .trim_matches('_')
        .to_ascii_lowercase()
}

pub fn sanitize_column_name(name: &str) -> String {
    let sanitized = sanitize_identifier(name);
    if sanitized.is_empty() {
        FALLBACK_COLUMN_NAME.to_string()
    } else {
        sanitized
    }
}

/// Assigns a distinct target name to each header, left to right. A name already taken (including the
/// `reserved` names) gets the first free `_N` suffix.
pub fn resolve_target_names<S: AsRef<str>>(headers: &[S], reserved: &[&str]) -> Vec<String> {
    let mut assigned: HashSet<String> = reserved.iter().map(|name| name.to_string()).collect();
    let mut names = Vec::with_capacity(headers.len());
    for header in headers {
        let base = sanitize_column_name(header.as_ref());
        let mut candidate = base.clone();
        let mut suffix = 1usize;
        while assigned.contains(&candidate) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        assigned.insert(candidate.clone());
        names.push(candidate);
    }
    names
}

#[derive(Debug, Clone, Default)]
struct TypeCandidate {
    non_null: usize,
    integer_matches: usize,
    float_matches: usize,
    timestamp_matches: usize,
    boolean_matches: usize,
}

impl TypeCandidate {
    fn update(&mut self, value: &Value) {
        match value {
            Value::Null => return,
            Value::Integer(_) => self.integer_matches += 1,
            Value::Float(_) => self.float_matches += 1,
            Value::Timestamp(_) => self.timestamp_matches += 1,
            Value::Text(text) if is_boolean_token(text) => self.boolean_matches += 1,
            Value::Text(_) => {}
        }
        self.non_null += 1;
    }

    fn all(&self, count: usize) -> bool {
        count == self.non_null
    }

    fn decide(&self) -> ColumnType {
        if self.non_null == 0 {
            return ColumnType::Text;
        }
        if self.all(self.integer_matches) {
            ColumnType::Integer
        } else if self.all(self.integer_matches + self.float_matches) {
            ColumnType::Float
        } else if self.all(self.timestamp_matches) {
            ColumnType::DateTime
        } else if self.all(self.boolean_matches) {
            ColumnType::Text
        } else {
            ColumnType::VarChar(VARCHAR_LENGTH)
        }
    }
}

/// Derives the column plan for one upload.
pub fn infer(raw: &RawTable) -> Result<ColumnPlan, ImportError> {
    if raw.is_empty() {
        return Err(ImportError::EmptyInput);
    }

    let reserved = [
        PRIMARY_KEY_COLUMN,
        IMPORTED_AT_COLUMN,
        SOURCE_FILENAME_COLUMN,
    ];
    let targets = resolve_target_names(&raw.headers, &reserved);

    let mut columns = Vec::with_capacity(raw.column_count() + 3);
    columns.push(PlannedColumn::synthetic(
        PRIMARY_KEY_COLUMN,
        ColumnType::Integer,
        ColumnRole::PrimaryKey,
    ));
    for (idx, (header, target)) in raw.headers.iter().zip(targets).enumerate() {
        let mut candidate = TypeCandidate::default();
        for value in raw.column(idx) {
            candidate.update(value);
        }
        let column_type = candidate.decide();
        debug!("Column '{header}' -> '{target}' inferred as {column_type}");
        columns.push(PlannedColumn {
            source_name: Some(header.clone()),
            target_name: target,
            column_type,
            role: ColumnRole::Source,
        });
    }
    columns.push(PlannedColumn::synthetic(
        IMPORTED_AT_COLUMN,
        ColumnType::DateTime,
        ColumnRole::ImportedAt,
    ));
    columns.push(PlannedColumn::synthetic(
        SOURCE_FILENAME_COLUMN,
        ColumnType::VarChar(VARCHAR_LENGTH),
        ColumnRole::SourceFilename,
    ));

    Ok(ColumnPlan { columns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::parse_csv;
    use encoding_rs::UTF_8;

    fn plan_for(csv: &str) -> ColumnPlan {
        let raw = parse_csv(csv.as_bytes(), UTF_8).expect("parse csv");
        infer(&raw).expect("infer plan")
    }

    fn source_types(plan: &ColumnPlan) -> Vec<ColumnType> {
        plan.source_columns().map(|c| c.column_type).collect()
    }

    #[test]
    fn sanitize_identifier_collapses_runs_and_lowercases() {
        assert_eq!(sanitize_identifier("Order ID"), "order_id");
        assert_eq!(sanitize_identifier("$Percent%"), "percent");
        assert_eq!(sanitize_identifier("a -- b"), "a_b");
        assert_eq!(sanitize_identifier("!!!"), "");
        assert_eq!(sanitize_column_name("!!!"), "col");
    }

    #[test]
    fn resolve_target_names_suffixes_in_source_order() {
        let names = resolve_target_names(&["A!", "A#", "a", "a_1"], &[]);
        assert_eq!(names, vec!["a", "a_1", "a_2", "a_1_1"]);
    }

    #[test]
    fn resolve_target_names_avoids_reserved_names() {
        let names = resolve_target_names(&["ID", "Imported At"], &["id", "imported_at"]);
        assert_eq!(names, vec!["id_1", "imported_at_1"]);
    }

    #[test]
    fn infer_orders_synthetic_and_source_columns() {
        let plan = plan_for("name,age\nAda,30\nGrace,34\n");
        assert_eq!(
            plan.target_names(),
            vec!["id", "name", "age", "imported_at", "source_filename"]
        );
        assert_eq!(
            source_types(&plan),
            vec![ColumnType::VarChar(255), ColumnType::Integer]
        );
        let id = &plan.columns[0];
        assert_eq!(id.role, ColumnRole::PrimaryKey);
        assert!(id.source_name.is_none());
        assert_eq!(plan.columns[3].column_type, ColumnType::DateTime);
    }

    #[test]
    fn infer_decides_types_column_wide() {
        let plan = plan_for(
            "ints,floats,mixed,stamps,flags,blank\n\
             1,1.5,1.5,2024-01-01,true,\n\
             2,2,2,2024-01-02 10:00:00,False,\n\
             3,,x,,TRUE,\n",
        );
        assert_eq!(
            source_types(&plan),
            vec![
                ColumnType::Integer,
                ColumnType::Float,
                ColumnType::VarChar(255),
                ColumnType::DateTime,
                ColumnType::Text,
                ColumnType::Text,
            ]
        );
    }

    #[test]
    fn infer_rejects_tables_without_rows() {
        let raw = parse_csv(b"a,b\n", UTF_8).unwrap();
        assert!(matches!(infer(&raw), Err(ImportError::EmptyInput)));
    }

    #[test]
    fn infer_is_deterministic() {
        let csv = "x,X,y\n1,a,2024-01-01\n";
        assert_eq!(plan_for(csv), plan_for(csv));
    }

    #[test]
    fn rows_coerce_cells_and_key_by_target_name() {
        let raw = parse_csv(b"a,a,b\n1,2.50,x\n3,4,\n", UTF_8).unwrap();
        let plan = infer(&raw).unwrap();
        let rows = plan.rows(&raw);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("a"), Some(&Value::Integer(1)));
        assert_eq!(rows[0].get("a_1"), Some(&Value::Float(2.5)));
        assert_eq!(rows[1].get("a_1"), Some(&Value::Float(4.0)));
        assert_eq!(rows[1].get("b"), Some(&Value::Null));
        assert_eq!(rows[0].values().len(), 3);
    }
}
