use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use crate::{
    audit::{AuditRecord, NewAuditRecord},
    data::Value,
};

use super::{ColumnDef, Store, StoreError, TableDef};

#[derive(Debug, Default)]
struct MemoryTable {
    columns: Vec<ColumnDef>,
    rows: Vec<Vec<Value>>,
    next_id: i64,
}

#[derive(Debug, Default)]
struct Failures {
    creates: bool,
    inserts: bool,
    drops: bool,
    audit: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, MemoryTable>,
    audit: Vec<AuditRecord>,
    failures: Failures,
}

/// In-process [`Store`] that checks column types on insert and can be told to fail any operation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_creates(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.creates = fail;
        }
    }

    pub fn fail_inserts(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.inserts = fail;
        }
    }

    pub fn fail_drops(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.drops = fail;
        }
    }

    pub fn fail_audit(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.audit = fail;
        }
    }

    pub fn table_names(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|state| state.tables.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Stored rows of `table`, each prefixed with its generated `id`.
    pub fn rows(&self, table: &str) -> Option<Vec<Vec<Value>>> {
        let state = self.state.lock().ok()?;
        state.tables.get(table).map(|t| t.rows.clone())
    }

    pub fn column_names(&self, table: &str) -> Option<Vec<String>> {
        let state = self.state.lock().ok()?;
        state
            .tables
            .get(table)
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Rejected("memory store lock poisoned".to_string()))
    }
}

fn check_value(column: &ColumnDef, value: &Value) -> Result<(), StoreError> {
    let sql_type = column.sql_type.to_ascii_uppercase();
    let accepted = match value {
        Value::Null => column.nullable,
        Value::Integer(_) => matches!(sql_type.as_str(), "INTEGER" | "FLOAT" | "TEXT")
            || sql_type.starts_with("VARCHAR"),
        Value::Float(_) => matches!(sql_type.as_str(), "FLOAT" | "TEXT") || sql_type.starts_with("VARCHAR"),
        Value::Timestamp(_) => matches!(sql_type.as_str(), "DATETIME" | "TEXT")
            || sql_type.starts_with("VARCHAR"),
        Value::Text(text) => match varchar_length(&sql_type) {
            Some(limit) => text.chars().count() <= limit,
            None => sql_type == "TEXT",
        },
    };
    if accepted {
        Ok(())
    } else {
        Err(StoreError::Rejected(format!(
            "value '{}' does not fit column '{}' of type {}",
            value, column.name, column.sql_type
        )))
    }
}

fn varchar_length(sql_type: &str) -> Option<usize> {
    sql_type
        .strip_prefix("VARCHAR(")
        .and_then(|rest| rest.strip_suffix(')'))
        .and_then(|len| len.parse().ok())
}

impl Store for MemoryStore {
    fn create_table(&self, table: &TableDef) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if state.failures.creates {
            return Err(StoreError::Rejected("simulated create failure".to_string()));
        }
        if state.tables.contains_key(&table.name) {
            return Err(StoreError::Rejected(format!(
                "table {} already exists",
                table.name
            )));
        }
        state.tables.insert(
            table.name.clone(),
            MemoryTable {
                columns: table.columns.clone(),
                rows: Vec::new(),
                next_id: 1,
            },
        );
        Ok(())
    }

    fn insert_rows(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> Result<u64, StoreError> {
        let mut state = self.state()?;
        if state.failures.inserts {
            return Err(StoreError::Rejected("simulated insert failure".to_string()));
        }
        let target = state
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::Rejected(format!("no such table: {table}")))?;

        let mut positions = Vec::with_capacity(columns.len());
        for name in columns {
            let position = target
                .columns
                .iter()
                .position(|column| &column.name == name && !column.primary_key)
                .ok_or_else(|| {
                    StoreError::Rejected(format!("table {table} has no column named {name}"))
                })?;
            positions.push(position);
        }

        let mut staged = Vec::with_capacity(rows.len());
        let mut next_id = target.next_id;
        for row in rows {
            if row.len() != columns.len() {
                return Err(StoreError::Rejected(format!(
                    "{} values for {} columns",
                    row.len(),
                    columns.len()
                )));
            }
            let mut stored = vec![Value::Null; target.columns.len()];
            for (column, stored_value) in target.columns.iter().zip(stored.iter_mut()) {
                if column.primary_key {
                    *stored_value = Value::Integer(next_id);
                }
            }
            for (value, &position) in row.iter().zip(&positions) {
                check_value(&target.columns[position], value)?;
                stored[position] = value.clone();
            }
            for (column, stored_value) in target.columns.iter().zip(&stored) {
                check_value(column, stored_value)?;
            }
            next_id += 1;
            staged.push(stored);
        }

        let inserted = staged.len() as u64;
        target.rows.extend(staged);
        target.next_id = next_id;
        Ok(inserted)
    }

    fn drop_table(&self, table: &str) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if state.failures.drops {
            return Err(StoreError::Rejected("simulated drop failure".to_string()));
        }
        state
            .tables
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| StoreError::Rejected(format!("no such table: {table}")))
    }

    fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        Ok(self.state()?.tables.contains_key(table))
    }

    fn row_count(&self, table: &str) -> Result<u64, StoreError> {
        self.state()?
            .tables
            .get(table)
            .map(|t| t.rows.len() as u64)
            .ok_or_else(|| StoreError::Rejected(format!("no such table: {table}")))
    }

    fn append_audit(&self, records: &[NewAuditRecord]) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if state.failures.audit {
            return Err(StoreError::Rejected("simulated audit failure".to_string()));
        }
        let mut next_id = state.audit.last().map(|r| r.id).unwrap_or(0) + 1;
        for record in records {
            state.audit.push(AuditRecord {
                id: next_id,
                filename: record.filename.clone(),
                imported_at: record.imported_at,
                row_data: record.row_data.clone(),
            });
            next_id += 1;
        }
        Ok(())
    }

    fn recent_audit(&self, limit: usize) -> Result<Vec<AuditRecord>, StoreError> {
        let state = self.state()?;
        let mut records = state.audit.clone();
        records.sort_by(|a, b| b.imported_at.cmp(&a.imported_at).then(b.id.cmp(&a.id)));
        records.truncate(limit);
        Ok(records)
    }

    fn audit_record(&self, id: i64) -> Result<Option<AuditRecord>, StoreError> {
        Ok(self.state()?.audit.iter().find(|r| r.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> TableDef {
        TableDef {
            name: "people".to_string(),
            columns: vec![
                ColumnDef {
                    name: "id".to_string(),
                    sql_type: "INTEGER".to_string(),
                    primary_key: true,
                    nullable: false,
                },
                ColumnDef {
                    name: "age".to_string(),
                    sql_type: "INTEGER".to_string(),
                    primary_key: false,
                    nullable: true,
                },
                ColumnDef {
                    name: "name".to_string(),
                    sql_type: "VARCHAR(5)".to_string(),
                    primary_key: false,
                    nullable: true,
                },
            ],
        }
    }

    fn columns() -> Vec<String> {
        vec!["age".to_string(), "name".to_string()]
    }

    #[test]
    fn insert_assigns_ids_and_counts_rows() {
        let store = MemoryStore::new();
        store.create_table(&people()).unwrap();
        let rows = vec![
            vec![Value::Integer(30), Value::Text("Ada".to_string())],
            vec![Value::Null, Value::Null],
        ];
        assert_eq!(store.insert_rows("people", &columns(), &rows).unwrap(), 2);
        assert_eq!(store.row_count("people").unwrap(), 2);
        let stored = store.rows("people").unwrap();
        assert_eq!(stored[1][0], Value::Integer(2));
    }

    #[test]
    fn insert_is_all_or_nothing_on_type_mismatch() {
        let store = MemoryStore::new();
        store.create_table(&people()).unwrap();
        let rows = vec![
            vec![Value::Integer(30), Value::Text("Ada".to_string())],
            vec![Value::Text("old".to_string()), Value::Null],
        ];
        assert!(store.insert_rows("people", &columns(), &rows).is_err());
        assert_eq!(store.row_count("people").unwrap(), 0);
    }

    #[test]
    fn varchar_length_is_enforced() {
        let store = MemoryStore::new();
        store.create_table(&people()).unwrap();
        let rows = vec![vec![Value::Null, Value::Text("Grace Hopper".to_string())]];
        assert!(store.insert_rows("people", &columns(), &rows).is_err());
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let store = MemoryStore::new();
        store.create_table(&people()).unwrap();
        assert!(store.create_table(&people()).is_err());
        assert_eq!(store.table_names(), vec!["people".to_string()]);
    }

    #[test]
    fn scripted_drop_failure_keeps_table() {
        let store = MemoryStore::new();
        store.create_table(&people()).unwrap();
        store.fail_drops(true);
        assert!(store.drop_table("people").is_err());
        assert!(store.table_exists("people").unwrap());
        store.fail_drops(false);
        store.drop_table("people").unwrap();
        assert!(!store.table_exists("people").unwrap());
    }
}
