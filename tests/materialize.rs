mod common;

use common::at_second;
use csv_importer::{
    error::{ErrorKind, ImportError},
    materialize::{materialize_at, table_name_for},
    schema::{ColumnPlan, Row, infer},
    store::{MemoryStore, SqliteStore, Store},
    upload::parse_csv,
};
use encoding_rs::UTF_8;
use proptest::prelude::*;

fn plan_and_rows(csv: &str) -> (ColumnPlan, Vec<Row>) {
    let raw = parse_csv(csv.as_bytes(), UTF_8).expect("parse csv");
    let plan = infer(&raw).expect("infer plan");
    let rows = plan.rows(&raw);
    (plan, rows)
}

#[test]
fn table_names_differ_for_uploads_a_second_apart() {
    assert_ne!(
        table_name_for("people.csv", at_second(1)),
        table_name_for("people.csv", at_second(2))
    );
    assert_eq!(
        table_name_for("people.csv", at_second(1)),
        "data_people_20240615_080001"
    );
}

#[test]
fn same_second_upload_of_same_file_fails_schema_creation() {
    let store = MemoryStore::new();
    let (plan, rows) = plan_and_rows("a\n1\n");
    materialize_at(&store, &plan, &rows, "a.csv", at_second(7)).expect("first import");

    let err = materialize_at(&store, &plan, &rows, "a.csv", at_second(7)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaCreation);
    assert_eq!(store.table_names().len(), 1);
    assert_eq!(store.row_count("data_a_20240615_080007").unwrap(), 1);
}

#[test]
fn insert_failure_drops_the_new_table() {
    let store = MemoryStore::new();
    store.fail_inserts(true);
    let (plan, rows) = plan_and_rows("name\nAda\n");

    let err = materialize_at(&store, &plan, &rows, "people.csv", at_second(3)).unwrap_err();
    match err {
        ImportError::DataLoad { table, message } => {
            assert_eq!(table, "data_people_20240615_080003");
            assert_eq!(message, "simulated insert failure");
            assert!(!store.table_exists(&table).unwrap());
        }
        other => panic!("expected DataLoad, got {other:?}"),
    }
}

#[test]
fn cleanup_failure_still_reports_the_load_error() {
    let store = MemoryStore::new();
    store.fail_inserts(true);
    store.fail_drops(true);
    let (plan, rows) = plan_and_rows("name\nAda\n");

    let err = materialize_at(&store, &plan, &rows, "people.csv", at_second(4)).unwrap_err();
    assert!(matches!(err, ImportError::DataLoad { .. }));
    assert!(store.table_exists("data_people_20240615_080004").unwrap());
}

#[test]
fn row_count_matches_source_rows_in_sqlite() {
    let store = SqliteStore::open_in_memory().expect("open sqlite");
    let mut csv = String::from("id,label,score\n");
    for i in 0..250 {
        csv.push_str(&format!("{i},item {i},{}.5\n", i % 7));
    }
    let (plan, rows) = plan_and_rows(&csv);

    let table = materialize_at(&store, &plan, &rows, "items.csv", at_second(9)).expect("materialize");
    assert_eq!(table.rows_loaded, 250);
    assert_eq!(store.row_count(&table.name).unwrap(), 250);
    assert_eq!(
        plan.target_names(),
        vec!["id", "id_1", "label", "score", "imported_at", "source_filename"]
    );
}

#[test]
fn sqlite_duplicate_table_is_a_schema_creation_error() {
    let store = SqliteStore::open_in_memory().expect("open sqlite");
    let (plan, rows) = plan_and_rows("a\n1\n");
    materialize_at(&store, &plan, &rows, "a.csv", at_second(0)).expect("first import");
    let err = materialize_at(&store, &plan, &rows, "a.csv", at_second(0)).unwrap_err();
    assert!(matches!(err, ImportError::SchemaCreation(_)));
    assert!(err.to_string().contains("already exists"));
}

fn cell_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "-?[0-9]{1,6}",
        "[0-9]{1,4}\\.[0-9]{1,3}",
        "[a-zA-Z][a-zA-Z0-9 ]{0,10}",
        "2024-0[1-9]-1[0-9]",
        Just("NA".to_string()),
    ]
}

fn table_strategy() -> impl Strategy<Value = (usize, Vec<Vec<String>>)> {
    (1usize..5).prop_flat_map(|width| {
        (
            Just(width),
            proptest::collection::vec(proptest::collection::vec(cell_strategy(), width), 1..40),
        )
    })
}

proptest! {
    #[test]
    fn every_source_row_lands_in_the_table((width, records) in table_strategy()) {
        let mut csv = (0..width).map(|idx| format!("col {idx}")).collect::<Vec<_>>().join(",");
        csv.push('\n');
        for record in &records {
            csv.push_str(&record.join(","));
            csv.push('\n');
        }
        let (plan, rows) = plan_and_rows(&csv);
        prop_assert_eq!(rows.len(), records.len());

        let store = MemoryStore::new();
        let table = materialize_at(&store, &plan, &rows, "generated.csv", at_second(0))
            .expect("materialize generated csv");
        prop_assert_eq!(table.rows_loaded, records.len() as u64);
        prop_assert_eq!(store.row_count(&table.name).unwrap(), records.len() as u64);
    }
}
