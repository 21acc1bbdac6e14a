//! End to end scenarios over a small geographic model.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tabula_core::schema::{TableBuilder, TableSchema};
use tabula_core::{DataType, Error, Key, Result, Value};
use tabula_storage::{
    DataAction, DataModel, LogEntry, RecordState, RowObserver, Snapshot, TransactionContext,
};

fn country_schema() -> TableSchema {
    TableBuilder::new("country")
        .unwrap()
        .add_column("country_id", DataType::String)
        .unwrap()
        .add_column("abbreviation", DataType::String)
        .unwrap()
        .add_column("name", DataType::String)
        .unwrap()
        .add_column("row_version", DataType::Int64)
        .unwrap()
        .row_version("row_version")
        .unwrap()
        .primary_key(&["country_id"])
        .unwrap()
        .unique_key("uk_country_abbreviation", &["abbreviation"])
        .unwrap()
        .build()
        .unwrap()
}

fn province_schema() -> TableSchema {
    TableBuilder::new("province")
        .unwrap()
        .add_column("province_id", DataType::String)
        .unwrap()
        .add_column("country_id", DataType::String)
        .unwrap()
        .add_column("name", DataType::String)
        .unwrap()
        .add_column("row_version", DataType::Int64)
        .unwrap()
        .row_version("row_version")
        .unwrap()
        .primary_key(&["province_id"])
        .unwrap()
        .foreign_key("fk_province_country", &["country_id"], "country", None)
        .unwrap()
        .build()
        .unwrap()
}

fn city_schema() -> TableSchema {
    TableBuilder::new("city")
        .unwrap()
        .add_column("city_id", DataType::String)
        .unwrap()
        .add_column("province_id", DataType::String)
        .unwrap()
        .add_column("population", DataType::Int64)
        .unwrap()
        .add_column("row_version", DataType::Int64)
        .unwrap()
        .row_version("row_version")
        .unwrap()
        .primary_key(&["city_id"])
        .unwrap()
        .foreign_key("fk_city_province", &["province_id"], "province", None)
        .unwrap()
        .build()
        .unwrap()
}

fn model() -> DataModel {
    DataModel::builder()
        .add_table(country_schema())
        .add_table(province_schema())
        .add_table(city_schema())
        .build()
        .unwrap()
}

fn country(id: &str, abbreviation: &str, name: &str) -> Vec<Value> {
    vec![
        Value::String(id.into()),
        Value::String(abbreviation.into()),
        Value::String(name.into()),
        Value::Int64(0),
    ]
}

fn province(id: &str, country: &str, name: &str) -> Vec<Value> {
    vec![
        Value::String(id.into()),
        Value::String(country.into()),
        Value::String(name.into()),
        Value::Int64(0),
    ]
}

fn city(id: &str, province: &str, population: i64) -> Vec<Value> {
    vec![
        Value::String(id.into()),
        Value::String(province.into()),
        Value::Int64(population),
        Value::Int64(0),
    ]
}

fn commit(model: &DataModel, txn: TransactionContext) -> Vec<LogEntry> {
    model.prepare(&txn).unwrap();
    model.commit(txn).unwrap()
}

fn seed(model: &DataModel) {
    let txn = model.begin();
    model
        .insert(&txn, "country", country("c1", "US", "United States"))
        .unwrap();
    model
        .insert(&txn, "province", province("p1", "c1", "California"))
        .unwrap();
    model
        .insert(&txn, "province", province("p2", "c1", "Texas"))
        .unwrap();
    model
        .insert(&txn, "city", city("sf", "p1", 800_000))
        .unwrap();
    commit(model, txn);
}

#[test]
fn three_level_hierarchy() {
    let model = model();
    seed(&model);

    let provinces = model
        .children_of("country", "fk_province_country", &Key::from("c1"))
        .unwrap();
    assert_eq!(provinces.len(), 2);

    let cities = model
        .children_of("province", "fk_city_province", &Key::from("p1"))
        .unwrap();
    assert_eq!(cities.len(), 1);
    assert_eq!(cities[0].get(0), Some(&Value::String("sf".into())));

    // The middle of the hierarchy is pinned from both sides.
    let txn = model.begin();
    let err = model.delete(&txn, "province", &Key::from("p1")).unwrap_err();
    assert!(matches!(err, Error::ReferentialIntegrity { .. }));
    model.rollback(txn).unwrap();
}

#[test]
fn unique_key_lookup_follows_updates() {
    let model = model();
    seed(&model);

    let row = model
        .find_by("country", "uk_country_abbreviation", &Key::from("US"))
        .unwrap()
        .unwrap();
    assert_eq!(row.get(0), Some(&Value::String("c1".into())));

    let txn = model.begin();
    let key = Key::from("c1");
    model.begin_edit(&txn, "country", &key).unwrap();
    model
        .set_field(&txn, "country", &key, "abbreviation", Value::String("USA".into()))
        .unwrap();
    model.commit_update(&txn, "country", &key).unwrap();
    commit(&model, txn);

    assert!(model
        .find_by("country", "uk_country_abbreviation", &Key::from("US"))
        .unwrap()
        .is_none());
    assert!(model
        .find_by("country", "uk_country_abbreviation", &Key::from("USA"))
        .unwrap()
        .is_some());
}

#[test]
fn retargeting_a_foreign_key_moves_the_child() {
    let model = model();
    seed(&model);

    let txn = model.begin();
    let key = Key::from("sf");
    model.begin_edit(&txn, "city", &key).unwrap();
    model
        .set_field(&txn, "city", &key, "province_id", Value::String("p2".into()))
        .unwrap();
    model.commit_update(&txn, "city", &key).unwrap();
    commit(&model, txn);

    assert!(model
        .children_of("province", "fk_city_province", &Key::from("p1"))
        .unwrap()
        .is_empty());
    let moved = model
        .children_of("province", "fk_city_province", &Key::from("p2"))
        .unwrap();
    assert_eq!(moved.len(), 1);
}

#[test]
fn retargeting_to_a_missing_parent_fails() {
    let model = model();
    seed(&model);

    let txn = model.begin();
    let key = Key::from("sf");
    model.begin_edit(&txn, "city", &key).unwrap();
    model
        .set_field(&txn, "city", &key, "province_id", Value::String("nowhere".into()))
        .unwrap();
    let err = model.commit_update(&txn, "city", &key).unwrap_err();
    assert!(matches!(err, Error::ReferentialIntegrity { .. }));
    model.rollback(txn).unwrap();

    // Still attached to the original parent.
    let cities = model
        .children_of("province", "fk_city_province", &Key::from("p1"))
        .unwrap();
    assert_eq!(cities.len(), 1);
}

#[test]
fn primary_key_change_rekeys_everything() {
    let model = model();
    seed(&model);

    let txn = model.begin();
    let key = Key::from("sf");
    model.begin_edit(&txn, "city", &key).unwrap();
    model
        .set_field(&txn, "city", &key, "city_id", Value::String("sfo".into()))
        .unwrap();
    model.commit_update(&txn, "city", &key).unwrap();
    let log = commit(&model, txn);

    assert!(model.find("city", &Key::from("sf")).unwrap().is_none());
    assert!(model.find("city", &Key::from("sfo")).unwrap().is_some());
    // The log keys the update by the old primary key.
    assert_eq!(log[0].primary_key, vec![Value::String("sf".into())]);

    let cities = model
        .children_of("province", "fk_city_province", &Key::from("p1"))
        .unwrap();
    assert_eq!(cities.len(), 1);
    assert_eq!(cities[0].get(0), Some(&Value::String("sfo".into())));
}

#[test]
fn rollback_of_a_primary_key_change() {
    let model = model();
    seed(&model);

    let txn = model.begin();
    let key = Key::from("sf");
    model.begin_edit(&txn, "city", &key).unwrap();
    model
        .set_field(&txn, "city", &key, "city_id", Value::String("sfo".into()))
        .unwrap();
    model.commit_update(&txn, "city", &key).unwrap();
    model.rollback(txn).unwrap();

    assert!(model.find("city", &Key::from("sfo")).unwrap().is_none());
    let row = model.find("city", &Key::from("sf")).unwrap().unwrap();
    assert_eq!(row.get(2), Some(&Value::Int64(800_000)));

    let cities = model
        .children_of("province", "fk_city_province", &Key::from("p1"))
        .unwrap();
    assert_eq!(cities.len(), 1);
    assert_eq!(cities[0].get(0), Some(&Value::String("sf".into())));
}

#[test]
fn insert_log_carries_the_full_row() {
    let model = model();
    let txn = model.begin();
    model
        .insert(&txn, "country", country("c1", "US", "United States"))
        .unwrap();
    let log = commit(&model, txn);

    assert_eq!(log.len(), 1);
    let entry = &log[0];
    assert_eq!(entry.state, RecordState::Added);
    assert_eq!(entry.changes.len(), 4);
    // The recorded version is the stamped one, not the caller's placeholder.
    assert_eq!(entry.change_for(3), Some(&Value::Int64(1)));
}

#[test]
fn delete_log_is_key_only() {
    let model = model();
    seed(&model);

    let txn = model.begin();
    model.delete(&txn, "city", &Key::from("sf")).unwrap();
    let log = commit(&model, txn);

    assert_eq!(log.len(), 1);
    assert_eq!(log[0].state, RecordState::Deleted);
    assert_eq!(log[0].primary_key, vec![Value::String("sf".into())]);
    assert!(log[0].changes.is_empty());
}

#[test]
fn insert_then_delete_leaves_no_trace_after_rollback() {
    let model = model();
    seed(&model);

    let txn = model.begin();
    model
        .insert(&txn, "province", province("p3", "c1", "Nevada"))
        .unwrap();
    model.delete(&txn, "province", &Key::from("p3")).unwrap();
    model.rollback(txn).unwrap();

    assert!(model.find("province", &Key::from("p3")).unwrap().is_none());
    let provinces = model
        .children_of("country", "fk_province_country", &Key::from("c1"))
        .unwrap();
    assert_eq!(provinces.len(), 2);
}

#[test]
fn modify_then_delete_rolls_back_to_the_original() {
    let model = model();
    seed(&model);

    let txn = model.begin();
    let key = Key::from("sf");
    model.begin_edit(&txn, "city", &key).unwrap();
    model
        .set_field(&txn, "city", &key, "population", Value::Int64(900_000))
        .unwrap();
    model.commit_update(&txn, "city", &key).unwrap();
    model.delete(&txn, "city", &key).unwrap();
    model.rollback(txn).unwrap();

    let row = model.find("city", &key).unwrap().unwrap();
    assert_eq!(row.get(2), Some(&Value::Int64(800_000)));
}

struct Recorder {
    events: Mutex<Vec<(DataAction, String, Key)>>,
}

impl RowObserver for Recorder {
    fn on_row_changed(
        &self,
        action: DataAction,
        table: &str,
        key: &Key,
        _row: &Snapshot,
    ) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push((action, table.to_string(), key.clone()));
        Ok(())
    }
}

#[test]
fn observers_see_every_change() {
    let model = model();
    let recorder = Arc::new(Recorder {
        events: Mutex::new(Vec::new()),
    });
    model.register_observer(recorder.clone());
    seed(&model);

    let txn = model.begin();
    model.delete(&txn, "city", &Key::from("sf")).unwrap();
    commit(&model, txn);

    let events = recorder.events.lock().unwrap();
    assert_eq!(events.len(), 5);
    assert_eq!(events[0].0, DataAction::Insert);
    assert_eq!(events[0].1, "country");
    assert_eq!(events[4].0, DataAction::Delete);
    assert_eq!(events[4].2, Key::from("sf"));
}

#[test]
fn rollback_notifies_compensating_events() {
    let model = model();
    seed(&model);
    let recorder = Arc::new(Recorder {
        events: Mutex::new(Vec::new()),
    });
    model.register_observer(recorder.clone());

    let txn = model.begin();
    model
        .insert(&txn, "province", province("p9", "c1", "Nevada"))
        .unwrap();
    let key = Key::from("c1");
    model.begin_edit(&txn, "country", &key).unwrap();
    model
        .set_field(&txn, "country", &key, "name", Value::String("USA".into()))
        .unwrap();
    model.commit_update(&txn, "country", &key).unwrap();
    model.delete(&txn, "city", &Key::from("sf")).unwrap();
    model.rollback(txn).unwrap();

    let events = recorder.events.lock().unwrap();
    let kinds: Vec<(DataAction, &str)> = events
        .iter()
        .map(|(action, table, _)| (*action, table.as_str()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (DataAction::Insert, "province"),
            (DataAction::Update, "country"),
            (DataAction::Delete, "city"),
            // Compensating events, in reverse enlistment order
            (DataAction::Insert, "city"),
            (DataAction::Update, "country"),
            (DataAction::Delete, "province"),
        ]
    );
    assert_eq!(events[3].2, Key::from("sf"));
    assert_eq!(events[4].2, Key::from("c1"));
    assert_eq!(events[5].2, Key::from("p9"));
}

struct Failing;

impl RowObserver for Failing {
    fn on_row_changed(
        &self,
        _action: DataAction,
        _table: &str,
        _key: &Key,
        _row: &Snapshot,
    ) -> Result<()> {
        Err(Error::invalid_operation("observer failure"))
    }
}

#[test]
fn failing_observer_does_not_abort_the_change() {
    let model = model();
    model.register_observer(Arc::new(Failing));

    let txn = model.begin();
    model
        .insert(&txn, "country", country("c1", "US", "United States"))
        .unwrap();
    commit(&model, txn);

    assert!(model.find("country", &Key::from("c1")).unwrap().is_some());
}

#[test]
fn transactions_from_many_threads() {
    let model = Arc::new(model());
    {
        let txn = model.begin();
        model
            .insert(&txn, "country", country("c1", "US", "United States"))
            .unwrap();
        commit(&model, txn);
    }

    let success = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for i in 0..8 {
        let model = Arc::clone(&model);
        let success = Arc::clone(&success);
        handles.push(thread::spawn(move || {
            let txn = model.begin();
            let id = format!("p{i}");
            model
                .insert(&txn, "province", province(&id, "c1", &format!("Province {i}")))
                .unwrap();
            model.prepare(&txn).unwrap();
            model.commit(txn).unwrap();
            success.fetch_add(1, Ordering::SeqCst);
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(success.load(Ordering::SeqCst), 8);
    let provinces = model
        .children_of("country", "fk_province_country", &Key::from("c1"))
        .unwrap();
    assert_eq!(provinces.len(), 8);

    // Versions are unique across threads.
    let mut versions: Vec<i64> = provinces
        .iter()
        .map(|p| p.get(3).and_then(Value::as_i64).unwrap())
        .collect();
    versions.sort_unstable();
    versions.dedup();
    assert_eq!(versions.len(), 8);
}

#[test]
fn contended_edits_resolve_one_winner() {
    let model = Arc::new(model());
    seed(&model);

    let winners = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let model = Arc::clone(&model);
        let winners = Arc::clone(&winners);
        handles.push(thread::spawn(move || {
            let txn = model.begin();
            let key = Key::from("sf");
            match model.begin_edit(&txn, "city", &key) {
                Ok(()) => {
                    model
                        .set_field(&txn, "city", &key, "population", Value::Int64(850_000))
                        .unwrap();
                    model.commit_update(&txn, "city", &key).unwrap();
                    model.prepare(&txn).unwrap();
                    model.commit(txn).unwrap();
                    winners.fetch_add(1, Ordering::SeqCst);
                }
                Err(Error::ConcurrentEdit { .. }) => {
                    model.rollback(txn).unwrap();
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // At least one edit went through; the rest either won sequentially or
    // backed off cleanly.
    assert!(winners.load(Ordering::SeqCst) >= 1);
    let row = model.find("city", &Key::from("sf")).unwrap().unwrap();
    assert_eq!(row.get(2), Some(&Value::Int64(850_000)));
}

#[test]
fn named_parent_unique_key() {
    let order = TableBuilder::new("order")
        .unwrap()
        .add_column("order_id", DataType::Int64)
        .unwrap()
        .add_column("country_abbreviation", DataType::String)
        .unwrap()
        .add_column("row_version", DataType::Int64)
        .unwrap()
        .row_version("row_version")
        .unwrap()
        .primary_key(&["order_id"])
        .unwrap()
        .foreign_key(
            "fk_order_country",
            &["country_abbreviation"],
            "country",
            Some("uk_country_abbreviation"),
        )
        .unwrap()
        .build()
        .unwrap();

    let model = DataModel::builder()
        .add_table(country_schema())
        .add_table(order)
        .build()
        .unwrap();

    let txn = model.begin();
    model
        .insert(&txn, "country", country("c1", "US", "United States"))
        .unwrap();
    model
        .insert(
            &txn,
            "order",
            vec![
                Value::Int64(1),
                Value::String("US".into()),
                Value::Int64(0),
            ],
        )
        .unwrap();
    let err = model
        .insert(
            &txn,
            "order",
            vec![
                Value::Int64(2),
                Value::String("ZZ".into()),
                Value::Int64(0),
            ],
        )
        .unwrap_err();
    assert!(matches!(err, Error::ReferentialIntegrity { .. }));
    commit(&model, txn);

    let orders = model
        .children_of("country", "fk_order_country", &Key::from("US"))
        .unwrap();
    assert_eq!(orders.len(), 1);
}

#[test]
fn null_foreign_key_means_unparented() {
    let province = TableBuilder::new("province")
        .unwrap()
        .add_column("province_id", DataType::String)
        .unwrap()
        .add_column("country_id", DataType::String)
        .unwrap()
        .add_column("row_version", DataType::Int64)
        .unwrap()
        .nullable(&["country_id"])
        .row_version("row_version")
        .unwrap()
        .primary_key(&["province_id"])
        .unwrap()
        .foreign_key("fk_province_country", &["country_id"], "country", None)
        .unwrap()
        .build()
        .unwrap();

    let model = DataModel::builder()
        .add_table(country_schema())
        .add_table(province)
        .build()
        .unwrap();

    let txn = model.begin();
    model
        .insert(
            &txn,
            "province",
            vec![
                Value::String("p1".into()),
                Value::Null,
                Value::Int64(0),
            ],
        )
        .unwrap();
    commit(&model, txn);

    assert!(model.find("province", &Key::from("p1")).unwrap().is_some());
}

#[test]
fn self_referential_foreign_key() {
    let employee = TableBuilder::new("employee")
        .unwrap()
        .add_column("employee_id", DataType::Int64)
        .unwrap()
        .add_column("manager_id", DataType::Int64)
        .unwrap()
        .add_column("row_version", DataType::Int64)
        .unwrap()
        .nullable(&["manager_id"])
        .row_version("row_version")
        .unwrap()
        .primary_key(&["employee_id"])
        .unwrap()
        .foreign_key("fk_employee_manager", &["manager_id"], "employee", None)
        .unwrap()
        .build()
        .unwrap();

    let model = DataModel::builder().add_table(employee).build().unwrap();

    let txn = model.begin();
    model
        .insert(
            &txn,
            "employee",
            vec![Value::Int64(1), Value::Null, Value::Int64(0)],
        )
        .unwrap();
    model
        .insert(
            &txn,
            "employee",
            vec![Value::Int64(2), Value::Int64(1), Value::Int64(0)],
        )
        .unwrap();
    let err = model
        .insert(
            &txn,
            "employee",
            vec![Value::Int64(3), Value::Int64(99), Value::Int64(0)],
        )
        .unwrap_err();
    assert!(matches!(err, Error::ReferentialIntegrity { .. }));

    // The manager has a report now.
    let err = model.delete(&txn, "employee", &Key::from(1i64)).unwrap_err();
    assert!(matches!(err, Error::ReferentialIntegrity { .. }));

    model.delete(&txn, "employee", &Key::from(2i64)).unwrap();
    model.delete(&txn, "employee", &Key::from(1i64)).unwrap();
    commit(&model, txn);
}
