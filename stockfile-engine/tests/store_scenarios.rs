use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::sync::Arc;
use std::thread;

use stockfile_engine::audit::AuditCategory;
use stockfile_engine::storage::SLOT_SIZE;
use stockfile_engine::{ChangeEvent, Record, RecordStore, StoreConfig, StoreError};
use tempfile::{tempdir, TempDir};

fn setup() -> (TempDir, StoreConfig, RecordStore) {
    let dir = tempdir().unwrap();
    let config = StoreConfig::new(dir.path().join("products.db"))
        .with_audit_log(dir.path().join("operations.log"));
    let store = RecordStore::open(&config).unwrap();
    (dir, config, store)
}

fn ids(records: &[Record]) -> Vec<i32> {
    records.iter().map(|r| r.id).collect()
}

#[test]
fn tv_scenario() {
    let (_dir, _config, store) = setup();
    assert!(store.insert(Record::new(1, "TV", 10, 49990.0, "DNS")).unwrap());
    assert!(store.insert(Record::new(2, "TV", 3, 39990.0, "OZON")).unwrap());

    assert_eq!(ids(&store.search("name", "TV", "=").unwrap()), vec![1, 2]);
    assert_eq!(store.delete_where("supplier", "DNS").unwrap(), 1);
    assert!(store.search("id", "1", "=").unwrap().is_empty());
    assert_eq!(ids(&store.search("id", "2", "=").unwrap()), vec![2]);
    assert_eq!(ids(&store.get_all().unwrap()), vec![2]);
}

#[test]
fn quantity_range_queries() {
    let (_dir, _config, store) = setup();
    for (id, quantity) in [(1, 1), (2, 5), (3, 5), (4, 10)] {
        store.insert(Record::new(id, "Item", quantity, 1.0, "S")).unwrap();
    }

    assert_eq!(ids(&store.search("quantity", "5", ">=").unwrap()), vec![2, 3, 4]);
    assert_eq!(ids(&store.search("quantity", "5", "<").unwrap()), vec![1]);
    assert_eq!(ids(&store.search("quantity", "5", "<=").unwrap()), vec![1, 2, 3]);
    assert_eq!(ids(&store.search("quantity", "5", ">").unwrap()), vec![4]);
    assert_eq!(ids(&store.search("quantity", "5", "=").unwrap()), vec![2, 3]);
}

#[test]
fn price_range_queries_in_key_order() {
    let (_dir, _config, store) = setup();
    store.insert(Record::new(1, "A", 1, 30.0, "S")).unwrap();
    store.insert(Record::new(2, "B", 1, 10.0, "S")).unwrap();
    store.insert(Record::new(3, "C", 1, 20.5, "S")).unwrap();

    assert_eq!(ids(&store.search("price", "15", ">").unwrap()), vec![3, 1]);
    assert_eq!(ids(&store.search("price", "20.5", "<=").unwrap()), vec![2, 3]);
    assert!(store.search("price", "abc", ">").unwrap().is_empty());
}

#[test]
fn duplicate_insert_leaves_store_unchanged() {
    let (dir, _config, store) = setup();
    store.insert(Record::new(1, "TV", 10, 49990.0, "DNS")).unwrap();
    let before = fs::read(dir.path().join("products.db")).unwrap();

    assert!(!store.insert(Record::new(1, "Radio", 1, 1.0, "OZON")).unwrap());

    let after = fs::read(dir.path().join("products.db")).unwrap();
    assert_eq!(before, after);
    assert_eq!(store.get_all().unwrap(), vec![Record::new(1, "TV", 10, 49990.0, "DNS")]);
}

#[test]
fn indexes_stay_consistent_through_mixed_operations() {
    let (_dir, _config, store) = setup();
    for id in 0..40 {
        let supplier = if id % 3 == 0 { "DNS" } else { "OZON" };
        store
            .insert(Record::new(id, format!("Item {}", id % 7), id % 11, id as f64 * 1.5, supplier))
            .unwrap();
    }

    for id in (0..40).step_by(5) {
        store.delete_by_id(id).unwrap();
    }
    store.update("price", "9.99", "name", "Item 3").unwrap();
    store.update("supplier", "Ikea", "quantity", "4").unwrap();
    store.update("id", "100", "id", "7").unwrap();
    store.update("id", "8", "id", "9").unwrap();
    store.supply(11, 4).unwrap();
    store.sell(12, 1).unwrap();
    store.delete_where("name", "Item 6").unwrap();

    assert!(store.verify_indexes().unwrap());

    let listed: HashSet<i32> = ids(&store.get_all().unwrap()).into_iter().collect();
    assert_eq!(listed.len(), store.len());
    assert!(listed.contains(&100));
    assert!(!listed.contains(&7));
    for id in &listed {
        let found = store.search_eq("id", &id.to_string()).unwrap();
        assert_eq!(ids(&found), vec![*id]);
    }
}

#[test]
fn reopen_rebuilds_identical_indexes() {
    let (_dir, config, store) = setup();
    store.insert(Record::new(1, "TV", 10, 49990.0, "DNS")).unwrap();
    store.insert(Record::new(2, "TV", 3, 39990.0, "OZON")).unwrap();
    store.insert(Record::new(3, "Radio", 3, 990.0, "DNS")).unwrap();
    store.delete_by_id(2).unwrap();
    store.close();

    let first = RecordStore::open(&config).unwrap();
    let first_view = (
        first.search("quantity", "0", ">").unwrap(),
        first.search_eq("supplier", "DNS").unwrap(),
    );
    first.close();

    let second = RecordStore::open(&config).unwrap();
    let second_view = (
        second.search("quantity", "0", ">").unwrap(),
        second.search_eq("supplier", "DNS").unwrap(),
    );
    assert_eq!(first_view, second_view);
    assert_eq!(ids(&second_view.0), vec![3, 1]);
    assert_eq!(second.len(), 2);
    assert_eq!(second.load().unwrap(), 2);
}

#[test]
fn insert_after_torn_tail_stays_slot_aligned() {
    let (dir, config, store) = setup();
    let data = dir.path().join("products.db");
    store.insert(Record::new(1, "TV", 10, 49990.0, "DNS")).unwrap();
    store.close();

    let mut raw = fs::OpenOptions::new().append(true).open(&data).unwrap();
    raw.write_all(&[1, 2, 3]).unwrap();
    drop(raw);

    let store = RecordStore::open(&config).unwrap();
    assert!(store.insert(Record::new(2, "Radio", 3, 990.0, "OZON")).unwrap());
    assert_eq!(fs::metadata(&data).unwrap().len(), 2 * SLOT_SIZE as u64);
    assert!(store.verify_indexes().unwrap());
    store.close();

    let reopened = RecordStore::open(&config).unwrap();
    assert_eq!(
        reopened.get_all().unwrap(),
        vec![
            Record::new(1, "TV", 10, 49990.0, "DNS"),
            Record::new(2, "Radio", 3, 990.0, "OZON")
        ]
    );
    assert!(reopened.verify_indexes().unwrap());
}

#[test]
fn backup_onto_active_file_keeps_data() {
    let (dir, _config, store) = setup();
    store.insert(Record::new(1, "TV", 10, 49990.0, "DNS")).unwrap();

    let result = store.backup(dir.path().join("products.db"));
    assert!(matches!(result, Err(StoreError::BackupIsActive(_))));
    assert_eq!(ids(&store.get_all().unwrap()), vec![1]);
    assert_eq!(ids(&store.search_eq("id", "1").unwrap()), vec![1]);
}

#[test]
fn tombstones_persist_until_restore() {
    let (dir, _config, store) = setup();
    let backup = dir.path().join("products_backup.db");
    store.insert(Record::new(1, "TV", 10, 49990.0, "DNS")).unwrap();
    store.insert(Record::new(2, "Radio", 3, 990.0, "OZON")).unwrap();
    store.backup(&backup).unwrap();

    assert!(store.delete_by_id(1).unwrap());
    store.sell(2, 3).unwrap();
    assert!(store.search_eq("id", "1").unwrap().is_empty());

    // Deleted slots are never reclaimed
    let length = fs::metadata(dir.path().join("products.db")).unwrap().len();
    assert_eq!(length, 2 * SLOT_SIZE as u64);

    let mut sub = store.subscribe();
    assert_eq!(store.restore(&backup).unwrap(), 2);
    assert_eq!(sub.drain(), vec![ChangeEvent::Restored]);
    assert_eq!(ids(&store.search_eq("id", "1").unwrap()), vec![1]);
    assert_eq!(store.search_eq("id", "2").unwrap()[0].quantity, 3);
    assert!(store.verify_indexes().unwrap());
}

#[test]
fn restore_from_missing_backup_keeps_store_open() {
    let (dir, _config, store) = setup();
    store.insert(Record::new(1, "TV", 10, 49990.0, "DNS")).unwrap();

    let missing = dir.path().join("nope.db");
    assert!(matches!(store.restore(&missing), Err(StoreError::BackupNotFound(_))));
    assert!(store.is_open());
    assert_eq!(store.len(), 1);
}

#[test]
fn restore_from_active_file_just_rebuilds() {
    let (dir, _config, store) = setup();
    store.insert(Record::new(1, "TV", 10, 49990.0, "DNS")).unwrap();
    assert_eq!(store.restore(dir.path().join("products.db")).unwrap(), 1);
    assert_eq!(store.len(), 1);
}

#[test]
fn clear_and_create_new_empty_the_store() {
    let (dir, _config, store) = setup();
    store.insert(Record::new(1, "TV", 10, 49990.0, "DNS")).unwrap();
    store.clear().unwrap();
    assert!(store.get_all().unwrap().is_empty());
    assert_eq!(fs::metadata(dir.path().join("products.db")).unwrap().len(), 0);

    store.insert(Record::new(1, "TV", 10, 49990.0, "DNS")).unwrap();
    let other = dir.path().join("other.db");
    store.create_new(&other).unwrap();
    assert_eq!(store.path(), Some(other));
    assert!(store.is_empty());
}

#[test]
fn csv_export_then_import() {
    let (dir, _config, store) = setup();
    store.insert(Record::new(1, "TV; 55 inch", 10, 49990.0, "DNS")).unwrap();
    store.insert(Record::new(2, "Radio", 3, 990.125, "OZON")).unwrap();

    let csv = dir.path().join("export.csv");
    assert_eq!(store.export_csv(&csv).unwrap(), 2);
    let text = fs::read_to_string(&csv).unwrap();
    assert!(text.contains("1;TV, 55 inch;10;49990.00;DNS"));

    let copy = RecordStore::open(&StoreConfig::new(dir.path().join("copy.db")).without_audit_log())
        .unwrap();
    copy.insert(Record::new(2, "Existing", 1, 1.0, "X")).unwrap();
    assert_eq!(copy.import_csv(&csv).unwrap(), (1, 1));
    assert_eq!(copy.search_eq("id", "1").unwrap()[0].name, "TV, 55 inch");
}

#[test]
fn import_stops_at_malformed_line() {
    let (dir, _config, store) = setup();
    let csv = dir.path().join("bad.csv");
    fs::write(&csv, "id;name;quantity;price;supplier\n1;TV;1;1.0;DNS\n2;Radio;x;1.0;DNS\n3;Lamp;1;1.0;DNS\n")
        .unwrap();

    match store.import_csv(&csv) {
        Err(StoreError::InvalidCsv { line, .. }) => assert_eq!(line, 3),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(ids(&store.get_all().unwrap()), vec![1]);
}

#[test]
fn audit_trail_is_readable_through_config_path() {
    let (_dir, config, store) = setup();
    store.insert(Record::new(1, "TV", 10, 49990.0, "DNS")).unwrap();
    store.update("price", "100", "id", "1").unwrap();
    store.sell(1, 1).unwrap();

    let log = stockfile_engine::audit::AuditLog::new(config.audit_log.clone());
    let categories: Vec<AuditCategory> = log.entries().unwrap().iter().map(|e| e.category).collect();
    assert_eq!(
        categories,
        vec![
            AuditCategory::Other,
            AuditCategory::Add,
            AuditCategory::Update,
            AuditCategory::Sell
        ]
    );
}

#[test]
fn concurrent_callers_are_serialized() {
    let (_dir, _config, store) = setup();
    let store = Arc::new(store);
    store.insert(Record::new(0, "Shared", 0, 1.0, "S")).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..25 {
                    let id = 1 + t * 25 + i;
                    assert!(store.insert(Record::new(id, "Item", 1, 1.0, "S")).unwrap());
                    assert!(store.supply(0, 1).unwrap());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.len(), 101);
    assert_eq!(store.search_eq("id", "0").unwrap()[0].quantity, 100);
    assert!(store.verify_indexes().unwrap());
}
