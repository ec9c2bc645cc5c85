//! Property tests over generated DDL+DML sequences: primary key
//! uniqueness, index consistency, referential integrity, persistence
//! round-trips, and the delete/update counting laws.

use common::DbError;
use proptest::prelude::*;
use storage::SnapshotStore;
use testsupport::prelude::*;
use types::Value;

#[derive(Clone, Debug)]
enum Op {
    Insert { id: i64, v: i64 },
    DeleteWhere { v: i64 },
    UpdateWhere { v: i64, to: i64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0i64..16, 0i64..6).prop_map(|(id, v)| Op::Insert { id, v }),
        (0i64..6).prop_map(|v| Op::DeleteWhere { v }),
        (0i64..6, 0i64..6).prop_map(|(v, to)| Op::UpdateWhere { v, to }),
    ]
}

/// Reference model: the table contents as plain tuples in row order.
fn apply_model(model: &mut Vec<(i64, i64)>, op: &Op) {
    match op {
        Op::Insert { id, v } => {
            if !model.iter().any(|(existing, _)| existing == id) {
                model.push((*id, *v));
            }
        }
        Op::DeleteWhere { v } => model.retain(|(_, value)| value != v),
        Op::UpdateWhere { v, to } => {
            for row in model.iter_mut() {
                if row.1 == *v {
                    row.1 = *to;
                }
            }
        }
    }
}

fn apply_engine(db: &TestDb, op: &Op) {
    match op {
        Op::Insert { id, v } => {
            let result = db.run(&format!("INSERT INTO T VALUES ({id}, {v})"));
            match result {
                Ok(_) => {}
                Err(DbError::Constraint(_)) => {}
                Err(other) => panic!("unexpected insert failure: {other}"),
            }
        }
        Op::DeleteWhere { v } => {
            db.ok(&format!("DELETE FROM T WHERE v = {v}"));
        }
        Op::UpdateWhere { v, to } => {
            // collides only when both old and new keys exist; the pk here
            // never changes, so updates always succeed
            db.ok(&format!("UPDATE T SET v = {to} WHERE v = {v}"));
        }
    }
}

fn table_rows(db: &TestDb) -> Vec<(i64, i64)> {
    let batch = db.rows("SELECT * FROM T");
    values(&batch)
        .into_iter()
        .map(|row| match (&row[0], &row[1]) {
            (Value::Int(id), Value::Int(v)) => (*id, *v),
            other => panic!("unexpected cells {other:?}"),
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn engine_matches_model_and_invariants_hold(ops in prop::collection::vec(op_strategy(), 1..24)) {
        let db = TestDb::new();
        db.ok("CREATE TABLE T (id INT PRIMARY KEY, v INT); CREATE INDEX t_v ON T(v)");

        let mut model: Vec<(i64, i64)> = Vec::new();
        for op in &ops {
            apply_engine(&db, op);
            apply_model(&mut model, op);
        }

        // engine contents equal the model, in row order
        prop_assert_eq!(table_rows(&db), model.clone());

        // primary keys stay unique
        let mut ids: Vec<i64> = model.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids.dedup();
        prop_assert_eq!(ids.len(), model.len());

        // reloading the snapshots reconstructs the same catalog
        let store = SnapshotStore::open(db.config()).unwrap();
        let catalog = store.load_db().unwrap();
        let table = catalog.table("T").unwrap();
        prop_assert_eq!(table.rows.len(), model.len());
        for (row, (id, v)) in table.rows.iter().zip(&model) {
            prop_assert_eq!(&row.values[0], &Value::Int(*id));
            prop_assert_eq!(&row.values[1], &Value::Int(*v));
        }

        // every index entry is exactly the set of row ids holding the value
        let indexes = store.load_index().unwrap();
        for (column, index) in indexes.table_indexes("T").unwrap() {
            let ordinal = table.column_index(column).unwrap();
            let mut seen = 0usize;
            for (value, row_ids) in index.iter() {
                for &row_id in row_ids {
                    prop_assert!(row_id < table.rows.len());
                    prop_assert_eq!(&table.rows[row_id].values[ordinal], value);
                    seen += 1;
                }
            }
            prop_assert_eq!(seen, table.rows.len());
        }
    }

    #[test]
    fn delete_count_law(rows in prop::collection::vec((0i64..32, 0i64..4), 0..16), v in 0i64..4) {
        let db = TestDb::new();
        db.ok("CREATE TABLE T (id INT PRIMARY KEY, v INT)");
        let mut inserted = Vec::new();
        for (id, value) in rows {
            if db.run(&format!("INSERT INTO T VALUES ({id}, {value})")).is_ok() {
                inserted.push((id, value));
            }
        }

        let before = table_rows(&db).len();
        let removed = db.count(&format!("DELETE FROM T WHERE v = {v}"));
        let after = table_rows(&db).len();

        prop_assert_eq!(before - after, removed as usize);
        prop_assert_eq!(removed as usize, inserted.iter().filter(|(_, value)| *value == v).count());
    }

    #[test]
    fn update_preserves_row_count(rows in prop::collection::vec((0i64..32, 0i64..4), 0..16), v in 0i64..4) {
        let db = TestDb::new();
        db.ok("CREATE TABLE T (id INT PRIMARY KEY, v INT)");
        for (id, value) in rows {
            let _ = db.run(&format!("INSERT INTO T VALUES ({id}, {value})"));
        }

        let before = table_rows(&db);
        let modified = db.count(&format!("UPDATE T SET v = 99 WHERE v = {v}"));
        let after = table_rows(&db);

        prop_assert_eq!(before.len(), after.len());
        prop_assert_eq!(modified as usize, before.iter().filter(|(_, value)| *value == v).count());
        for ((id_before, v_before), (id_after, v_after)) in before.iter().zip(&after) {
            prop_assert_eq!(id_before, id_after);
            if *v_before == v {
                prop_assert_eq!(*v_after, 99);
            } else {
                prop_assert_eq!(v_after, v_before);
            }
        }
    }

    #[test]
    fn sort_is_stable_across_tied_keys(keys in prop::collection::vec(0i64..3, 2..12)) {
        let db = TestDb::new();
        db.ok("CREATE TABLE T (id INT PRIMARY KEY, k INT)");
        for (id, key) in keys.iter().enumerate() {
            db.ok(&format!("INSERT INTO T VALUES ({id}, {key})"));
        }

        let batch = db.rows("SELECT * FROM T ORDER BY k ASC");
        let sorted = table_rows_from(&batch);

        // ties keep insertion order: ids within one key value stay ascending
        for window in sorted.windows(2) {
            let ((id_a, k_a), (id_b, k_b)) = (window[0], window[1]);
            prop_assert!(k_a <= k_b);
            if k_a == k_b {
                prop_assert!(id_a < id_b);
            }
        }
    }
}

fn table_rows_from(batch: &common::RecordBatch) -> Vec<(i64, i64)> {
    values(batch)
        .into_iter()
        .map(|row| match (&row[0], &row[1]) {
            (Value::Int(id), Value::Int(v)) => (*id, *v),
            other => panic!("unexpected cells {other:?}"),
        })
        .collect()
}

#[test]
fn referential_integrity_is_preserved() {
    let db = TestDb::new();
    db.ok(SHOP_SCHEMA);
    db.ok(SHOP_DATA);

    // every mutation that would break the FK is rejected
    assert!(db.run("INSERT INTO Orders VALUES (104, 9, 1.0)").is_err());
    assert!(db.run("UPDATE Orders SET UserID = 9 WHERE OrderID = 101").is_err());

    // all non-NULL Orders.UserID values exist in Users.UserID
    let users = db.rows("SELECT UserID FROM Users");
    let user_ids: Vec<Value> = values(&users).into_iter().map(|mut r| r.remove(0)).collect();
    let orders = db.rows("SELECT UserID FROM Orders");
    for mut row in values(&orders) {
        let user = row.remove(0);
        if user != Value::Null {
            assert!(user_ids.contains(&user), "dangling FK value {user:?}");
        }
    }
}
