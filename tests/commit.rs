mod support;

use mapped_rust::{Error, StateType, StorageError, Timestamp, Value};
use support::{customer, id, order, Fixture, RecordingListener};

#[test]
fn commit_writes_values_and_refreshes_timestamps() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();
    let o1 = tx.get_object(&order(1)).unwrap();
    tx.set_value(&o1, "OrderNumber", 11).unwrap();
    tx.set_value(&o1, "Note", "call first").unwrap();

    tx.commit().unwrap();

    assert_eq!(
        fixture.storage.row_value(&order(1), "OrderNumber").unwrap(),
        Some(Value::Int(11))
    );
    assert_eq!(fixture.storage.row_value(&order(1), "Note").unwrap(), None);
    assert_eq!(fixture.storage.timestamp(&order(1)).unwrap(), Some(Timestamp(2)));
    assert_eq!(tx.timestamp(&o1).unwrap(), Some(Timestamp(2)));
    assert_eq!(tx.state(&o1).unwrap(), StateType::Unchanged);
    assert_eq!(tx.get_original_value(&o1, "OrderNumber").unwrap(), Value::Int(11));
    assert!(!tx.has_changes());
}

#[test]
fn transaction_only_change_is_not_written() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();
    let o2 = tx.get_object(&order(2)).unwrap();
    tx.set_value(&o2, "Note", "scratch").unwrap();
    assert_eq!(tx.state(&o2).unwrap(), StateType::Changed);

    tx.commit().unwrap();

    assert_eq!(fixture.storage.timestamp(&order(2)).unwrap(), Some(Timestamp(1)));
    assert_eq!(tx.state(&o2).unwrap(), StateType::Unchanged);
    assert_eq!(tx.get_value(&o2, "Note").unwrap(), Value::Text("scratch".into()));
}

#[test]
fn new_objects_are_inserted_with_their_relations() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();
    let c3 = tx.get_object(&customer(3)).unwrap();
    let fresh = tx.new_object("Order").unwrap();
    tx.set_value(&fresh, "OrderNumber", 40).unwrap();
    tx.related_objects_mut(&c3, "Orders").unwrap().add(&fresh).unwrap();
    assert_eq!(tx.timestamp(&fresh).unwrap(), None);

    tx.commit().unwrap();

    let stored = fixture.storage.row_values(fresh.id()).unwrap().unwrap();
    assert_eq!(stored.get("OrderNumber"), Some(&Value::Int(40)));
    assert_eq!(stored.get("Customer"), Some(&Value::from(customer(3))));
    assert_eq!(tx.state(&fresh).unwrap(), StateType::Unchanged);
    assert_eq!(tx.timestamp(&fresh).unwrap(), Some(Timestamp(1)));

    let mut other = fixture.transaction();
    let c3 = other.get_object(&customer(3)).unwrap();
    let orders: Vec<_> = other
        .get_related_objects(&c3, "Orders")
        .unwrap()
        .ids()
        .cloned()
        .collect();
    assert_eq!(orders, vec![fresh.id().clone()]);
}

#[test]
fn rollback_restores_values_and_relations() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();
    let listener = RecordingListener::new();
    tx.add_listener("recorder", listener.clone()).unwrap();
    let o1 = tx.get_object(&order(1)).unwrap();
    let c1 = tx.get_object(&customer(1)).unwrap();
    let c2 = tx.get_object(&customer(2)).unwrap();
    let fresh = tx.new_object("Order").unwrap();
    tx.set_value(&o1, "OrderNumber", 99).unwrap();
    tx.set_related_object(&o1, "Customer", Some(&c2)).unwrap();
    tx.set_related_object(&fresh, "Customer", Some(&c1)).unwrap();
    listener.clear();

    tx.rollback().unwrap();

    assert_eq!(listener.events(), vec!["rolling back 4", "rolled back 4"]);
    assert_eq!(tx.get_value(&o1, "OrderNumber").unwrap(), Value::Int(1));
    assert_eq!(tx.get_related_object(&o1, "Customer").unwrap(), Some(c1.clone()));
    let c1_orders: Vec<_> = tx
        .get_related_objects(&c1, "Orders")
        .unwrap()
        .ids()
        .cloned()
        .collect();
    assert_eq!(c1_orders, vec![order(1), order(2)]);
    assert_eq!(tx.state(&fresh).unwrap(), StateType::Discarded);
    for object in [&o1, &c1, &c2] {
        assert_eq!(tx.state(object).unwrap(), StateType::Unchanged);
        assert!(!tx.has_been_touched(object).unwrap());
    }
    assert!(!tx.has_changes());
    assert_eq!(fixture.storage.row_value(&order(1), "OrderNumber").unwrap(), Some(Value::Int(1)));
}

#[test]
fn stale_update_is_a_concurrency_violation() {
    let fixture = Fixture::new();
    let mut first = fixture.transaction();
    let mut second = fixture.transaction();
    let in_first = first.get_object(&order(1)).unwrap();
    let in_second = second.get_object(&order(1)).unwrap();

    first.set_value(&in_first, "OrderNumber", 10).unwrap();
    first.commit().unwrap();
    second.set_value(&in_second, "OrderNumber", 20).unwrap();
    let err = second.commit().unwrap_err();

    assert!(err.is_concurrency_violation());
    assert!(matches!(
        &err,
        Error::Storage(StorageError::ConcurrencyViolation { ids }) if ids == &vec![order(1)]
    ));
    assert_eq!(
        fixture.storage.row_value(&order(1), "OrderNumber").unwrap(),
        Some(Value::Int(10))
    );
    assert_eq!(second.state(&in_second).unwrap(), StateType::Changed);
    assert_eq!(second.get_value(&in_second, "OrderNumber").unwrap(), Value::Int(20));
}

#[test]
fn deleting_a_row_someone_else_deleted_conflicts() {
    let fixture = Fixture::new();
    let mut first = fixture.transaction();
    let mut second = fixture.transaction();
    let in_first = first.get_object(&id("Computer", 2)).unwrap();
    let in_second = second.get_object(&id("Computer", 2)).unwrap();

    first.delete(&in_first).unwrap();
    first.commit().unwrap();
    second.set_value(&in_second, "SerialNumber", "C-2b").unwrap();

    assert!(second.commit().unwrap_err().is_concurrency_violation());
}

#[test]
fn committed_delete_removes_the_row() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();
    let o3 = tx.get_object(&order(3)).unwrap();
    let c2 = tx.get_object(&customer(2)).unwrap();

    tx.delete(&o3).unwrap();
    tx.commit().unwrap();

    assert!(!fixture.storage.contains(&order(3)).unwrap());
    assert!(matches!(tx.state(&o3), Ok(StateType::Discarded)));
    assert!(matches!(
        tx.get_value(&o3, "OrderNumber"),
        Err(Error::ObjectInvalid(_))
    ));
    assert!(tx.get_related_objects(&c2, "Orders").unwrap().is_empty());
    assert_eq!(tx.state(&c2).unwrap(), StateType::Unchanged);
}

#[test]
fn delete_with_referencing_rows_saves_referrers_first() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();
    let boss = tx.get_object(&support::employee(1)).unwrap();

    tx.delete(&boss).unwrap();
    tx.commit().unwrap();

    assert!(!fixture.storage.contains(&support::employee(1)).unwrap());
    assert_eq!(
        fixture.storage.row_value(&support::employee(2), "Supervisor").unwrap(),
        Some(Value::Null)
    );
}

#[test]
fn missing_mandatory_relation_blocks_commit() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();
    let item = tx.new_object("OrderItem").unwrap();
    tx.set_value(&item, "Product", "Cup").unwrap();

    let err = tx.commit().unwrap_err();

    assert!(matches!(
        err,
        Error::MandatoryRelationNotSet { ref id, ref property } if id == item.id() && property == "Order"
    ));
    assert_eq!(tx.state(&item).unwrap(), StateType::New);
    assert!(!fixture.storage.contains(item.id()).unwrap());

    let o1 = tx.get_object(&order(1)).unwrap();
    tx.set_related_object(&item, "Order", Some(&o1)).unwrap();
    tx.commit().unwrap();
    assert!(fixture.storage.contains(item.id()).unwrap());
}

#[test]
fn failed_save_leaves_transaction_unchanged() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();
    let c1 = tx.get_object(&customer(1)).unwrap();
    tx.set_value(&c1, "Name", "Alpha Two").unwrap();
    fixture.storage.fail_next_save("disk full").unwrap();

    let err = tx.commit().unwrap_err();

    assert!(matches!(err, Error::Storage(StorageError::Provider(ref message)) if message == "disk full"));
    assert_eq!(tx.state(&c1).unwrap(), StateType::Changed);
    assert_eq!(tx.timestamp(&c1).unwrap(), Some(Timestamp(1)));

    tx.commit().unwrap();
    assert_eq!(
        fixture.storage.row_value(&customer(1), "Name").unwrap(),
        Some(Value::from("Alpha Two"))
    );
}

#[test]
fn committing_listener_can_cancel() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();
    let listener = RecordingListener::new();
    listener.veto("committing");
    tx.add_listener("recorder", listener.clone()).unwrap();
    let o1 = tx.get_object(&order(1)).unwrap();
    tx.set_value(&o1, "OrderNumber", 5).unwrap();

    let err = tx.commit().unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(
        fixture.storage.row_value(&order(1), "OrderNumber").unwrap(),
        Some(Value::Int(1))
    );
    assert!(tx.has_changes());
}

#[test]
fn commit_notifies_changed_objects() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();
    let listener = RecordingListener::new();
    tx.add_listener("recorder", listener.clone()).unwrap();
    let o1 = tx.get_object(&order(1)).unwrap();
    let c2 = tx.get_object(&customer(2)).unwrap();
    tx.set_related_object(&o1, "Customer", Some(&c2)).unwrap();
    listener.clear();

    tx.commit().unwrap();

    assert_eq!(listener.events(), vec!["committing 3", "committed 3"]);
}

#[test]
fn commit_spans_storage_providers() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();
    let official = tx.get_object(&id("Official", 1)).unwrap();
    let c1 = tx.get_object(&customer(1)).unwrap();
    tx.set_value(&official, "Name", "Olga B.").unwrap();
    tx.set_value(&c1, "Name", "Alpha B.").unwrap();

    tx.commit().unwrap();

    assert_eq!(
        fixture.other.row_value(&id("Official", 1), "Name").unwrap(),
        Some(Value::from("Olga B."))
    );
    assert_eq!(
        fixture.storage.row_value(&customer(1), "Name").unwrap(),
        Some(Value::from("Alpha B."))
    );
    assert!(!fixture.storage.contains(&id("Official", 1)).unwrap());
}

#[test]
fn reordering_a_collection_is_not_a_change_at_the_root() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();
    let c1 = tx.get_object(&customer(1)).unwrap();
    let o2 = tx.get_object(&order(2)).unwrap();

    {
        let mut orders = tx.related_objects_mut(&c1, "Orders").unwrap();
        assert!(orders.remove(&o2).unwrap());
        orders.insert(0, &o2).unwrap();
        assert_eq!(orders.ids().unwrap(), vec![order(2), order(1)]);
    }

    assert_eq!(tx.state(&c1).unwrap(), StateType::Unchanged);
    assert_eq!(tx.state(&o2).unwrap(), StateType::Unchanged);
    assert!(tx.has_been_touched(&c1).unwrap());
    assert!(tx.property_has_been_touched(&o2, "Customer").unwrap());
    assert!(!tx.has_changes());
}

#[cfg(feature = "emitter")]
#[test]
fn commit_emitter_forwards_committed_ids() {
    use mapped_rust::{CommitEmitter, COMMITTED};
    use std::sync::{Arc, Mutex};

    let fixture = Fixture::new();
    let mut tx = fixture.transaction();
    let emitter = Arc::new(CommitEmitter::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    emitter
        .on(COMMITTED, move |id: String| sink.lock().unwrap().push(id))
        .unwrap();
    tx.add_listener("emitter", emitter.clone()).unwrap();

    let o1 = tx.get_object(&order(1)).unwrap();
    tx.set_value(&o1, "OrderNumber", 7).unwrap();
    tx.commit().unwrap();

    // Subscribers run on the emitter's threads.
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(*seen.lock().unwrap(), vec![order(1).to_string()]);
}
