mod support;

use mapped_rust::{Error, MappingError, ObjectId, StateType};
use support::{customer, id, order, Fixture, RecordingListener};

#[test]
fn same_id_gives_the_same_handle_without_reloading() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();

    let first = tx.get_object(&order(1)).unwrap();
    let loads = fixture.storage.load_count();
    let second = tx.get_object(&order(1)).unwrap();

    assert!(first.ptr_eq(&second));
    assert_eq!(first, second);
    assert_eq!(fixture.storage.load_count(), loads);
    assert_eq!(first.class_id(), "Order");
    assert_eq!(tx.state(&first).unwrap(), StateType::Unchanged);
}

#[test]
fn related_objects_share_handles_with_direct_lookups() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();
    let o1 = tx.get_object(&order(1)).unwrap();

    let c1 = tx.get_related_object(&o1, "Customer").unwrap().unwrap();
    let orders = tx.get_related_objects(&c1, "Orders").unwrap();

    assert!(c1.ptr_eq(&tx.get_object(&customer(1)).unwrap()));
    assert!(orders.contains_object(&o1));
}

#[test]
fn handles_are_bound_to_their_transaction() {
    let fixture = Fixture::new();
    let mut first = fixture.transaction();
    let mut second = fixture.transaction();

    let in_first = first.get_object(&order(1)).unwrap();
    let in_second = second.get_object(&order(1)).unwrap();

    assert!(!in_first.ptr_eq(&in_second));
    assert_ne!(in_first, in_second);
    assert!(matches!(
        second.get_value(&in_first, "OrderNumber"),
        Err(Error::TransactionsDiffer { id, transaction }) if id == order(1) && transaction == second.id()
    ));
}

#[test]
fn enlisting_a_foreign_handle() {
    let fixture = Fixture::new();
    let mut first = fixture.transaction();
    let mut second = fixture.transaction();
    let c1 = first.get_object(&customer(1)).unwrap();

    assert!(second.enlist_domain_object(&c1).unwrap());
    assert!(!second.enlist_domain_object(&c1).unwrap());
    assert!(second.is_enlisted(&c1));
    assert!(second.get_object(&customer(1)).unwrap().ptr_eq(&c1));
    assert_eq!(
        second.get_value(&c1, "Name").unwrap(),
        mapped_rust::Value::from("Alpha")
    );

    let o1 = second.get_object(&order(1)).unwrap();
    let foreign_o1 = first.get_object(&order(1)).unwrap();
    assert!(matches!(
        second.enlist_domain_object(&foreign_o1),
        Err(Error::ObjectAlreadyEnlisted(id)) if &id == o1.id()
    ));
}

#[test]
fn missing_objects() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();

    assert!(matches!(
        tx.get_object(&order(404)),
        Err(Error::ObjectNotFound(id)) if id == order(404)
    ));
    assert!(tx.try_get_object(&order(404)).unwrap().is_none());
    assert!(tx.try_get_object(&order(1)).unwrap().is_some());
    assert!(matches!(
        tx.get_object(&ObjectId::new("Ghost", 1)),
        Err(Error::Mapping(MappingError::UnknownClass(class))) if class == "Ghost"
    ));
}

#[test]
fn batch_load_uses_one_round_trip_per_provider() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();
    let ids = vec![customer(1), customer(2), order(3), id("Official", 1)];

    let objects = tx.get_objects(&ids).unwrap();

    assert_eq!(objects.iter().map(|o| o.id().clone()).collect::<Vec<_>>(), ids);
    assert_eq!(fixture.storage.load_count(), 1);
    assert_eq!(fixture.other.load_count(), 1);

    assert!(matches!(
        tx.get_objects(&[customer(3), customer(99)]),
        Err(Error::ObjectNotFound(id)) if id == customer(99)
    ));
}

#[test]
fn new_objects_get_fresh_ids_and_defaults() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();

    let first = tx.new_object("Order").unwrap();
    let second = tx.new_object("Order").unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(tx.state(&first).unwrap(), StateType::New);
    assert_eq!(tx.get_value(&first, "OrderNumber").unwrap(), mapped_rust::Value::Int(0));
    assert_eq!(tx.get_value(&first, "Note").unwrap(), mapped_rust::Value::Null);
    assert_eq!(tx.timestamp(&first).unwrap(), None);
    assert!(tx.get_object(first.id()).unwrap().ptr_eq(&first));
    assert!(!fixture.storage.contains(first.id()).unwrap());
}

#[test]
fn abstract_and_unknown_classes_cannot_be_instantiated() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();

    assert!(matches!(
        tx.new_object("Partner"),
        Err(Error::Mapping(MappingError::AbstractClass(class))) if class == "Partner"
    ));
    assert!(matches!(
        tx.new_object("Ghost"),
        Err(Error::Mapping(MappingError::UnknownClass(_)))
    ));
}

#[test]
fn creating_listener_can_cancel_new_objects() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();
    let listener = RecordingListener::new();
    listener.veto("creating Order");
    tx.add_listener("recorder", listener.clone()).unwrap();

    assert!(tx.new_object("Order").unwrap_err().is_cancelled());
    assert!(tx.new_object("Customer").is_ok());
    assert_eq!(listener.events(), vec!["creating Order", "creating Customer"]);
    assert_eq!(tx.enlisted_objects().count(), 1);
}

#[test]
fn listener_keys_are_unique() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();
    tx.add_listener("recorder", RecordingListener::new()).unwrap();

    assert!(matches!(
        tx.add_listener("recorder", RecordingListener::new()),
        Err(Error::DuplicateListener(key)) if key == "recorder"
    ));
    assert!(tx.remove_listener("recorder").is_some());
    assert!(tx.listeners().is_empty());
}

#[test]
fn discarded_transaction_rejects_everything() {
    let fixture = Fixture::new();
    let mut tx = fixture.transaction();
    let o1 = tx.get_object(&order(1)).unwrap();

    tx.discard();

    assert!(tx.is_discarded());
    assert!(matches!(tx.get_object(&order(2)), Err(Error::TransactionDiscarded)));
    assert!(matches!(tx.get_value(&o1, "OrderNumber"), Err(Error::TransactionDiscarded)));
    assert!(matches!(tx.new_object("Order"), Err(Error::TransactionDiscarded)));
    assert!(matches!(tx.commit(), Err(Error::TransactionDiscarded)));
    assert!(matches!(tx.rollback(), Err(Error::TransactionDiscarded)));
}

#[test]
fn transaction_ids_are_distinct() {
    let fixture = Fixture::new();
    let first = fixture.transaction();
    let second = fixture.transaction();

    assert_ne!(first.id(), second.id());
    assert!(first.parent_id().is_none());
    assert!(!first.is_sub_transaction());
    assert!(format!("{}", first.id()).starts_with("tx#"));
}
