#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};

use mapped_rust::{
    ClassBuilder, ClientTransaction, InMemoryStorageProvider, ListenerError, ListenerResult,
    MappingBuilder, MappingConfiguration, ObjectId, PropertyBuilder, RelationBuilder,
    RelationEndPointId, StorageProviderRegistry, TransactionId, TransactionListener, Value,
};

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Customers and their orders, order items and tickets; employees with supervisors and
/// computers; officials kept by a second provider.
pub fn mapping() -> Arc<MappingConfiguration> {
    MappingBuilder::new()
        .class(ClassBuilder::new("Company").property(PropertyBuilder::text("Name").max_length(20)))
        .class(
            ClassBuilder::new("Customer")
                .base("Company")
                .property(PropertyBuilder::int("CustomerSince").nullable()),
        )
        .class(
            ClassBuilder::new("Order")
                .property(PropertyBuilder::int("OrderNumber"))
                .property(PropertyBuilder::text("Note").nullable().transaction_only()),
        )
        .class(ClassBuilder::new("OrderItem").property(PropertyBuilder::text("Product")))
        .class(ClassBuilder::new("OrderTicket").property(PropertyBuilder::text("FileName")))
        .class(ClassBuilder::new("Employee").property(PropertyBuilder::text("Name")))
        .class(ClassBuilder::new("Computer").property(PropertyBuilder::text("SerialNumber")))
        .class(
            ClassBuilder::new("Official")
                .storage_provider("other")
                .property(PropertyBuilder::text("Name")),
        )
        .class(ClassBuilder::new("Partner").abstract_class())
        .relation(RelationBuilder::one_to_many(
            "Order:Customer",
            ("Order", "Customer"),
            ("Customer", "Orders"),
        ))
        .relation(
            RelationBuilder::one_to_many(
                "OrderItem:Order",
                ("OrderItem", "Order"),
                ("Order", "OrderItems"),
            )
            .mandatory_real(),
        )
        .relation(RelationBuilder::one_to_one(
            "OrderTicket:Order",
            ("OrderTicket", "Order"),
            ("Order", "OrderTicket"),
        ))
        .relation(RelationBuilder::one_to_many(
            "Employee:Supervisor",
            ("Employee", "Supervisor"),
            ("Employee", "Subordinates"),
        ))
        .relation(RelationBuilder::one_to_one(
            "Computer:Employee",
            ("Computer", "Employee"),
            ("Employee", "Computer"),
        ))
        .build()
        .unwrap()
}

pub fn id(class: &str, key: i64) -> ObjectId {
    ObjectId::new(class, key)
}

pub fn customer(key: i64) -> ObjectId {
    id("Customer", key)
}

pub fn order(key: i64) -> ObjectId {
    id("Order", key)
}

pub fn employee(key: i64) -> ObjectId {
    id("Employee", key)
}

pub struct Fixture {
    pub mapping: Arc<MappingConfiguration>,
    pub storage: InMemoryStorageProvider,
    pub other: InMemoryStorageProvider,
    pub providers: StorageProviderRegistry,
}

impl Fixture {
    /// Seeded with:
    /// Customer 1 (orders 1, 2), Customer 2 (order 3), Customer 3 (no orders);
    /// OrderItem 1 and 2 in order 1; OrderTicket 1 for order 1;
    /// Employee 1 supervising 2 and 3, Employee 4 alone; Computer 1 used by employee 2,
    /// Computer 2 unused; Official 1 in the "other" provider.
    pub fn new() -> Self {
        init_tracing();
        let storage = InMemoryStorageProvider::new("default");
        let other = InMemoryStorageProvider::new("other");

        let rows: Vec<(ObjectId, Vec<(&str, Value)>)> = vec![
            (customer(1), vec![("Name", "Alpha".into())]),
            (customer(2), vec![("Name", "Beta".into())]),
            (customer(3), vec![("Name", "Gamma".into())]),
            (order(1), vec![("OrderNumber", 1.into()), ("Customer", customer(1).into())]),
            (order(2), vec![("OrderNumber", 2.into()), ("Customer", customer(1).into())]),
            (order(3), vec![("OrderNumber", 3.into()), ("Customer", customer(2).into())]),
            (id("OrderItem", 1), vec![("Product", "Pen".into()), ("Order", order(1).into())]),
            (id("OrderItem", 2), vec![("Product", "Ink".into()), ("Order", order(1).into())]),
            (
                id("OrderTicket", 1),
                vec![("FileName", "one.txt".into()), ("Order", order(1).into())],
            ),
            (employee(1), vec![("Name", "Boss".into())]),
            (employee(2), vec![("Name", "Ann".into()), ("Supervisor", employee(1).into())]),
            (employee(3), vec![("Name", "Bob".into()), ("Supervisor", employee(1).into())]),
            (employee(4), vec![("Name", "Cid".into())]),
            (
                id("Computer", 1),
                vec![("SerialNumber", "C-1".into()), ("Employee", employee(2).into())],
            ),
            (id("Computer", 2), vec![("SerialNumber", "C-2".into())]),
        ];
        for (id, values) in rows {
            storage.insert_row(id, values).unwrap();
        }
        other
            .insert_row(id("Official", 1), [("Name", Value::from("Olga"))])
            .unwrap();

        let providers = StorageProviderRegistry::new()
            .with(Arc::new(storage.clone()))
            .unwrap()
            .with(Arc::new(other.clone()))
            .unwrap();

        Fixture {
            mapping: mapping(),
            storage,
            other,
            providers,
        }
    }

    pub fn transaction(&self) -> ClientTransaction<'static> {
        ClientTransaction::new_root(self.mapping.clone(), self.providers.clone())
    }
}

/// Records every notification as a line of text and can veto chosen "changing" calls.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<String>>,
    veto: Mutex<Option<String>>,
    fail_after: Mutex<Option<String>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    /// Cancel the first "changing" event whose line starts with `prefix`.
    pub fn veto(&self, prefix: &str) {
        *self.veto.lock().unwrap() = Some(prefix.to_string());
    }

    /// Fail every "changed" event whose line starts with `prefix`.
    pub fn fail_after(&self, prefix: &str) {
        *self.fail_after.lock().unwrap() = Some(prefix.to_string());
    }

    fn before(&self, line: String) -> ListenerResult {
        let vetoed = self
            .veto
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|prefix| line.starts_with(prefix.as_str()));
        self.events.lock().unwrap().push(line);
        if vetoed {
            return Err(ListenerError::cancel());
        }
        Ok(())
    }

    fn after(&self, line: String) -> ListenerResult {
        let failed = self
            .fail_after
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|prefix| line.starts_with(prefix.as_str()));
        self.events.lock().unwrap().push(line);
        if failed {
            return Err(ListenerError::new("after listener failed"));
        }
        Ok(())
    }
}

fn opt(id: Option<&ObjectId>) -> String {
    id.map_or_else(|| "null".to_string(), ToString::to_string)
}

impl TransactionListener for RecordingListener {
    fn new_object_creating(&self, _tx: TransactionId, class_id: &str) -> ListenerResult {
        self.before(format!("creating {class_id}"))
    }

    fn property_value_changing(
        &self,
        _tx: TransactionId,
        id: &ObjectId,
        property: &str,
        old: &Value,
        new: &Value,
    ) -> ListenerResult {
        self.before(format!("value changing {id}.{property} {old} -> {new}"))
    }

    fn property_value_changed(
        &self,
        _tx: TransactionId,
        id: &ObjectId,
        property: &str,
        old: &Value,
        new: &Value,
    ) -> ListenerResult {
        self.after(format!("value changed {id}.{property} {old} -> {new}"))
    }

    fn relation_changing(
        &self,
        _tx: TransactionId,
        id: &ObjectId,
        property: &str,
        old: Option<&ObjectId>,
        new: Option<&ObjectId>,
    ) -> ListenerResult {
        self.before(format!("relation changing {id}.{property} {} -> {}", opt(old), opt(new)))
    }

    fn relation_changed(
        &self,
        _tx: TransactionId,
        id: &ObjectId,
        property: &str,
        old: Option<&ObjectId>,
        new: Option<&ObjectId>,
    ) -> ListenerResult {
        self.after(format!("relation changed {id}.{property} {} -> {}", opt(old), opt(new)))
    }

    fn collection_adding(&self, _tx: TransactionId, end_point: &RelationEndPointId, item: &ObjectId) -> ListenerResult {
        self.before(format!("adding {end_point} {item}"))
    }

    fn collection_added(&self, _tx: TransactionId, end_point: &RelationEndPointId, item: &ObjectId) -> ListenerResult {
        self.after(format!("added {end_point} {item}"))
    }

    fn collection_removing(&self, _tx: TransactionId, end_point: &RelationEndPointId, item: &ObjectId) -> ListenerResult {
        self.before(format!("removing {end_point} {item}"))
    }

    fn collection_removed(&self, _tx: TransactionId, end_point: &RelationEndPointId, item: &ObjectId) -> ListenerResult {
        self.after(format!("removed {end_point} {item}"))
    }

    fn object_deleting(&self, _tx: TransactionId, id: &ObjectId) -> ListenerResult {
        self.before(format!("deleting {id}"))
    }

    fn object_deleted(&self, _tx: TransactionId, id: &ObjectId) -> ListenerResult {
        self.after(format!("deleted {id}"))
    }

    fn committing(&self, _tx: TransactionId, ids: &[ObjectId]) -> ListenerResult {
        self.before(format!("committing {}", ids.len()))
    }

    fn committed(&self, _tx: TransactionId, ids: &[ObjectId]) -> ListenerResult {
        self.after(format!("committed {}", ids.len()))
    }

    fn rolling_back(&self, _tx: TransactionId, ids: &[ObjectId]) -> ListenerResult {
        self.before(format!("rolling back {}", ids.len()))
    }

    fn rolled_back(&self, _tx: TransactionId, ids: &[ObjectId]) -> ListenerResult {
        self.after(format!("rolled back {}", ids.len()))
    }

    fn sub_transaction_created(&self, _parent: TransactionId, _child: TransactionId) -> ListenerResult {
        self.after("sub-transaction created".to_string())
    }
}
