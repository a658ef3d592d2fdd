//! ClientTransaction - the unit of work callers talk to.
//!
//! A root transaction loads from and commits to the storage providers. A sub-transaction
//! borrows its parent mutably, loads through it and commits into it.

mod scope;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::collection::{AssociatedCollection, DomainObjectCollection};
use crate::data::{DataContainer, StateType};
use crate::data_manager::DataManager;
use crate::domain_object::{DomainObject, PropertyAccessor};
use crate::end_point::RelationEndPointId;
use crate::error::{Error, Result};
use crate::listener::{cancelled, failed, ListenerCollection, TransactionListener};
use crate::mapping::{ClassDefinition, MappingConfiguration, MappingError};
use crate::object_id::ObjectId;
use crate::persistence::{ChangeSet, PersistenceStrategy, RootPersistenceStrategy, SubPersistenceStrategy};
use crate::storage::{StorageProviderRegistry, Timestamp};
use crate::value::Value;

pub use scope::{current_transaction_id, AutoRollbackBehavior, TransactionScope};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    pub(crate) fn next() -> Self {
        TransactionId(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// What the DataManager needs from its transaction while it works.
pub(crate) struct TransactionContext<'a, 'p> {
    pub(crate) id: TransactionId,
    pub(crate) persistence: &'a mut (dyn PersistenceStrategy + 'p),
    pub(crate) listeners: &'a ListenerCollection,
}

pub struct ClientTransaction<'p> {
    id: TransactionId,
    parent_id: Option<TransactionId>,
    mapping: Arc<MappingConfiguration>,
    data_manager: DataManager,
    persistence: Box<dyn PersistenceStrategy + 'p>,
    listeners: ListenerCollection,
    enlisted: HashMap<ObjectId, DomainObject>,
    discarded: bool,
}

impl ClientTransaction<'static> {
    pub fn new_root(mapping: Arc<MappingConfiguration>, providers: StorageProviderRegistry) -> Self {
        let persistence = RootPersistenceStrategy::new(mapping.clone(), providers);
        let transaction = ClientTransaction::with_persistence(
            TransactionId::next(),
            None,
            mapping,
            Box::new(persistence),
            ListenerCollection::new(),
        );
        tracing::debug!(tx = %transaction.id, "root transaction created");
        transaction
    }
}

impl<'p> ClientTransaction<'p> {
    fn with_persistence(
        id: TransactionId,
        parent_id: Option<TransactionId>,
        mapping: Arc<MappingConfiguration>,
        persistence: Box<dyn PersistenceStrategy + 'p>,
        listeners: ListenerCollection,
    ) -> Self {
        let data_manager = DataManager::new(mapping.clone(), persistence.change_detection());
        ClientTransaction {
            id,
            parent_id,
            mapping,
            data_manager,
            persistence,
            listeners,
            enlisted: HashMap::new(),
            discarded: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn parent_id(&self) -> Option<TransactionId> {
        self.parent_id
    }

    pub fn is_sub_transaction(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn mapping(&self) -> &Arc<MappingConfiguration> {
        &self.mapping
    }

    pub fn data_manager(&self) -> &DataManager {
        &self.data_manager
    }

    fn split(&mut self) -> (&mut DataManager, TransactionContext<'_, 'p>) {
        (
            &mut self.data_manager,
            TransactionContext {
                id: self.id,
                persistence: self.persistence.as_mut(),
                listeners: &self.listeners,
            },
        )
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Makes the transaction unusable. Every later call fails with `TransactionDiscarded`.
    pub fn discard(&mut self) {
        if !self.discarded {
            tracing::debug!(tx = %self.id, "transaction discarded");
        }
        self.discarded = true;
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    fn check_not_discarded(&self) -> Result<()> {
        if self.discarded {
            return Err(Error::TransactionDiscarded);
        }
        Ok(())
    }

    /// Creates a sub-transaction. The parent stays borrowed until the child is dropped;
    /// dropping the child discards its uncommitted changes.
    pub fn create_sub_transaction(&mut self) -> Result<ClientTransaction<'_>> {
        self.check_not_discarded()?;
        let parent_id = self.id;
        let child_id = TransactionId::next();
        let mapping = self.mapping.clone();
        let listeners = self.listeners.clone();

        listeners
            .after(|l| l.sub_transaction_created(parent_id, child_id))
            .map_err(failed)?;
        tracing::debug!(parent = %parent_id, tx = %child_id, "sub-transaction created");

        let persistence = SubPersistenceStrategy::new(self);
        Ok(ClientTransaction::with_persistence(
            child_id,
            Some(parent_id),
            mapping,
            Box::new(persistence),
            listeners,
        ))
    }

    /// Writes every change to the parent (sub-transaction) or to storage (root).
    pub fn commit(&mut self) -> Result<()> {
        self.check_not_discarded()?;
        let mut ctx = TransactionContext {
            id: self.id,
            persistence: self.persistence.as_mut(),
            listeners: &self.listeners,
        };
        self.data_manager.commit(&mut ctx, &self.enlisted)
    }

    /// Restores every loaded object to its original state and discards new objects.
    pub fn rollback(&mut self) -> Result<()> {
        self.check_not_discarded()?;
        let (dm, mut ctx) = self.split();
        dm.rollback(&mut ctx)
    }

    pub fn has_changes(&self) -> bool {
        !self.data_manager.changed_object_ids().is_empty()
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    pub fn add_listener(&mut self, key: impl Into<String>, listener: Arc<dyn TransactionListener>) -> Result<()> {
        self.listeners.add(key, listener)
    }

    pub fn remove_listener(&mut self, key: &str) -> Option<Arc<dyn TransactionListener>> {
        self.listeners.remove(key)
    }

    pub fn listeners(&self) -> &ListenerCollection {
        &self.listeners
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Creates an object of `class_id` with default values and a provider-assigned id.
    pub fn new_object(&mut self, class_id: &str) -> Result<DomainObject> {
        self.check_not_discarded()?;
        let class = self.mapping.class(class_id)?.clone();
        if class.is_abstract() {
            return Err(MappingError::AbstractClass(class_id.to_string()).into());
        }
        self.listeners
            .before(|l| l.new_object_creating(self.id, class_id))
            .map_err(cancelled)?;

        let id = self.persistence.new_object_id(&class)?;
        self.data_manager
            .register_new_data_container(DataContainer::new_object(id.clone(), class.clone()))?;
        let object = DomainObject::new(id.clone(), class);
        self.enlisted.insert(id, object.clone());
        Ok(object)
    }

    /// The object with `id`, loading it if needed. Deleted objects are an error.
    pub fn get_object(&mut self, id: &ObjectId) -> Result<DomainObject> {
        self.object_for(id, false)
    }

    pub fn get_object_including_deleted(&mut self, id: &ObjectId) -> Result<DomainObject> {
        self.object_for(id, true)
    }

    /// `None` instead of `ObjectNotFound`.
    pub fn try_get_object(&mut self, id: &ObjectId) -> Result<Option<DomainObject>> {
        match self.object_for(id, false) {
            Ok(object) => Ok(Some(object)),
            Err(Error::ObjectNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Loads every missing object in one round-trip per storage provider.
    pub fn get_objects(&mut self, ids: &[ObjectId]) -> Result<Vec<DomainObject>> {
        self.check_not_discarded()?;
        {
            let (dm, mut ctx) = self.split();
            dm.load_data_containers(&mut ctx, ids)?;
        }
        ids.iter().map(|id| self.object_for(id, false)).collect()
    }

    fn object_for(&mut self, id: &ObjectId, include_deleted: bool) -> Result<DomainObject> {
        self.check_not_discarded()?;
        let class = {
            let (dm, mut ctx) = self.split();
            let container = dm.get_data_container(&mut ctx, id)?;
            if container.is_deleted() && !include_deleted {
                return Err(Error::ObjectDeleted(id.clone()));
            }
            container.class().clone()
        };
        Ok(self.enlist_loaded(id, class))
    }

    fn enlist_loaded(&mut self, id: &ObjectId, class: Arc<ClassDefinition>) -> DomainObject {
        if let Some(object) = self.enlisted.get(id) {
            return object.clone();
        }
        let object = self
            .persistence
            .enlisted_object(id)
            .unwrap_or_else(|| DomainObject::new(id.clone(), class));
        self.enlisted.insert(id.clone(), object.clone());
        object
    }

    /// Makes a domain object from another transaction usable here without loading it.
    /// Returns false if it was enlisted already.
    pub fn enlist_domain_object(&mut self, object: &DomainObject) -> Result<bool> {
        self.check_not_discarded()?;
        if let Some(existing) = self.enlisted.get(object.id()) {
            if existing.ptr_eq(object) {
                return Ok(false);
            }
            return Err(Error::ObjectAlreadyEnlisted(object.id().clone()));
        }
        if let Some(existing) = self.persistence.enlisted_object(object.id()) {
            if !existing.ptr_eq(object) {
                return Err(Error::ObjectAlreadyEnlisted(object.id().clone()));
            }
        }
        self.enlisted.insert(object.id().clone(), object.clone());
        Ok(true)
    }

    pub fn is_enlisted(&self, object: &DomainObject) -> bool {
        self.enlisted
            .get(object.id())
            .is_some_and(|existing| existing.ptr_eq(object))
    }

    pub fn enlisted_objects(&self) -> impl Iterator<Item = &DomainObject> {
        self.enlisted.values()
    }

    /// Objects handed out by a parent transaction are adopted on first use.
    fn check_usable(&mut self, object: &DomainObject) -> Result<()> {
        self.check_not_discarded()?;
        if self.is_enlisted(object) {
            return Ok(());
        }
        if !self.enlisted.contains_key(object.id()) {
            if let Some(existing) = self.persistence.enlisted_object(object.id()) {
                if existing.ptr_eq(object) {
                    self.enlisted.insert(object.id().clone(), existing);
                    return Ok(());
                }
            }
        }
        Err(Error::TransactionsDiffer {
            id: object.id().clone(),
            transaction: self.id,
        })
    }

    // ========================================================================
    // Values
    // ========================================================================

    pub fn get_value(&mut self, object: &DomainObject, property: &str) -> Result<Value> {
        self.check_usable(object)?;
        let (dm, mut ctx) = self.split();
        dm.get_value(&mut ctx, object.id(), property, false)
    }

    pub fn get_original_value(&mut self, object: &DomainObject, property: &str) -> Result<Value> {
        self.check_usable(object)?;
        let (dm, mut ctx) = self.split();
        dm.get_value(&mut ctx, object.id(), property, true)
    }

    pub fn set_value(&mut self, object: &DomainObject, property: &str, value: impl Into<Value>) -> Result<()> {
        self.check_usable(object)?;
        let (dm, mut ctx) = self.split();
        dm.set_value(&mut ctx, object.id(), property, value.into())
    }

    pub fn property<'t>(&'t mut self, object: &DomainObject, name: &str) -> Result<PropertyAccessor<'t, 'p>> {
        PropertyAccessor::new(self, object.clone(), name)
    }

    // ========================================================================
    // Relations
    // ========================================================================

    pub fn get_related_object(&mut self, object: &DomainObject, property: &str) -> Result<Option<DomainObject>> {
        self.related_object(object, property, false)
    }

    pub fn get_original_related_object(
        &mut self,
        object: &DomainObject,
        property: &str,
    ) -> Result<Option<DomainObject>> {
        self.related_object(object, property, true)
    }

    fn related_object(&mut self, object: &DomainObject, property: &str, original: bool) -> Result<Option<DomainObject>> {
        self.check_usable(object)?;
        let end_point = RelationEndPointId::new(object.id().clone(), property);
        let related = {
            let (dm, mut ctx) = self.split();
            if original {
                dm.original_opposite(&mut ctx, &end_point)?
            } else {
                dm.current_opposite(&mut ctx, &end_point)?
            }
        };
        related.map(|id| self.object_for(&id, original)).transpose()
    }

    /// Sets an object end-point; every opposite side follows.
    pub fn set_related_object(
        &mut self,
        object: &DomainObject,
        property: &str,
        related: Option<&DomainObject>,
    ) -> Result<()> {
        self.check_usable(object)?;
        if let Some(related) = related {
            self.check_usable(related)?;
        }
        let (dm, mut ctx) = self.split();
        dm.set_related_object(&mut ctx, object.id(), property, related.map(DomainObject::id))
    }

    /// Read-only snapshot of a collection end-point.
    pub fn get_related_objects(&mut self, object: &DomainObject, property: &str) -> Result<DomainObjectCollection> {
        self.related_objects(object, property, false)
    }

    pub fn get_original_related_objects(
        &mut self,
        object: &DomainObject,
        property: &str,
    ) -> Result<DomainObjectCollection> {
        self.related_objects(object, property, true)
    }

    fn related_objects(&mut self, object: &DomainObject, property: &str, original: bool) -> Result<DomainObjectCollection> {
        self.check_usable(object)?;
        let end_point = RelationEndPointId::new(object.id().clone(), property);
        let (ids, required_class) = {
            let (dm, mut ctx) = self.split();
            let ids = if original {
                dm.original_collection_items(&mut ctx, &end_point)?
            } else {
                dm.collection_items(&mut ctx, &end_point)?
            };
            let definition = dm.end_point_definition(object.id(), property)?;
            let opposite = dm.mapping().opposite_end_point(&definition)?;
            (ids, opposite.class_id().to_string())
        };

        let mut collection = DomainObjectCollection::with_required_class(required_class);
        for id in ids {
            let item = self.object_for(&id, original)?;
            collection.add(item)?;
        }
        Ok(collection.into_read_only())
    }

    /// Mutable view of a collection end-point; changes go through the transaction.
    pub fn related_objects_mut<'t>(
        &'t mut self,
        object: &DomainObject,
        property: &str,
    ) -> Result<AssociatedCollection<'t, 'p>> {
        self.check_usable(object)?;
        {
            let end_point = RelationEndPointId::new(object.id().clone(), property);
            let (dm, mut ctx) = self.split();
            dm.collection_items(&mut ctx, &end_point)?;
        }
        Ok(AssociatedCollection::new(self, object.clone(), property))
    }

    pub(crate) fn related_ids(&mut self, object: &DomainObject, property: &str) -> Result<Vec<ObjectId>> {
        self.check_usable(object)?;
        let end_point = RelationEndPointId::new(object.id().clone(), property);
        let (dm, mut ctx) = self.split();
        dm.collection_items(&mut ctx, &end_point)
    }

    pub(crate) fn object_by_id(&mut self, id: &ObjectId) -> Result<DomainObject> {
        self.object_for(id, false)
    }

    pub(crate) fn insert_related_object(
        &mut self,
        object: &DomainObject,
        property: &str,
        index: Option<usize>,
        item: &DomainObject,
    ) -> Result<()> {
        self.check_usable(object)?;
        self.check_usable(item)?;
        let (dm, mut ctx) = self.split();
        dm.insert_related_object(&mut ctx, object.id(), property, index, item.id())
    }

    pub(crate) fn remove_related_object(&mut self, object: &DomainObject, property: &str, item: &DomainObject) -> Result<bool> {
        self.check_usable(object)?;
        self.check_usable(item)?;
        let (dm, mut ctx) = self.split();
        dm.remove_related_object(&mut ctx, object.id(), property, item.id())
    }

    pub(crate) fn replace_related_object(
        &mut self,
        object: &DomainObject,
        property: &str,
        index: usize,
        item: &DomainObject,
    ) -> Result<()> {
        self.check_usable(object)?;
        self.check_usable(item)?;
        let (dm, mut ctx) = self.split();
        dm.replace_related_object(&mut ctx, object.id(), property, index, item.id())
    }

    pub(crate) fn clear_related_objects(&mut self, object: &DomainObject, property: &str) -> Result<()> {
        self.check_usable(object)?;
        let (dm, mut ctx) = self.split();
        dm.clear_related_objects(&mut ctx, object.id(), property)
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Unwinds the object's relations, then marks it deleted.
    pub fn delete(&mut self, object: &DomainObject) -> Result<()> {
        self.check_usable(object)?;
        let (dm, mut ctx) = self.split();
        dm.delete(&mut ctx, object.id())
    }

    pub fn state(&mut self, object: &DomainObject) -> Result<StateType> {
        self.check_usable(object)?;
        let (dm, mut ctx) = self.split();
        dm.state(&mut ctx, object.id())
    }

    pub fn has_changed(&mut self, object: &DomainObject) -> Result<bool> {
        Ok(!matches!(self.state(object)?, StateType::Unchanged | StateType::Discarded))
    }

    pub fn has_been_touched(&mut self, object: &DomainObject) -> Result<bool> {
        self.check_usable(object)?;
        let (dm, mut ctx) = self.split();
        dm.has_been_touched(&mut ctx, object.id())
    }

    pub fn property_has_changed(&mut self, object: &DomainObject, property: &str) -> Result<bool> {
        self.check_usable(object)?;
        let (dm, mut ctx) = self.split();
        dm.property_has_changed(&mut ctx, object.id(), property)
    }

    pub fn property_has_been_touched(&mut self, object: &DomainObject, property: &str) -> Result<bool> {
        self.check_usable(object)?;
        let (dm, mut ctx) = self.split();
        dm.property_has_been_touched(&mut ctx, object.id(), property)
    }

    pub fn timestamp(&mut self, object: &DomainObject) -> Result<Option<Timestamp>> {
        self.check_usable(object)?;
        let (dm, mut ctx) = self.split();
        Ok(dm.get_data_container(&mut ctx, object.id())?.timestamp())
    }

    // ========================================================================
    // Scopes
    // ========================================================================

    /// Makes this the current transaction until the scope is dropped, then discards it.
    pub fn enter_discarding_scope(&mut self) -> TransactionScope<'_, 'p> {
        TransactionScope::enter(self, AutoRollbackBehavior::Discard)
    }

    pub fn enter_non_discarding_scope(&mut self) -> TransactionScope<'_, 'p> {
        TransactionScope::enter(self, AutoRollbackBehavior::None)
    }

    pub fn enter_scope(&mut self, behavior: AutoRollbackBehavior) -> TransactionScope<'_, 'p> {
        TransactionScope::enter(self, behavior)
    }

    // ========================================================================
    // Parent side of a sub-transaction
    // ========================================================================

    pub(crate) fn allocate_object_id(&mut self, class: &ClassDefinition) -> Result<ObjectId> {
        self.persistence.new_object_id(class)
    }

    pub(crate) fn container_for_sub_transaction(&mut self, id: &ObjectId) -> Result<DataContainer> {
        self.check_not_discarded()?;
        let (dm, mut ctx) = self.split();
        dm.container_for_sub_transaction(&mut ctx, id)
    }

    pub(crate) fn related_ids_for_sub_transaction(&mut self, end_point: &RelationEndPointId) -> Result<Vec<ObjectId>> {
        self.check_not_discarded()?;
        let (dm, mut ctx) = self.split();
        dm.related_ids_for_sub_transaction(&mut ctx, end_point)
    }

    pub(crate) fn accept_sub_transaction_changes(&mut self, changes: &ChangeSet<'_>) -> Result<()> {
        self.check_not_discarded()?;
        {
            let (dm, mut ctx) = self.split();
            dm.accept_sub_transaction_changes(&mut ctx, changes)?;
        }
        for object in &changes.new_objects {
            self.enlisted
                .entry(object.id().clone())
                .or_insert_with(|| object.clone());
        }
        Ok(())
    }

    pub(crate) fn enlisted_object(&self, id: &ObjectId) -> Option<DomainObject> {
        self.enlisted
            .get(id)
            .cloned()
            .or_else(|| self.persistence.enlisted_object(id))
    }
}

impl fmt::Debug for ClientTransaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientTransaction")
            .field("id", &self.id)
            .field("parent_id", &self.parent_id)
            .field("loaded", &self.data_manager.containers().len())
            .field("listeners", &self.listeners)
            .field("discarded", &self.discarded)
            .finish()
    }
}
