//! DataManager - owns the loaded containers and relation end-points of one transaction.
//!
//! Every structural change of a transaction goes through here: loads, new-object
//! registration, value and relation changes, deletes, commit and rollback.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::collection::OrderedIdSet;
use crate::data::{DataContainer, DataContainerMap, StateType};
use crate::domain_object::DomainObject;
use crate::end_point::{
    ChangeDetection, CollectionEndPoint, RealObjectEndPoint, RelationEndPoint, RelationEndPointId,
    RelationEndPointMap, VirtualObjectEndPoint,
};
use crate::error::{ArgumentError, Error, Result};
use crate::listener::{cancelled, failed};
use crate::mapping::{Cardinality, MappingConfiguration, MappingError, RelationEndPointDefinition};
use crate::modification::{self, RelationCommand};
use crate::object_id::ObjectId;
use crate::persistence::ChangeSet;
use crate::storage::{StorageError, Timestamp};
use crate::transaction::TransactionContext;
use crate::value::Value;

#[derive(Debug)]
pub struct DataManager {
    mapping: Arc<MappingConfiguration>,
    containers: DataContainerMap,
    end_points: RelationEndPointMap,
    /// Ids discarded in this transaction: committed deletes and rolled back or deleted new objects.
    invalid: HashSet<ObjectId>,
    change_detection: ChangeDetection,
}

impl DataManager {
    pub(crate) fn new(mapping: Arc<MappingConfiguration>, change_detection: ChangeDetection) -> Self {
        DataManager {
            mapping,
            containers: DataContainerMap::new(),
            end_points: RelationEndPointMap::new(),
            invalid: HashSet::new(),
            change_detection,
        }
    }

    pub fn mapping(&self) -> &Arc<MappingConfiguration> {
        &self.mapping
    }

    pub fn containers(&self) -> &DataContainerMap {
        &self.containers
    }

    pub fn end_points(&self) -> &RelationEndPointMap {
        &self.end_points
    }

    pub fn is_invalid(&self, id: &ObjectId) -> bool {
        self.invalid.contains(id)
    }

    pub fn change_detection(&self) -> ChangeDetection {
        self.change_detection
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// The container of `id`, loading it on first access.
    pub(crate) fn get_data_container(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        id: &ObjectId,
    ) -> Result<&DataContainer> {
        if self.invalid.contains(id) {
            return Err(Error::ObjectInvalid(id.clone()));
        }
        if !self.containers.contains(id) {
            let container = ctx.persistence.load_data_container(id)?;
            let loaded = self.register_loaded(vec![container]);
            self.notify_loaded(ctx, &loaded)?;
        }
        self.containers
            .get(id)
            .ok_or_else(|| Error::ObjectNotFound(id.clone()))
    }

    /// Loads every missing container of `ids` in one round-trip.
    pub(crate) fn load_data_containers(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        ids: &[ObjectId],
    ) -> Result<()> {
        if let Some(id) = ids.iter().find(|id| self.invalid.contains(*id)) {
            return Err(Error::ObjectInvalid(id.clone()));
        }
        let missing: Vec<ObjectId> = ids
            .iter()
            .filter(|id| !self.containers.contains(id))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let loaded = ctx.persistence.load_data_containers(&missing)?;
        if let Some(index) = loaded.iter().position(Option::is_none) {
            return Err(Error::ObjectNotFound(missing[index].clone()));
        }
        let registered = self.register_loaded(loaded.into_iter().flatten().collect());
        self.notify_loaded(ctx, &registered)
    }

    /// Registers loaded containers; containers already known locally win.
    fn register_loaded(&mut self, containers: Vec<DataContainer>) -> Vec<ObjectId> {
        let mut registered = Vec::new();
        for container in containers {
            if self.invalid.contains(container.id()) {
                continue;
            }
            let id = container.id().clone();
            if self.containers.register(container) {
                registered.push(id);
            }
        }
        registered
    }

    fn notify_loaded(&self, ctx: &mut TransactionContext<'_, '_>, ids: &[ObjectId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        tracing::trace!(tx = %ctx.id, count = ids.len(), "objects loaded");
        ctx.listeners
            .after(|l| l.objects_loaded(ctx.id, ids))
            .map_err(failed)
    }

    /// Registers the container of an object created in this transaction. Its virtual
    /// end-points start out empty and complete.
    pub(crate) fn register_new_data_container(&mut self, container: DataContainer) -> Result<()> {
        let id = container.id().clone();
        if self.invalid.contains(&id) || self.containers.contains(&id) {
            return Err(Error::DuplicateObject(id));
        }

        for definition in container.class().end_points() {
            if definition.is_virtual() {
                let end_point_id = RelationEndPointId::new(id.clone(), definition.property_name());
                self.end_points
                    .register(empty_end_point(end_point_id, definition.clone()));
            }
        }
        self.containers.register(container);
        tracing::debug!(%id, "registered new data container");
        Ok(())
    }

    // ========================================================================
    // End-points
    // ========================================================================

    pub(crate) fn end_point_definition(
        &self,
        object_id: &ObjectId,
        property: &str,
    ) -> Result<Arc<RelationEndPointDefinition>> {
        let class = self.mapping.class(object_id.class_id())?;
        Ok(class.end_point(property)?.clone())
    }

    /// Makes sure the end-point can be read: real end-points need their container,
    /// virtual end-points are loaded through the persistence strategy.
    pub(crate) fn ensure_end_point(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        id: &RelationEndPointId,
    ) -> Result<()> {
        if self.end_points.contains(id) {
            return Ok(());
        }
        let definition = self.end_point_definition(id.object_id(), id.property())?;
        let owner = self.get_data_container(ctx, id.object_id())?;
        if !definition.is_virtual() {
            return Ok(());
        }
        if owner.is_new() {
            self.end_points
                .register(empty_end_point(id.clone(), definition));
            return Ok(());
        }

        let opposite = self.mapping.opposite_end_point(&definition)?.clone();
        let loaded = ctx
            .persistence
            .load_related_data_containers(id, &definition)?;
        let candidates: Vec<ObjectId> = loaded.iter().map(|c| c.id().clone()).collect();
        let registered = self.register_loaded(loaded);

        let owner_id = id.object_id();
        let members: Vec<ObjectId> = candidates
            .into_iter()
            .filter(|candidate| {
                self.containers
                    .get(candidate)
                    .and_then(|c| c.value(opposite.property_name()).ok())
                    .and_then(Value::as_object_id)
                    == Some(owner_id)
            })
            .collect();

        let end_point = match definition.cardinality() {
            Cardinality::Many => {
                let items = OrderedIdSet::from_items(members)?;
                RelationEndPoint::Collection(CollectionEndPoint::new(id.clone(), definition, items))
            }
            Cardinality::One => {
                if members.len() > 1 {
                    return Err(StorageError::InconsistentRelation {
                        end_point: id.to_string(),
                        count: members.len(),
                    }
                    .into());
                }
                let opposite = members.into_iter().next();
                RelationEndPoint::VirtualObject(VirtualObjectEndPoint::new(
                    id.clone(),
                    definition,
                    opposite,
                ))
            }
        };
        tracing::trace!(end_point = %id, "loaded virtual end-point");
        self.end_points.register(end_point);
        self.notify_loaded(ctx, &registered)
    }

    /// Current opposite of an object end-point (real or virtual).
    pub(crate) fn current_opposite(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        id: &RelationEndPointId,
    ) -> Result<Option<ObjectId>> {
        self.opposite(ctx, id, false)
    }

    pub(crate) fn original_opposite(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        id: &RelationEndPointId,
    ) -> Result<Option<ObjectId>> {
        self.opposite(ctx, id, true)
    }

    fn opposite(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        id: &RelationEndPointId,
        original: bool,
    ) -> Result<Option<ObjectId>> {
        let definition = self.end_point_definition(id.object_id(), id.property())?;
        if definition.is_many() {
            return Err(cardinality_mismatch(id, Cardinality::One, Cardinality::Many));
        }
        self.ensure_end_point(ctx, id)?;

        if definition.is_virtual() {
            let end_point = self
                .end_points
                .get(id)
                .and_then(RelationEndPoint::as_virtual_object)
                .ok_or_else(|| Error::ObjectNotFound(id.object_id().clone()))?;
            let opposite = if original {
                end_point.original_opposite()
            } else {
                end_point.opposite()
            };
            return Ok(opposite.cloned());
        }

        let container = self
            .containers
            .get(id.object_id())
            .ok_or_else(|| Error::ObjectNotFound(id.object_id().clone()))?;
        let end_point = RealObjectEndPoint::new(container, &definition)?;
        let opposite = if original {
            end_point.original_opposite()
        } else {
            end_point.opposite()
        };
        Ok(opposite.cloned())
    }

    pub(crate) fn collection_items(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        id: &RelationEndPointId,
    ) -> Result<Vec<ObjectId>> {
        Ok(self.collection(ctx, id)?.items().ids().cloned().collect())
    }

    pub(crate) fn original_collection_items(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        id: &RelationEndPointId,
    ) -> Result<Vec<ObjectId>> {
        Ok(self.collection(ctx, id)?.original_items().to_vec())
    }

    fn collection(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        id: &RelationEndPointId,
    ) -> Result<&CollectionEndPoint> {
        let definition = self.end_point_definition(id.object_id(), id.property())?;
        if !definition.is_many() {
            return Err(cardinality_mismatch(id, Cardinality::Many, Cardinality::One));
        }
        self.ensure_end_point(ctx, id)?;
        self.end_points
            .get(id)
            .and_then(RelationEndPoint::as_collection)
            .ok_or_else(|| Error::ObjectNotFound(id.object_id().clone()))
    }

    /// Checks that `related` can take part in a relation whose opposite side is declared on
    /// `required_class`.
    pub(crate) fn check_related(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        related: &ObjectId,
        required_class: &str,
    ) -> Result<()> {
        let container = self.get_data_container(ctx, related)?;
        if container.is_deleted() {
            return Err(Error::ObjectDeleted(related.clone()));
        }
        if !container.class().is_same_or_derived_from(required_class) {
            return Err(ArgumentError::ItemTypeMismatch {
                item: related.clone(),
                required_class: required_class.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn check_writable(&mut self, ctx: &mut TransactionContext<'_, '_>, id: &ObjectId) -> Result<()> {
        if self.get_data_container(ctx, id)?.is_deleted() {
            return Err(Error::ObjectDeleted(id.clone()));
        }
        Ok(())
    }

    fn owned_end_points<'a>(&'a self, id: &'a ObjectId) -> impl Iterator<Item = &'a RelationEndPoint> + 'a {
        self.mapping
            .class(id.class_id())
            .map(|class| class.end_points().to_vec())
            .unwrap_or_default()
            .into_iter()
            .filter(|definition| definition.is_virtual())
            .filter_map(move |definition| {
                self.end_points
                    .get(&RelationEndPointId::new(id.clone(), definition.property_name()))
            })
    }

    // ========================================================================
    // State queries
    // ========================================================================

    pub(crate) fn state(&mut self, ctx: &mut TransactionContext<'_, '_>, id: &ObjectId) -> Result<StateType> {
        if self.invalid.contains(id) {
            return Ok(StateType::Discarded);
        }
        let state = self.get_data_container(ctx, id)?.state();
        if state == StateType::Unchanged && self.has_changed_end_points(id) {
            return Ok(StateType::Changed);
        }
        Ok(state)
    }

    fn has_changed_end_points(&self, id: &ObjectId) -> bool {
        let detection = self.change_detection;
        self.owned_end_points(id)
            .any(|end_point| end_point.has_changed(detection))
    }

    pub(crate) fn has_been_touched(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        id: &ObjectId,
    ) -> Result<bool> {
        let touched = self.get_data_container(ctx, id)?.has_been_touched();
        Ok(touched || self.owned_end_points(id).any(RelationEndPoint::has_been_touched))
    }

    /// Works for value properties and for both kinds of relation end-points.
    pub(crate) fn property_has_changed(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        id: &ObjectId,
        property: &str,
    ) -> Result<bool> {
        let container = self.get_data_container(ctx, id)?;
        if container.class().find_property(property).is_some() {
            return Ok(container.property_value(property)?.has_changed());
        }
        let end_point = RelationEndPointId::new(id.clone(), property);
        self.end_point_definition(id, property)?;
        let detection = self.change_detection;
        Ok(self
            .end_points
            .get(&end_point)
            .is_some_and(|e| e.has_changed(detection)))
    }

    pub(crate) fn property_has_been_touched(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        id: &ObjectId,
        property: &str,
    ) -> Result<bool> {
        let container = self.get_data_container(ctx, id)?;
        if container.class().find_property(property).is_some() {
            return Ok(container.property_value(property)?.has_been_touched());
        }
        let end_point = RelationEndPointId::new(id.clone(), property);
        self.end_point_definition(id, property)?;
        Ok(self
            .end_points
            .get(&end_point)
            .is_some_and(RelationEndPoint::has_been_touched))
    }

    // ========================================================================
    // Modifications
    // ========================================================================

    pub(crate) fn get_value(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        id: &ObjectId,
        property: &str,
        original: bool,
    ) -> Result<Value> {
        let container = self.get_data_container(ctx, id)?;
        let definition = container.class().property(property)?;
        if definition.is_relation() {
            return Err(MappingError::RelationProperty {
                class: container.class().id().to_string(),
                property: property.to_string(),
            }
            .into());
        }
        let value = if original {
            container.original_value(property)?
        } else {
            container.value(property)?
        };
        Ok(value.clone())
    }

    /// Sets a value property. Assigning the current value only touches it.
    pub(crate) fn set_value(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        id: &ObjectId,
        property: &str,
        value: Value,
    ) -> Result<()> {
        self.check_writable(ctx, id)?;
        let container = self
            .containers
            .get(id)
            .ok_or_else(|| Error::ObjectNotFound(id.clone()))?;
        let definition = container.class().property(property)?.clone();
        if definition.is_relation() {
            return Err(MappingError::RelationProperty {
                class: container.class().id().to_string(),
                property: property.to_string(),
            }
            .into());
        }
        definition.validate(&value)?;
        let old = container.value(property)?.clone();

        if old == value {
            if let Some(container) = self.containers.get_mut(id) {
                container.touch_value(property)?;
            }
            return Ok(());
        }

        ctx.listeners
            .before(|l| l.property_value_changing(ctx.id, id, property, &old, &value))
            .map_err(cancelled)?;
        if let Some(container) = self.containers.get_mut(id) {
            container.set_value(property, value.clone())?;
        }
        ctx.listeners
            .after(|l| l.property_value_changed(ctx.id, id, property, &old, &value))
            .map_err(failed)
    }

    pub(crate) fn set_related_object(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        id: &ObjectId,
        property: &str,
        related: Option<&ObjectId>,
    ) -> Result<()> {
        self.check_writable(ctx, id)?;
        let command = modification::set_object(self, ctx, id, property, related)?;
        self.execute(ctx, command)
    }

    /// Inserts `item` at `index`, or appends it when `index` is `None`.
    pub(crate) fn insert_related_object(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        id: &ObjectId,
        property: &str,
        index: Option<usize>,
        item: &ObjectId,
    ) -> Result<()> {
        self.check_writable(ctx, id)?;
        let command = modification::insert(self, ctx, id, property, index, item)?;
        self.execute(ctx, command)
    }

    /// Returns false if `item` was not part of the collection.
    pub(crate) fn remove_related_object(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        id: &ObjectId,
        property: &str,
        item: &ObjectId,
    ) -> Result<bool> {
        self.check_writable(ctx, id)?;
        match modification::remove(self, ctx, id, property, item)? {
            Some(command) => self.execute(ctx, command).map(|_| true),
            None => Ok(false),
        }
    }

    pub(crate) fn replace_related_object(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        id: &ObjectId,
        property: &str,
        index: usize,
        item: &ObjectId,
    ) -> Result<()> {
        self.check_writable(ctx, id)?;
        let command = modification::replace(self, ctx, id, property, index, item)?;
        self.execute(ctx, command)
    }

    pub(crate) fn clear_related_objects(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        id: &ObjectId,
        property: &str,
    ) -> Result<()> {
        self.check_writable(ctx, id)?;
        let command = modification::clear(self, ctx, id, property)?;
        self.execute(ctx, command)
    }

    fn execute(&mut self, ctx: &mut TransactionContext<'_, '_>, command: RelationCommand) -> Result<()> {
        if command.is_empty() {
            return Ok(());
        }
        let approved = command.notify_changing(ctx.id, ctx.listeners)?;
        let performed = approved.perform(&mut self.containers, &mut self.end_points);
        performed.notify_changed(ctx.id, ctx.listeners)
    }

    /// Unwinds every relation of the object, then marks it deleted. New objects are
    /// discarded right away.
    pub(crate) fn delete(&mut self, ctx: &mut TransactionContext<'_, '_>, id: &ObjectId) -> Result<()> {
        if self.get_data_container(ctx, id)?.is_deleted() {
            return Ok(());
        }

        let command = modification::delete(self, ctx, id)?;
        ctx.listeners
            .before(|l| l.object_deleting(ctx.id, id))
            .map_err(cancelled)?;
        let approved = command.notify_changing(ctx.id, ctx.listeners)?;
        let performed = approved.perform(&mut self.containers, &mut self.end_points);
        let relations_result = performed.notify_changed(ctx.id, ctx.listeners);

        let is_new = self.containers.get(id).is_some_and(DataContainer::is_new);
        if is_new {
            self.discard_object(id);
        } else if let Some(container) = self.containers.get_mut(id) {
            container.mark_deleted();
        }
        tracing::debug!(tx = %ctx.id, %id, discarded = is_new, "object deleted");

        let deleted_result = ctx
            .listeners
            .after(|l| l.object_deleted(ctx.id, id))
            .map_err(failed);
        relations_result.and(deleted_result)
    }

    fn discard_object(&mut self, id: &ObjectId) {
        if let Some(mut container) = self.containers.remove(id) {
            container.discard();
        }
        self.end_points.remove_owned_by(id);
        self.invalid.insert(id.clone());
    }

    // ========================================================================
    // Commit / rollback
    // ========================================================================

    /// Objects that are new, deleted, changed, or whose end-points changed.
    pub(crate) fn changed_object_ids(&self) -> Vec<ObjectId> {
        self.containers
            .iter()
            .filter(|c| c.state() != StateType::Unchanged || self.has_changed_end_points(c.id()))
            .map(|c| c.id().clone())
            .collect()
    }

    pub(crate) fn change_set<'a>(&'a self, enlisted: &HashMap<ObjectId, DomainObject>) -> ChangeSet<'a> {
        let containers: Vec<&DataContainer> = self
            .containers
            .iter()
            .filter(|c| c.state() != StateType::Unchanged)
            .collect();
        let new_objects = containers
            .iter()
            .filter(|c| c.is_new())
            .filter_map(|c| enlisted.get(c.id()).cloned())
            .collect();
        let mut end_points: Vec<&RelationEndPoint> =
            self.end_points.changed(self.change_detection).collect();
        end_points.sort_by(|a, b| a.id().cmp(b.id()));

        ChangeSet {
            containers,
            end_points,
            new_objects,
        }
    }

    pub(crate) fn commit(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        enlisted: &HashMap<ObjectId, DomainObject>,
    ) -> Result<()> {
        let ids = self.changed_object_ids();
        ctx.listeners
            .before(|l| l.committing(ctx.id, &ids))
            .map_err(cancelled)?;
        self.check_mandatory_relations(ctx, &ids)?;

        let timestamps = {
            let changes = self.change_set(enlisted);
            ctx.persistence.persist(&changes)?
        };
        self.apply_commit(&timestamps);
        tracing::debug!(tx = %ctx.id, count = ids.len(), "transaction committed");

        ctx.listeners
            .after(|l| l.committed(ctx.id, &ids))
            .map_err(failed)
    }

    fn check_mandatory_relations(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        ids: &[ObjectId],
    ) -> Result<()> {
        for id in ids {
            let Some(container) = self.containers.get(id) else {
                continue;
            };
            if container.is_deleted() {
                continue;
            }
            let mandatory: Vec<_> = container
                .class()
                .end_points()
                .iter()
                .filter(|d| d.is_mandatory())
                .cloned()
                .collect();

            for definition in mandatory {
                let end_point = RelationEndPointId::new(id.clone(), definition.property_name());
                let is_set = if definition.is_many() {
                    !self.collection_items(ctx, &end_point)?.is_empty()
                } else {
                    self.current_opposite(ctx, &end_point)?.is_some()
                };
                if !is_set {
                    return Err(Error::MandatoryRelationNotSet {
                        id: id.clone(),
                        property: definition.property_name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn apply_commit(&mut self, timestamps: &HashMap<ObjectId, Timestamp>) {
        let ids = self.containers.ids().to_vec();
        for id in ids {
            let deleted = self.containers.get(&id).is_some_and(DataContainer::is_deleted);
            if deleted {
                self.discard_object(&id);
            } else if let Some(container) = self.containers.get_mut(&id) {
                container.commit(timestamps.get(&id).copied());
            }
        }
        self.end_points.commit();
    }

    pub(crate) fn rollback(&mut self, ctx: &mut TransactionContext<'_, '_>) -> Result<()> {
        let ids = self.changed_object_ids();
        ctx.listeners
            .before(|l| l.rolling_back(ctx.id, &ids))
            .map_err(cancelled)?;

        let new_ids: Vec<ObjectId> = self
            .containers
            .iter()
            .filter(|c| c.is_new())
            .map(|c| c.id().clone())
            .collect();
        for id in &new_ids {
            self.discard_object(id);
        }
        self.containers.iter_mut().for_each(DataContainer::rollback);
        self.end_points.rollback();
        tracing::debug!(tx = %ctx.id, count = ids.len(), discarded = new_ids.len(), "transaction rolled back");

        ctx.listeners
            .after(|l| l.rolled_back(ctx.id, &ids))
            .map_err(failed)
    }

    // ========================================================================
    // Sub-transaction support (called on the parent)
    // ========================================================================

    /// A copy of the parent's current state of `id` for a sub-transaction.
    pub(crate) fn container_for_sub_transaction(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        id: &ObjectId,
    ) -> Result<DataContainer> {
        let container = self.get_data_container(ctx, id)?;
        if container.is_deleted() {
            return Err(Error::ObjectInvalid(id.clone()));
        }
        Ok(container.for_sub_transaction())
    }

    pub(crate) fn related_ids_for_sub_transaction(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        id: &RelationEndPointId,
    ) -> Result<Vec<ObjectId>> {
        self.ensure_end_point(ctx, id)?;
        Ok(self
            .end_points
            .get(id)
            .map(RelationEndPoint::opposite_ids)
            .unwrap_or_default())
    }

    /// Applies the committed state of a sub-transaction without notifications.
    pub(crate) fn accept_sub_transaction_changes(
        &mut self,
        ctx: &mut TransactionContext<'_, '_>,
        changes: &ChangeSet<'_>,
    ) -> Result<()> {
        for source in changes.containers.iter().filter(|c| c.is_new()) {
            let mut container = DataContainer::new_object(source.id().clone(), source.class().clone());
            container.copy_values_from(source);
            self.register_new_data_container(container)?;
        }

        // Load end-points before foreign keys change so their original state is right.
        for end_point in &changes.end_points {
            self.ensure_end_point(ctx, end_point.id())?;
        }

        for source in changes.containers.iter().filter(|c| !c.is_new()) {
            self.get_data_container(ctx, source.id())?;
            if let Some(container) = self.containers.get_mut(source.id()) {
                container.copy_values_from(source);
            }
        }

        for source in &changes.end_points {
            if let Some(end_point) = self.end_points.get_mut(source.id()) {
                end_point.assign(source.opposite_ids());
            }
        }

        for source in changes.containers.iter().filter(|c| c.is_deleted()) {
            let is_new = self.containers.get(source.id()).is_some_and(DataContainer::is_new);
            if is_new {
                self.discard_object(source.id());
            } else if let Some(container) = self.containers.get_mut(source.id()) {
                container.mark_deleted();
            }
        }

        tracing::debug!(
            tx = %ctx.id,
            containers = changes.containers.len(),
            end_points = changes.end_points.len(),
            "accepted sub-transaction changes"
        );
        Ok(())
    }
}

fn empty_end_point(
    id: RelationEndPointId,
    definition: Arc<RelationEndPointDefinition>,
) -> RelationEndPoint {
    if definition.is_many() {
        RelationEndPoint::Collection(CollectionEndPoint::new(id, definition, OrderedIdSet::new()))
    } else {
        RelationEndPoint::VirtualObject(VirtualObjectEndPoint::new(id, definition, None))
    }
}

pub(crate) fn cardinality_mismatch(
    id: &RelationEndPointId,
    expected: Cardinality,
    actual: Cardinality,
) -> Error {
    MappingError::CardinalityMismatch {
        class: id.object_id().class_id().to_string(),
        property: id.property().to_string(),
        expected,
        actual,
    }
    .into()
}
