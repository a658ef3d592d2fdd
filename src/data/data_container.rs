use std::collections::BTreeMap;
use std::sync::Arc;

use crate::mapping::{ClassDefinition, MappingError, PropertyDefinition};
use crate::object_id::ObjectId;
use crate::storage::Timestamp;
use crate::value::Value;

use super::{PropertyValue, PropertyValueCollection};

/// Externally visible state of an object in one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateType {
    New,
    Unchanged,
    Changed,
    Deleted,
    /// Terminal: a committed delete or a rolled back new object.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    New,
    Existing,
    Deleted,
    Discarded,
}

/// The property values of one object as seen by one transaction.
#[derive(Debug, Clone)]
pub struct DataContainer {
    id: ObjectId,
    timestamp: Option<Timestamp>,
    properties: PropertyValueCollection,
    lifecycle: Lifecycle,
}

impl DataContainer {
    /// A container for an object created in this transaction; properties hold their defaults.
    pub fn new_object(id: ObjectId, class: Arc<ClassDefinition>) -> Self {
        DataContainer {
            id,
            timestamp: None,
            properties: PropertyValueCollection::with_defaults(class),
            lifecycle: Lifecycle::New,
        }
    }

    /// A container loaded from storage. Properties missing from `values` keep their defaults.
    pub fn existing<I>(
        id: ObjectId,
        class: Arc<ClassDefinition>,
        timestamp: Option<Timestamp>,
        values: I,
    ) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut properties = PropertyValueCollection::with_defaults(class);
        for (name, value) in values {
            let slot = properties.get_mut(&name)?;
            slot.definition().validate(&value)?;
            *slot = PropertyValue::new(slot.definition().clone(), value);
        }

        Ok(DataContainer {
            id,
            timestamp,
            properties,
            lifecycle: Lifecycle::Existing,
        })
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn class(&self) -> &Arc<ClassDefinition> {
        self.properties.class()
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    pub fn state(&self) -> StateType {
        match self.lifecycle {
            Lifecycle::New => StateType::New,
            Lifecycle::Existing if self.properties.has_changed() => StateType::Changed,
            Lifecycle::Existing => StateType::Unchanged,
            Lifecycle::Deleted => StateType::Deleted,
            Lifecycle::Discarded => StateType::Discarded,
        }
    }

    pub fn is_new(&self) -> bool {
        self.lifecycle == Lifecycle::New
    }

    pub fn is_deleted(&self) -> bool {
        self.lifecycle == Lifecycle::Deleted
    }

    pub fn is_discarded(&self) -> bool {
        self.lifecycle == Lifecycle::Discarded
    }

    pub fn properties(&self) -> &PropertyValueCollection {
        &self.properties
    }

    pub fn property_value(&self, name: &str) -> Result<&PropertyValue, MappingError> {
        self.properties.get(name)
    }

    pub fn value(&self, name: &str) -> Result<&Value, MappingError> {
        Ok(self.properties.get(name)?.value())
    }

    pub fn original_value(&self, name: &str) -> Result<&Value, MappingError> {
        Ok(self.properties.get(name)?.original_value())
    }

    pub fn has_been_touched(&self) -> bool {
        self.properties.has_been_touched()
    }

    /// True if a property that is written to storage differs from its original value.
    pub fn has_persistent_changes(&self) -> bool {
        self.properties
            .iter()
            .any(|p| p.definition().is_persistent() && p.has_changed())
    }

    /// Current values of the properties that are written to storage.
    pub fn persistent_values(&self) -> BTreeMap<String, Value> {
        self.properties
            .iter()
            .filter(|p| p.definition().is_persistent())
            .map(|p| (p.name().to_string(), p.value().clone()))
            .collect()
    }

    /// Non-null current foreign keys of this container.
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&Arc<PropertyDefinition>, &ObjectId)> {
        self.properties
            .iter()
            .filter_map(|p| p.value().as_object_id().map(|id| (p.definition(), id)))
    }

    /// Non-null foreign keys as they were loaded or last committed.
    pub fn original_foreign_keys(
        &self,
    ) -> impl Iterator<Item = (&Arc<PropertyDefinition>, &ObjectId)> {
        self.properties
            .iter()
            .filter_map(|p| p.original_value().as_object_id().map(|id| (p.definition(), id)))
    }

    pub(crate) fn set_value(&mut self, name: &str, value: Value) -> Result<(), MappingError> {
        self.properties.get_mut(name)?.set_value(value);
        Ok(())
    }

    pub(crate) fn touch_value(&mut self, name: &str) -> Result<(), MappingError> {
        self.properties.get_mut(name)?.touch();
        Ok(())
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.lifecycle = Lifecycle::Deleted;
    }

    pub(crate) fn discard(&mut self) {
        self.lifecycle = Lifecycle::Discarded;
    }

    /// Current values become the original values; a refreshed timestamp replaces the old one.
    pub(crate) fn commit(&mut self, timestamp: Option<Timestamp>) {
        self.properties.commit();
        if timestamp.is_some() {
            self.timestamp = timestamp;
        }
        if self.lifecycle == Lifecycle::New {
            self.lifecycle = Lifecycle::Existing;
        }
    }

    /// Restores original values. Deleted containers become existing again.
    pub(crate) fn rollback(&mut self) {
        self.properties.rollback();
        if self.lifecycle == Lifecycle::Deleted {
            self.lifecycle = Lifecycle::Existing;
        }
    }

    /// A copy whose original values are this container's current values.
    pub(crate) fn for_sub_transaction(&self) -> DataContainer {
        let mut copy = self.clone();
        copy.properties.commit();
        copy.lifecycle = Lifecycle::Existing;
        copy
    }

    /// Copies the current value of every property that differs from `source` and marks it touched.
    pub(crate) fn copy_values_from(&mut self, source: &DataContainer) {
        for (target, source) in self.properties.iter_mut().zip(source.properties.iter()) {
            if target.value() != source.value() || source.has_been_touched() {
                target.set_value(source.value().clone());
            }
        }
    }
}
