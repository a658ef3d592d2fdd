use std::collections::HashMap;

use crate::object_id::ObjectId;

use super::DataContainer;

/// Identity map of the containers loaded into or created by one transaction.
///
/// Iteration follows registration order so commits and notifications are deterministic.
#[derive(Debug, Default)]
pub struct DataContainerMap {
    containers: HashMap<ObjectId, DataContainer>,
    order: Vec<ObjectId>,
}

impl DataContainerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ObjectId) -> Option<&DataContainer> {
        self.containers.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &ObjectId) -> Option<&mut DataContainer> {
        self.containers.get_mut(id)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.containers.contains_key(id)
    }

    /// Returns false, leaving the map untouched, if a container with the same id exists.
    pub(crate) fn register(&mut self, container: DataContainer) -> bool {
        if self.containers.contains_key(container.id()) {
            return false;
        }
        self.order.push(container.id().clone());
        self.containers.insert(container.id().clone(), container);
        true
    }

    pub(crate) fn remove(&mut self, id: &ObjectId) -> Option<DataContainer> {
        let removed = self.containers.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataContainer> {
        self.order.iter().filter_map(|id| self.containers.get(id))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut DataContainer> {
        self.containers.values_mut()
    }

    pub fn ids(&self) -> &[ObjectId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
