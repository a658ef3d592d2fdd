use std::sync::Arc;

use crate::collection::OrderedIdSet;
use crate::mapping::RelationEndPointDefinition;
use crate::object_id::ObjectId;

use super::{ChangeDetection, RelationEndPointId};

/// The virtual side of a one-to-many relation.
#[derive(Debug, Clone)]
pub struct CollectionEndPoint {
    id: RelationEndPointId,
    definition: Arc<RelationEndPointDefinition>,
    items: OrderedIdSet<ObjectId>,
    original: Vec<ObjectId>,
    touched: bool,
}

impl CollectionEndPoint {
    pub(crate) fn new(
        id: RelationEndPointId,
        definition: Arc<RelationEndPointDefinition>,
        items: OrderedIdSet<ObjectId>,
    ) -> Self {
        CollectionEndPoint {
            id,
            definition,
            original: items.ids().cloned().collect(),
            items,
            touched: false,
        }
    }

    pub fn id(&self) -> &RelationEndPointId {
        &self.id
    }

    pub fn definition(&self) -> &Arc<RelationEndPointDefinition> {
        &self.definition
    }

    pub fn items(&self) -> &OrderedIdSet<ObjectId> {
        &self.items
    }

    pub fn original_items(&self) -> &[ObjectId] {
        &self.original
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.items.contains(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_changed(&self, detection: ChangeDetection) -> bool {
        match detection {
            ChangeDetection::Unordered => !self.items.same_set(&self.original),
            ChangeDetection::Ordered => !self.items.same_sequence(&self.original),
        }
    }

    pub fn has_been_touched(&self) -> bool {
        self.touched
    }

    /// Inserts at `index`, clamped to the end. Members are ignored.
    pub(crate) fn insert(&mut self, index: usize, id: ObjectId) {
        let index = index.min(self.items.len());
        if self.items.insert(index, id).is_err() {
            tracing::trace!(end_point = %self.id, "insert skipped, item already present");
        }
        self.touched = true;
    }

    pub(crate) fn remove(&mut self, id: &ObjectId) {
        self.items.remove(id);
        self.touched = true;
    }

    pub(crate) fn replace(&mut self, index: usize, id: ObjectId) {
        if self.items.replace(index, id).is_err() {
            tracing::trace!(end_point = %self.id, index, "replace skipped");
        }
        self.touched = true;
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
        self.touched = true;
    }

    pub(crate) fn assign(&mut self, ids: Vec<ObjectId>) {
        self.items.clear();
        for id in ids {
            let _ = self.items.push(id);
        }
        self.touched = true;
    }

    pub(crate) fn touch(&mut self) {
        self.touched = true;
    }

    pub(crate) fn commit(&mut self) {
        self.original = self.items.ids().cloned().collect();
        self.touched = false;
    }

    pub(crate) fn rollback(&mut self) {
        self.items.clear();
        for id in &self.original {
            let _ = self.items.push(id.clone());
        }
        self.touched = false;
    }
}
