use std::sync::Arc;

use crate::mapping::RelationEndPointDefinition;
use crate::object_id::ObjectId;

use super::RelationEndPointId;

/// The virtual side of a one-to-one relation.
#[derive(Debug, Clone)]
pub struct VirtualObjectEndPoint {
    id: RelationEndPointId,
    definition: Arc<RelationEndPointDefinition>,
    opposite: Option<ObjectId>,
    original: Option<ObjectId>,
    touched: bool,
}

impl VirtualObjectEndPoint {
    pub(crate) fn new(
        id: RelationEndPointId,
        definition: Arc<RelationEndPointDefinition>,
        opposite: Option<ObjectId>,
    ) -> Self {
        VirtualObjectEndPoint {
            id,
            definition,
            original: opposite.clone(),
            opposite,
            touched: false,
        }
    }

    pub fn id(&self) -> &RelationEndPointId {
        &self.id
    }

    pub fn definition(&self) -> &Arc<RelationEndPointDefinition> {
        &self.definition
    }

    pub fn opposite(&self) -> Option<&ObjectId> {
        self.opposite.as_ref()
    }

    pub fn original_opposite(&self) -> Option<&ObjectId> {
        self.original.as_ref()
    }

    pub fn has_changed(&self) -> bool {
        self.opposite != self.original
    }

    pub fn has_been_touched(&self) -> bool {
        self.touched
    }

    pub(crate) fn set_opposite(&mut self, opposite: Option<ObjectId>) {
        self.opposite = opposite;
        self.touched = true;
    }

    pub(crate) fn touch(&mut self) {
        self.touched = true;
    }

    pub(crate) fn commit(&mut self) {
        self.original = self.opposite.clone();
        self.touched = false;
    }

    pub(crate) fn rollback(&mut self) {
        self.opposite = self.original.clone();
        self.touched = false;
    }
}
