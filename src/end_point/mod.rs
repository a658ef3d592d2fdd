//! Relation end-points: the two sides of every bidirectional relation of a loaded object.
//!
//! Real end-points are views over the foreign key held by the owning [`DataContainer`];
//! virtual end-points are loaded lazily and stored in the [`RelationEndPointMap`].
//!
//! [`DataContainer`]: crate::data::DataContainer

mod collection;
mod map;
mod real;
mod virtual_object;

use std::fmt;
use std::sync::Arc;

use crate::mapping::RelationEndPointDefinition;
use crate::object_id::ObjectId;

pub use collection::CollectionEndPoint;
pub use map::RelationEndPointMap;
pub use real::RealObjectEndPoint;
pub use virtual_object::VirtualObjectEndPoint;

/// Identifies one end-point of one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationEndPointId {
    object_id: ObjectId,
    property: String,
}

impl RelationEndPointId {
    pub fn new(object_id: ObjectId, property: impl Into<String>) -> Self {
        RelationEndPointId {
            object_id,
            property: property.into(),
        }
    }

    pub fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    pub fn property(&self) -> &str {
        &self.property
    }
}

impl fmt::Display for RelationEndPointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.object_id, self.property)
    }
}

/// How collection end-points decide whether they changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeDetection {
    /// Membership only. Storage keeps no order.
    Unordered,
    /// Membership and order.
    Ordered,
}

/// A virtual end-point held by the end-point map.
#[derive(Debug, Clone)]
pub enum RelationEndPoint {
    VirtualObject(VirtualObjectEndPoint),
    Collection(CollectionEndPoint),
}

impl RelationEndPoint {
    pub fn id(&self) -> &RelationEndPointId {
        match self {
            RelationEndPoint::VirtualObject(end_point) => end_point.id(),
            RelationEndPoint::Collection(end_point) => end_point.id(),
        }
    }

    pub fn definition(&self) -> &Arc<RelationEndPointDefinition> {
        match self {
            RelationEndPoint::VirtualObject(end_point) => end_point.definition(),
            RelationEndPoint::Collection(end_point) => end_point.definition(),
        }
    }

    pub fn has_changed(&self, detection: ChangeDetection) -> bool {
        match self {
            RelationEndPoint::VirtualObject(end_point) => end_point.has_changed(),
            RelationEndPoint::Collection(end_point) => end_point.has_changed(detection),
        }
    }

    pub fn has_been_touched(&self) -> bool {
        match self {
            RelationEndPoint::VirtualObject(end_point) => end_point.has_been_touched(),
            RelationEndPoint::Collection(end_point) => end_point.has_been_touched(),
        }
    }

    /// Ids currently referenced by this end-point.
    pub fn opposite_ids(&self) -> Vec<ObjectId> {
        match self {
            RelationEndPoint::VirtualObject(end_point) => {
                end_point.opposite().into_iter().cloned().collect()
            }
            RelationEndPoint::Collection(end_point) => end_point.items().ids().cloned().collect(),
        }
    }

    pub fn as_virtual_object(&self) -> Option<&VirtualObjectEndPoint> {
        match self {
            RelationEndPoint::VirtualObject(end_point) => Some(end_point),
            RelationEndPoint::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&CollectionEndPoint> {
        match self {
            RelationEndPoint::Collection(end_point) => Some(end_point),
            RelationEndPoint::VirtualObject(_) => None,
        }
    }

    pub(crate) fn as_virtual_object_mut(&mut self) -> Option<&mut VirtualObjectEndPoint> {
        match self {
            RelationEndPoint::VirtualObject(end_point) => Some(end_point),
            RelationEndPoint::Collection(_) => None,
        }
    }

    pub(crate) fn as_collection_mut(&mut self) -> Option<&mut CollectionEndPoint> {
        match self {
            RelationEndPoint::Collection(end_point) => Some(end_point),
            RelationEndPoint::VirtualObject(_) => None,
        }
    }

    pub(crate) fn touch(&mut self) {
        match self {
            RelationEndPoint::VirtualObject(end_point) => end_point.touch(),
            RelationEndPoint::Collection(end_point) => end_point.touch(),
        }
    }

    /// Empties the end-point as part of deleting its owner.
    pub(crate) fn clear(&mut self) {
        match self {
            RelationEndPoint::VirtualObject(end_point) => end_point.set_opposite(None),
            RelationEndPoint::Collection(end_point) => end_point.clear(),
        }
    }

    /// Replaces the current value with `ids`, used when a sub-transaction commits.
    pub(crate) fn assign(&mut self, ids: Vec<ObjectId>) {
        match self {
            RelationEndPoint::VirtualObject(end_point) => {
                end_point.set_opposite(ids.into_iter().next())
            }
            RelationEndPoint::Collection(end_point) => end_point.assign(ids),
        }
    }

    pub(crate) fn commit(&mut self) {
        match self {
            RelationEndPoint::VirtualObject(end_point) => end_point.commit(),
            RelationEndPoint::Collection(end_point) => end_point.commit(),
        }
    }

    pub(crate) fn rollback(&mut self) {
        match self {
            RelationEndPoint::VirtualObject(end_point) => end_point.rollback(),
            RelationEndPoint::Collection(end_point) => end_point.rollback(),
        }
    }
}
