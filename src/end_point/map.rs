use std::collections::HashMap;

use crate::object_id::ObjectId;

use super::{ChangeDetection, RelationEndPoint, RelationEndPointId};

/// The virtual end-points loaded into one transaction, at most one per id.
///
/// Loading is driven by the data manager, which owns both this map and the
/// container identity map the loaded end-points depend on.
#[derive(Debug, Default)]
pub struct RelationEndPointMap {
    end_points: HashMap<RelationEndPointId, RelationEndPoint>,
}

impl RelationEndPointMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &RelationEndPointId) -> Option<&RelationEndPoint> {
        self.end_points.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &RelationEndPointId) -> Option<&mut RelationEndPoint> {
        self.end_points.get_mut(id)
    }

    pub fn contains(&self, id: &RelationEndPointId) -> bool {
        self.end_points.contains_key(id)
    }

    /// Registers an end-point unless one with the same id already exists.
    pub(crate) fn register(&mut self, end_point: RelationEndPoint) {
        self.end_points
            .entry(end_point.id().clone())
            .or_insert(end_point);
    }

    /// Drops every end-point owned by `object_id`.
    pub(crate) fn remove_owned_by(&mut self, object_id: &ObjectId) {
        self.end_points.retain(|id, _| id.object_id() != object_id);
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelationEndPoint> {
        self.end_points.values()
    }

    pub fn changed(&self, detection: ChangeDetection) -> impl Iterator<Item = &RelationEndPoint> {
        self.end_points
            .values()
            .filter(move |end_point| end_point.has_changed(detection))
    }

    pub fn len(&self) -> usize {
        self.end_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.end_points.is_empty()
    }

    pub(crate) fn commit(&mut self) {
        self.end_points.values_mut().for_each(RelationEndPoint::commit);
    }

    pub(crate) fn rollback(&mut self) {
        self.end_points.values_mut().for_each(RelationEndPoint::rollback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::end_point::VirtualObjectEndPoint;
    use crate::mapping::{Cardinality, RelationEndPointDefinition};
    use std::sync::Arc;

    fn ticket_end_point(order: i64, ticket: Option<i64>) -> RelationEndPoint {
        let definition = Arc::new(RelationEndPointDefinition::new(
            "OrderTicketToOrder".into(),
            "Order".into(),
            "OrderTicket".into(),
            Cardinality::One,
            true,
            false,
        ));
        RelationEndPoint::VirtualObject(VirtualObjectEndPoint::new(
            RelationEndPointId::new(ObjectId::new("Order", order), "OrderTicket"),
            definition,
            ticket.map(|key| ObjectId::new("OrderTicket", key)),
        ))
    }

    #[test]
    fn register_keeps_existing_end_point() {
        let mut map = RelationEndPointMap::new();
        map.register(ticket_end_point(1, Some(1)));
        map.register(ticket_end_point(1, None));

        let id = RelationEndPointId::new(ObjectId::new("Order", 1), "OrderTicket");
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&id).unwrap().opposite_ids(), vec![ObjectId::new("OrderTicket", 1)]);
    }

    #[test]
    fn changed_and_rollback() {
        let mut map = RelationEndPointMap::new();
        map.register(ticket_end_point(1, Some(1)));
        map.register(ticket_end_point(2, None));

        let id = RelationEndPointId::new(ObjectId::new("Order", 1), "OrderTicket");
        map.get_mut(&id).unwrap().clear();
        assert_eq!(map.changed(ChangeDetection::Unordered).count(), 1);

        map.rollback();
        assert_eq!(map.changed(ChangeDetection::Unordered).count(), 0);

        map.remove_owned_by(&ObjectId::new("Order", 2));
        assert_eq!(map.len(), 1);
    }
}
