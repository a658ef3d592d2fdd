use std::collections::HashMap;

use crate::data::DataContainer;
use crate::domain_object::DomainObject;
use crate::end_point::{ChangeDetection, RelationEndPointId};
use crate::error::{Error, Result};
use crate::mapping::{ClassDefinition, RelationEndPointDefinition};
use crate::object_id::ObjectId;
use crate::storage::Timestamp;
use crate::transaction::ClientTransaction;

use super::{ChangeSet, PersistenceStrategy};

/// Persistence of a sub-transaction: its parent transaction. The parent is borrowed
/// mutably for the lifetime of the sub-transaction and cannot be used meanwhile.
pub struct SubPersistenceStrategy<'a, 'p> {
    parent: &'a mut ClientTransaction<'p>,
}

impl<'a, 'p> SubPersistenceStrategy<'a, 'p> {
    pub(crate) fn new(parent: &'a mut ClientTransaction<'p>) -> Self {
        SubPersistenceStrategy { parent }
    }

    pub fn parent(&self) -> &ClientTransaction<'p> {
        self.parent
    }
}

impl PersistenceStrategy for SubPersistenceStrategy<'_, '_> {
    fn change_detection(&self) -> ChangeDetection {
        ChangeDetection::Ordered
    }

    fn new_object_id(&mut self, class: &ClassDefinition) -> Result<ObjectId> {
        self.parent.allocate_object_id(class)
    }

    fn load_data_container(&mut self, id: &ObjectId) -> Result<DataContainer> {
        self.parent.container_for_sub_transaction(id)
    }

    fn load_data_containers(&mut self, ids: &[ObjectId]) -> Result<Vec<Option<DataContainer>>> {
        ids.iter()
            .map(|id| match self.parent.container_for_sub_transaction(id) {
                Ok(container) => Ok(Some(container)),
                Err(Error::ObjectNotFound(_)) => Ok(None),
                Err(err) => Err(err),
            })
            .collect()
    }

    fn load_related_data_containers(
        &mut self,
        end_point: &RelationEndPointId,
        _definition: &RelationEndPointDefinition,
    ) -> Result<Vec<DataContainer>> {
        let ids = self.parent.related_ids_for_sub_transaction(end_point)?;
        ids.iter()
            .map(|id| self.parent.container_for_sub_transaction(id))
            .collect()
    }

    fn persist(&mut self, changes: &ChangeSet<'_>) -> Result<HashMap<ObjectId, Timestamp>> {
        self.parent.accept_sub_transaction_changes(changes)?;
        Ok(HashMap::new())
    }

    fn enlisted_object(&self, id: &ObjectId) -> Option<DomainObject> {
        self.parent.enlisted_object(id)
    }
}
