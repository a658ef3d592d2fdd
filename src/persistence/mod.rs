//! Where a transaction gets its data from and where its commits go.
//!
//! A root transaction talks to the storage providers; a sub-transaction talks to its
//! parent transaction.

mod commit_order;
mod root;
mod sub;

use std::collections::HashMap;

use crate::data::DataContainer;
use crate::domain_object::DomainObject;
use crate::end_point::{ChangeDetection, RelationEndPoint, RelationEndPointId};
use crate::error::Result;
use crate::mapping::{ClassDefinition, RelationEndPointDefinition};
use crate::object_id::ObjectId;
use crate::storage::Timestamp;

pub use commit_order::{check_dangling_references, order_for_save};
pub use root::RootPersistenceStrategy;
pub use sub::SubPersistenceStrategy;

/// Everything a commit hands to its persistence strategy.
#[derive(Debug)]
pub struct ChangeSet<'a> {
    /// New, changed and deleted containers in registration order.
    pub containers: Vec<&'a DataContainer>,
    /// Virtual end-points that differ from their original state.
    pub end_points: Vec<&'a RelationEndPoint>,
    /// Domain objects created in the committing transaction.
    pub new_objects: Vec<DomainObject>,
}

impl ChangeSet<'_> {
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty() && self.end_points.is_empty()
    }
}

pub trait PersistenceStrategy {
    fn change_detection(&self) -> ChangeDetection;

    fn new_object_id(&mut self, class: &ClassDefinition) -> Result<ObjectId>;

    /// Fails with `ObjectNotFound` if the object does not exist.
    fn load_data_container(&mut self, id: &ObjectId) -> Result<DataContainer>;

    /// Order preserving; missing objects are `None`.
    fn load_data_containers(&mut self, ids: &[ObjectId]) -> Result<Vec<Option<DataContainer>>>;

    /// Containers of the objects on the opposite side of the virtual end-point `end_point`.
    fn load_related_data_containers(
        &mut self,
        end_point: &RelationEndPointId,
        definition: &RelationEndPointDefinition,
    ) -> Result<Vec<DataContainer>>;

    /// Writes the changes, returning the new timestamp of every saved object.
    fn persist(&mut self, changes: &ChangeSet<'_>) -> Result<HashMap<ObjectId, Timestamp>>;

    /// A domain object already handed out for `id` by an enclosing transaction.
    fn enlisted_object(&self, id: &ObjectId) -> Option<DomainObject>;
}
