use crate::domain_object::DomainObject;
use crate::error::{ArgumentError, Result};
use crate::object_id::ObjectId;
use crate::transaction::ClientTransaction;

use super::DomainObjectCollection;

/// The collection end-point `property` of `owner`, seen through a transaction. Every
/// change updates the foreign keys of the items involved.
pub struct AssociatedCollection<'t, 'p> {
    transaction: &'t mut ClientTransaction<'p>,
    owner: DomainObject,
    property: String,
}

impl<'t, 'p> AssociatedCollection<'t, 'p> {
    pub(crate) fn new(transaction: &'t mut ClientTransaction<'p>, owner: DomainObject, property: &str) -> Self {
        AssociatedCollection {
            transaction,
            owner,
            property: property.to_string(),
        }
    }

    pub fn owner(&self) -> &DomainObject {
        &self.owner
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn ids(&mut self) -> Result<Vec<ObjectId>> {
        self.transaction.related_ids(&self.owner, &self.property)
    }

    pub fn len(&mut self) -> Result<usize> {
        Ok(self.ids()?.len())
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.ids()?.is_empty())
    }

    pub fn contains(&mut self, item: &DomainObject) -> Result<bool> {
        Ok(self.ids()?.contains(item.id()))
    }

    pub fn index_of(&mut self, item: &DomainObject) -> Result<Option<usize>> {
        Ok(self.ids()?.iter().position(|id| id == item.id()))
    }

    pub fn get(&mut self, index: usize) -> Result<Option<DomainObject>> {
        match self.ids()?.get(index) {
            Some(id) => self.transaction.object_by_id(id).map(Some),
            None => Ok(None),
        }
    }

    /// Read-only snapshot of the current items.
    pub fn to_collection(&mut self) -> Result<DomainObjectCollection> {
        self.transaction
            .get_related_objects(&self.owner, &self.property)
    }

    pub fn add(&mut self, item: &DomainObject) -> Result<()> {
        self.transaction
            .insert_related_object(&self.owner, &self.property, None, item)
    }

    pub fn insert(&mut self, index: usize, item: &DomainObject) -> Result<()> {
        self.transaction
            .insert_related_object(&self.owner, &self.property, Some(index), item)
    }

    /// Returns false if `item` was not a member.
    pub fn remove(&mut self, item: &DomainObject) -> Result<bool> {
        self.transaction
            .remove_related_object(&self.owner, &self.property, item)
    }

    pub fn remove_at(&mut self, index: usize) -> Result<DomainObject> {
        let ids = self.ids()?;
        let id = ids.get(index).ok_or(ArgumentError::IndexOutOfRange {
            index,
            len: ids.len(),
        })?;
        let item = self.transaction.object_by_id(id)?;
        self.remove(&item)?;
        Ok(item)
    }

    /// Replaces the item at `index`.
    pub fn set(&mut self, index: usize, item: &DomainObject) -> Result<()> {
        self.transaction
            .replace_related_object(&self.owner, &self.property, index, item)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.transaction
            .clear_related_objects(&self.owner, &self.property)
    }
}
