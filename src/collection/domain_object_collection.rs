use std::fmt;
use std::sync::Arc;

use crate::domain_object::DomainObject;
use crate::error::{ArgumentError, Error, Result};
use crate::listener::{cancelled, failed, ListenerResult};
use crate::object_id::ObjectId;

use super::data::OrderedIdSet;

/// Callback run on a collection change. An error from an "adding" or "removing" handler
/// cancels the change.
pub type CollectionHandler = Arc<dyn Fn(&DomainObject) -> ListenerResult + Send + Sync>;

#[derive(Clone, Default)]
struct Handlers {
    adding: Vec<CollectionHandler>,
    added: Vec<CollectionHandler>,
    removing: Vec<CollectionHandler>,
    removed: Vec<CollectionHandler>,
}

fn run_before(handlers: &[CollectionHandler], item: &DomainObject) -> Result<()> {
    for handler in handlers {
        handler(item).map_err(cancelled)?;
    }
    Ok(())
}

fn run_after(handlers: &[CollectionHandler], item: &DomainObject) -> Result<()> {
    let mut first_error = None;
    for handler in handlers {
        if let Err(err) = handler(item) {
            first_error.get_or_insert(err);
        }
    }
    first_error.map_or(Ok(()), |err| Err(failed(err)))
}

/// Ordered collection of distinct domain objects, optionally restricted to a class and
/// its subclasses.
#[derive(Clone, Default)]
pub struct DomainObjectCollection {
    items: OrderedIdSet<DomainObject>,
    required_item_class: Option<String>,
    read_only: bool,
    handlers: Handlers,
}

impl DomainObjectCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_required_class(class_id: impl Into<String>) -> Self {
        DomainObjectCollection {
            required_item_class: Some(class_id.into()),
            ..Self::default()
        }
    }

    pub fn from_objects<I>(objects: I, required_item_class: Option<&str>) -> Result<Self>
    where
        I: IntoIterator<Item = DomainObject>,
    {
        let mut collection = DomainObjectCollection {
            required_item_class: required_item_class.map(str::to_string),
            ..Self::default()
        };
        for object in objects {
            collection.add(object)?;
        }
        Ok(collection)
    }

    pub fn required_item_class(&self) -> Option<&str> {
        self.required_item_class.as_deref()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn into_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// A read-only copy without the change handlers.
    pub fn as_read_only(&self) -> Self {
        DomainObjectCollection {
            items: self.items.clone(),
            required_item_class: self.required_item_class.clone(),
            read_only: true,
            handlers: Handlers::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.items.contains(id)
    }

    /// True only if this very handle is a member.
    pub fn contains_object(&self, object: &DomainObject) -> bool {
        self.items
            .index_of(object.id())
            .and_then(|index| self.items.get(index))
            .is_some_and(|member| member.ptr_eq(object))
    }

    pub fn index_of(&self, id: &ObjectId) -> Option<usize> {
        self.items.index_of(id)
    }

    pub fn get(&self, index: usize) -> Option<&DomainObject> {
        self.items.get(index)
    }

    pub fn get_by_id(&self, id: &ObjectId) -> Option<&DomainObject> {
        self.index_of(id).and_then(|index| self.items.get(index))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DomainObject> {
        self.items.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.items.ids()
    }

    pub fn to_vec(&self) -> Vec<DomainObject> {
        self.items.as_slice().to_vec()
    }

    pub fn on_adding<F>(&mut self, handler: F)
    where
        F: Fn(&DomainObject) -> ListenerResult + Send + Sync + 'static,
    {
        self.handlers.adding.push(Arc::new(handler));
    }

    pub fn on_added<F>(&mut self, handler: F)
    where
        F: Fn(&DomainObject) -> ListenerResult + Send + Sync + 'static,
    {
        self.handlers.added.push(Arc::new(handler));
    }

    pub fn on_removing<F>(&mut self, handler: F)
    where
        F: Fn(&DomainObject) -> ListenerResult + Send + Sync + 'static,
    {
        self.handlers.removing.push(Arc::new(handler));
    }

    pub fn on_removed<F>(&mut self, handler: F)
    where
        F: Fn(&DomainObject) -> ListenerResult + Send + Sync + 'static,
    {
        self.handlers.removed.push(Arc::new(handler));
    }

    pub fn add(&mut self, item: DomainObject) -> Result<()> {
        self.insert(self.items.len(), item)
    }

    pub fn insert(&mut self, index: usize, item: DomainObject) -> Result<()> {
        self.check_writable()?;
        self.check_item_type(&item)?;
        if self.items.contains(item.id()) {
            return Err(ArgumentError::DuplicateItem(item.id().clone()).into());
        }
        if index > self.items.len() {
            return Err(ArgumentError::IndexOutOfRange {
                index,
                len: self.items.len(),
            }
            .into());
        }

        run_before(&self.handlers.adding, &item)?;
        self.items.insert(index, item.clone())?;
        run_after(&self.handlers.added, &item)
    }

    /// Returns false if no item with `id` is a member.
    pub fn remove(&mut self, id: &ObjectId) -> Result<bool> {
        self.check_writable()?;
        match self.items.index_of(id) {
            Some(index) => self.remove_at(index).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn remove_at(&mut self, index: usize) -> Result<DomainObject> {
        self.check_writable()?;
        let item = self
            .items
            .get(index)
            .cloned()
            .ok_or(ArgumentError::IndexOutOfRange {
                index,
                len: self.items.len(),
            })?;

        run_before(&self.handlers.removing, &item)?;
        self.items.remove_at(index)?;
        run_after(&self.handlers.removed, &item)?;
        Ok(item)
    }

    /// Replaces the item at `index`. Setting the item already there does nothing.
    pub fn set(&mut self, index: usize, item: DomainObject) -> Result<DomainObject> {
        self.check_writable()?;
        self.check_item_type(&item)?;
        let current = self
            .items
            .get(index)
            .cloned()
            .ok_or(ArgumentError::IndexOutOfRange {
                index,
                len: self.items.len(),
            })?;
        if current.id() == item.id() {
            return Ok(current);
        }
        if self.items.contains(item.id()) {
            return Err(ArgumentError::DuplicateItem(item.id().clone()).into());
        }

        run_before(&self.handlers.removing, &current)?;
        run_before(&self.handlers.adding, &item)?;
        self.items.replace(index, item.clone())?;
        let removed = run_after(&self.handlers.removed, &current);
        let added = run_after(&self.handlers.added, &item);
        removed.and(added)?;
        Ok(current)
    }

    /// Removes every item, announcing each removal.
    pub fn clear(&mut self) -> Result<()> {
        self.check_writable()?;
        for item in self.items.iter() {
            run_before(&self.handlers.removing, item)?;
        }
        let removed = self.items.clear();
        removed
            .iter()
            .map(|item| run_after(&self.handlers.removed, item))
            .collect::<Vec<_>>()
            .into_iter()
            .collect()
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(ArgumentError::ReadOnlyCollection.into());
        }
        Ok(())
    }

    fn check_item_type(&self, item: &DomainObject) -> Result<()> {
        match &self.required_item_class {
            Some(required) if !item.class().is_same_or_derived_from(required) => {
                Err(Error::Argument(ArgumentError::ItemTypeMismatch {
                    item: item.id().clone(),
                    required_class: required.clone(),
                }))
            }
            _ => Ok(()),
        }
    }
}

impl<'a> IntoIterator for &'a DomainObjectCollection {
    type Item = &'a DomainObject;
    type IntoIter = std::slice::Iter<'a, DomainObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl fmt::Debug for DomainObjectCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainObjectCollection")
            .field("items", &self.items.as_slice())
            .field("required_item_class", &self.required_item_class)
            .field("read_only", &self.read_only)
            .finish()
    }
}
