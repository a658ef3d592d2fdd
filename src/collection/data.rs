use std::collections::HashSet;

use crate::error::ArgumentError;
use crate::object_id::ObjectId;

/// Anything that carries an [`ObjectId`].
pub trait Identified {
    fn object_id(&self) -> &ObjectId;
}

impl Identified for ObjectId {
    fn object_id(&self) -> &ObjectId {
        self
    }
}

/// Ordered sequence of items that are unique by object id.
#[derive(Debug, Clone)]
pub struct OrderedIdSet<T> {
    items: Vec<T>,
    ids: HashSet<ObjectId>,
}

impl<T> Default for OrderedIdSet<T> {
    fn default() -> Self {
        OrderedIdSet {
            items: Vec::new(),
            ids: HashSet::new(),
        }
    }
}

impl<T: Identified> OrderedIdSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from `items`, rejecting duplicates.
    pub fn from_items<I: IntoIterator<Item = T>>(items: I) -> Result<Self, ArgumentError> {
        let mut set = Self::new();
        for item in items {
            set.push(item)?;
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.ids.contains(id)
    }

    pub fn index_of(&self, id: &ObjectId) -> Option<usize> {
        if !self.contains(id) {
            return None;
        }
        self.items.iter().position(|item| item.object_id() == id)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.items.iter().map(Identified::object_id)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn push(&mut self, item: T) -> Result<(), ArgumentError> {
        self.insert(self.items.len(), item)
    }

    pub fn insert(&mut self, index: usize, item: T) -> Result<(), ArgumentError> {
        if index > self.items.len() {
            return Err(ArgumentError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        if self.contains(item.object_id()) {
            return Err(ArgumentError::DuplicateItem(item.object_id().clone()));
        }
        self.ids.insert(item.object_id().clone());
        self.items.insert(index, item);
        Ok(())
    }

    pub fn remove(&mut self, id: &ObjectId) -> Option<T> {
        let index = self.index_of(id)?;
        self.ids.remove(id);
        Some(self.items.remove(index))
    }

    pub fn remove_at(&mut self, index: usize) -> Result<T, ArgumentError> {
        if index >= self.items.len() {
            return Err(ArgumentError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        let item = self.items.remove(index);
        self.ids.remove(item.object_id());
        Ok(item)
    }

    /// Replaces the item at `index`, returning the previous one.
    pub fn replace(&mut self, index: usize, item: T) -> Result<T, ArgumentError> {
        let len = self.items.len();
        let current = self
            .items
            .get(index)
            .ok_or(ArgumentError::IndexOutOfRange { index, len })?;
        if current.object_id() != item.object_id() && self.contains(item.object_id()) {
            return Err(ArgumentError::DuplicateItem(item.object_id().clone()));
        }

        self.ids.remove(current.object_id());
        self.ids.insert(item.object_id().clone());
        Ok(std::mem::replace(&mut self.items[index], item))
    }

    pub fn clear(&mut self) -> Vec<T> {
        self.ids.clear();
        std::mem::take(&mut self.items)
    }

    pub fn same_sequence<'a, I>(&self, other: I) -> bool
    where
        I: IntoIterator<Item = &'a ObjectId>,
    {
        let mut other = other.into_iter();
        for id in self.ids() {
            if other.next() != Some(id) {
                return false;
            }
        }
        other.next().is_none()
    }

    pub fn same_set<'a, I>(&self, other: I) -> bool
    where
        I: IntoIterator<Item = &'a ObjectId>,
    {
        let mut count = 0;
        for id in other {
            if !self.contains(id) {
                return false;
            }
            count += 1;
        }
        count == self.len()
    }
}

impl<'a, T> IntoIterator for &'a OrderedIdSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(key: i64) -> ObjectId {
        ObjectId::new("Order", key)
    }

    #[test]
    fn insert_rejects_duplicates_and_bad_index() {
        let mut set = OrderedIdSet::from_items([id(1), id(2)]).unwrap();

        assert_eq!(set.insert(0, id(1)), Err(ArgumentError::DuplicateItem(id(1))));
        assert_eq!(
            set.insert(3, id(3)),
            Err(ArgumentError::IndexOutOfRange { index: 3, len: 2 })
        );

        set.insert(1, id(3)).unwrap();
        assert!(set.same_sequence(&[id(1), id(3), id(2)]));
    }

    #[test]
    fn replace_allows_same_item_and_rejects_other_members() {
        let mut set = OrderedIdSet::from_items([id(1), id(2)]).unwrap();

        assert_eq!(set.replace(0, id(1)).unwrap(), id(1));
        assert_eq!(set.replace(0, id(2)), Err(ArgumentError::DuplicateItem(id(2))));

        assert_eq!(set.replace(0, id(5)).unwrap(), id(1));
        assert!(!set.contains(&id(1)));
        assert_eq!(set.index_of(&id(5)), Some(0));
    }

    #[test]
    fn set_and_sequence_comparison() {
        let set = OrderedIdSet::from_items([id(1), id(2)]).unwrap();

        assert!(set.same_set(&[id(2), id(1)]));
        assert!(!set.same_sequence(&[id(2), id(1)]));
        assert!(!set.same_set(&[id(1)]));
        assert!(!set.same_sequence(&[id(1), id(2), id(3)]));
    }

    #[test]
    fn remove_and_clear() {
        let mut set = OrderedIdSet::from_items([id(1), id(2), id(3)]).unwrap();

        assert_eq!(set.remove(&id(2)), Some(id(2)));
        assert_eq!(set.remove(&id(2)), None);
        assert_eq!(set.remove_at(0).unwrap(), id(1));
        assert_eq!(set.clear(), vec![id(3)]);
        assert!(set.is_empty());
    }
}
