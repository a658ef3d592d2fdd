//! Transaction listeners.
//!
//! Every structural change of a transaction is announced twice: a "changing" call before
//! anything is modified, which may veto the change by returning an error, and a "changed"
//! call afterwards, whose errors are reported to the caller without undoing the change.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::end_point::RelationEndPointId;
use crate::error::{Error, Result};
use crate::object_id::ObjectId;
use crate::transaction::TransactionId;
use crate::value::Value;

/// Error returned by a listener. In a "changing" call it cancels the operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ListenerError(String);

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        ListenerError(message.into())
    }

    pub fn cancel() -> Self {
        ListenerError("cancelled by listener".to_string())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

pub type ListenerResult = std::result::Result<(), ListenerError>;

/// Observer of one or more transactions. Every method defaults to doing nothing.
#[allow(unused_variables)]
pub trait TransactionListener: Send + Sync {
    fn objects_loaded(&self, tx: TransactionId, ids: &[ObjectId]) -> ListenerResult {
        Ok(())
    }

    fn new_object_creating(&self, tx: TransactionId, class_id: &str) -> ListenerResult {
        Ok(())
    }

    fn property_value_changing(
        &self,
        tx: TransactionId,
        id: &ObjectId,
        property: &str,
        old: &Value,
        new: &Value,
    ) -> ListenerResult {
        Ok(())
    }

    fn property_value_changed(
        &self,
        tx: TransactionId,
        id: &ObjectId,
        property: &str,
        old: &Value,
        new: &Value,
    ) -> ListenerResult {
        Ok(())
    }

    fn relation_changing(
        &self,
        tx: TransactionId,
        id: &ObjectId,
        property: &str,
        old: Option<&ObjectId>,
        new: Option<&ObjectId>,
    ) -> ListenerResult {
        Ok(())
    }

    fn relation_changed(
        &self,
        tx: TransactionId,
        id: &ObjectId,
        property: &str,
        old: Option<&ObjectId>,
        new: Option<&ObjectId>,
    ) -> ListenerResult {
        Ok(())
    }

    fn collection_adding(
        &self,
        tx: TransactionId,
        end_point: &RelationEndPointId,
        item: &ObjectId,
    ) -> ListenerResult {
        Ok(())
    }

    fn collection_added(
        &self,
        tx: TransactionId,
        end_point: &RelationEndPointId,
        item: &ObjectId,
    ) -> ListenerResult {
        Ok(())
    }

    fn collection_removing(
        &self,
        tx: TransactionId,
        end_point: &RelationEndPointId,
        item: &ObjectId,
    ) -> ListenerResult {
        Ok(())
    }

    fn collection_removed(
        &self,
        tx: TransactionId,
        end_point: &RelationEndPointId,
        item: &ObjectId,
    ) -> ListenerResult {
        Ok(())
    }

    fn object_deleting(&self, tx: TransactionId, id: &ObjectId) -> ListenerResult {
        Ok(())
    }

    fn object_deleted(&self, tx: TransactionId, id: &ObjectId) -> ListenerResult {
        Ok(())
    }

    fn committing(&self, tx: TransactionId, ids: &[ObjectId]) -> ListenerResult {
        Ok(())
    }

    fn committed(&self, tx: TransactionId, ids: &[ObjectId]) -> ListenerResult {
        Ok(())
    }

    fn rolling_back(&self, tx: TransactionId, ids: &[ObjectId]) -> ListenerResult {
        Ok(())
    }

    fn rolled_back(&self, tx: TransactionId, ids: &[ObjectId]) -> ListenerResult {
        Ok(())
    }

    fn sub_transaction_created(&self, parent: TransactionId, child: TransactionId) -> ListenerResult {
        Ok(())
    }
}

/// Ordered, keyed set of listeners. Cloning shares the listeners.
#[derive(Clone, Default)]
pub struct ListenerCollection {
    listeners: Vec<(String, Arc<dyn TransactionListener>)>,
}

impl ListenerCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, listener: Arc<dyn TransactionListener>) -> Result<()> {
        let key = key.into();
        if self.listeners.iter().any(|(existing, _)| *existing == key) {
            return Err(Error::DuplicateListener(key));
        }
        self.listeners.push((key, listener));
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<Arc<dyn TransactionListener>> {
        let index = self.listeners.iter().position(|(existing, _)| existing == key)?;
        Some(self.listeners.remove(index).1)
    }

    pub fn get(&self, key: &str) -> Option<&Arc<dyn TransactionListener>> {
        self.listeners
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, listener)| listener)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.listeners.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Runs a "changing" notification, stopping at the first veto.
    pub(crate) fn before<F>(&self, mut notify: F) -> ListenerResult
    where
        F: FnMut(&dyn TransactionListener) -> ListenerResult,
    {
        for (_, listener) in &self.listeners {
            notify(listener.as_ref())?;
        }
        Ok(())
    }

    /// Runs a "changed" notification on every listener and returns the first error.
    pub(crate) fn after<F>(&self, mut notify: F) -> ListenerResult
    where
        F: FnMut(&dyn TransactionListener) -> ListenerResult,
    {
        let mut first_error = None;
        for (key, listener) in &self.listeners {
            if let Err(err) = notify(listener.as_ref()) {
                tracing::warn!(listener = %key, error = %err, "listener failed after change");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for ListenerCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

/// Maps a "changing" veto to [`Error::Cancelled`].
pub(crate) fn cancelled(err: ListenerError) -> Error {
    tracing::debug!(reason = %err, "operation cancelled by listener");
    Error::Cancelled(err.0)
}

/// Maps a "changed" failure to [`Error::Listener`].
pub(crate) fn failed(err: ListenerError) -> Error {
    Error::Listener(err.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Named {
        name: &'static str,
        fail: bool,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl TransactionListener for Named {
        fn object_deleting(&self, _tx: TransactionId, _id: &ObjectId) -> ListenerResult {
            self.calls.lock().unwrap().push(self.name);
            if self.fail {
                Err(ListenerError::new(self.name))
            } else {
                Ok(())
            }
        }
    }

    fn collection(calls: &Arc<Mutex<Vec<&'static str>>>) -> ListenerCollection {
        let mut listeners = ListenerCollection::new();
        for (name, fail) in [("a", false), ("b", true), ("c", true)] {
            listeners
                .add(
                    name,
                    Arc::new(Named {
                        name,
                        fail,
                        calls: calls.clone(),
                    }),
                )
                .unwrap();
        }
        listeners
    }

    #[test]
    fn before_stops_at_first_veto() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let listeners = collection(&calls);
        let id = ObjectId::new("Order", 1);

        let err = listeners
            .before(|l| l.object_deleting(TransactionId::next(), &id))
            .unwrap_err();
        assert_eq!(err.message(), "b");
        assert_eq!(*calls.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn after_runs_all_and_returns_first_error() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let listeners = collection(&calls);
        let id = ObjectId::new("Order", 1);

        let err = listeners
            .after(|l| l.object_deleting(TransactionId::next(), &id))
            .unwrap_err();
        assert_eq!(err.message(), "b");
        assert_eq!(*calls.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn keys_are_unique() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut listeners = collection(&calls);
        let duplicate = Arc::new(Named {
            name: "a",
            fail: false,
            calls,
        });

        assert!(matches!(
            listeners.add("a", duplicate),
            Err(Error::DuplicateListener(key)) if key == "a"
        ));
        assert!(listeners.remove("b").is_some());
        assert_eq!(listeners.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    }
}
