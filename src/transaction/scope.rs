use std::cell::RefCell;
use std::ops::{Deref, DerefMut};

use super::{ClientTransaction, TransactionId};

thread_local! {
    static CURRENT: RefCell<Vec<TransactionId>> = const { RefCell::new(Vec::new()) };
}

/// The transaction of the innermost active scope on this thread.
pub fn current_transaction_id() -> Option<TransactionId> {
    CURRENT.with(|stack| stack.borrow().last().copied())
}

/// What happens to the transaction when its scope ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoRollbackBehavior {
    /// Leave the transaction as it is.
    #[default]
    None,
    /// Roll back uncommitted changes.
    Rollback,
    /// Discard the transaction.
    Discard,
}

/// Makes a transaction the thread's current one while alive.
pub struct TransactionScope<'t, 'p> {
    transaction: &'t mut ClientTransaction<'p>,
    behavior: AutoRollbackBehavior,
}

impl<'t, 'p> TransactionScope<'t, 'p> {
    pub(crate) fn enter(transaction: &'t mut ClientTransaction<'p>, behavior: AutoRollbackBehavior) -> Self {
        let id = transaction.id();
        CURRENT.with(|stack| stack.borrow_mut().push(id));
        tracing::trace!(tx = %id, ?behavior, "entered transaction scope");
        TransactionScope {
            transaction,
            behavior,
        }
    }

    pub fn behavior(&self) -> AutoRollbackBehavior {
        self.behavior
    }

    pub fn set_behavior(&mut self, behavior: AutoRollbackBehavior) {
        self.behavior = behavior;
    }
}

impl<'p> Deref for TransactionScope<'_, 'p> {
    type Target = ClientTransaction<'p>;

    fn deref(&self) -> &Self::Target {
        self.transaction
    }
}

impl<'p> DerefMut for TransactionScope<'_, 'p> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.transaction
    }
}

impl Drop for TransactionScope<'_, '_> {
    fn drop(&mut self) {
        let id = self.transaction.id();
        CURRENT.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(position) = stack.iter().rposition(|entry| *entry == id) {
                stack.remove(position);
            }
        });

        match self.behavior {
            AutoRollbackBehavior::None => {}
            AutoRollbackBehavior::Rollback => {
                if !self.transaction.is_discarded() && self.transaction.has_changes() {
                    if let Err(err) = self.transaction.rollback() {
                        tracing::warn!(tx = %id, error = %err, "rollback at scope exit failed");
                    }
                }
            }
            AutoRollbackBehavior::Discard => self.transaction.discard(),
        }
        tracing::trace!(tx = %id, "left transaction scope");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{ClassBuilder, MappingBuilder, PropertyBuilder};
    use crate::storage::{InMemoryStorageProvider, StorageProviderRegistry};
    use std::sync::Arc;

    fn transaction() -> ClientTransaction<'static> {
        let mapping = MappingBuilder::new()
            .class(ClassBuilder::new("Order").property(PropertyBuilder::int("OrderNumber")))
            .build()
            .unwrap();
        let providers = StorageProviderRegistry::new()
            .with(Arc::new(InMemoryStorageProvider::new("default")))
            .unwrap();
        ClientTransaction::new_root(mapping, providers)
    }

    #[test]
    fn scopes_nest_and_unwind() {
        let mut outer = transaction();
        let mut inner = transaction();
        let (outer_id, inner_id) = (outer.id(), inner.id());

        assert_eq!(current_transaction_id(), None);
        {
            let _outer = outer.enter_non_discarding_scope();
            assert_eq!(current_transaction_id(), Some(outer_id));
            {
                let _inner = inner.enter_discarding_scope();
                assert_eq!(current_transaction_id(), Some(inner_id));
            }
            assert_eq!(current_transaction_id(), Some(outer_id));
        }
        assert_eq!(current_transaction_id(), None);
        assert!(!outer.is_discarded());
        assert!(inner.is_discarded());
    }

    #[test]
    fn rollback_scope_discards_new_objects() {
        let mut tx = transaction();
        let order = {
            let mut scope = tx.enter_scope(AutoRollbackBehavior::Rollback);
            scope.new_object("Order").unwrap()
        };

        assert!(!tx.has_changes());
        assert_eq!(tx.state(&order).unwrap(), crate::data::StateType::Discarded);
    }

    #[test]
    fn scope_is_left_on_panic() {
        let mut tx = transaction();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = tx.enter_non_discarding_scope();
            panic!("boom");
        }));

        assert!(result.is_err());
        assert_eq!(current_transaction_id(), None);
    }
}
