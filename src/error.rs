use thiserror::Error;

use crate::mapping::MappingError;
use crate::object_id::ObjectId;
use crate::storage::StorageError;
use crate::transaction::TransactionId;

/// Invalid argument passed to a collection or relation operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("object '{item}' is not a '{required_class}'")]
    ItemTypeMismatch {
        item: ObjectId,
        required_class: String,
    },
    #[error("index {index} is out of range for a collection of {len} items")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("collection already contains '{0}'")]
    DuplicateItem(ObjectId),
    #[error("collection is read-only")]
    ReadOnlyCollection,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Argument(#[from] ArgumentError),
    #[error("object '{0}' is deleted")]
    ObjectDeleted(ObjectId),
    #[error("object '{0}' is invalid in this transaction")]
    ObjectInvalid(ObjectId),
    #[error("object '{0}' could not be found")]
    ObjectNotFound(ObjectId),
    #[error("object '{0}' is already registered in this transaction")]
    DuplicateObject(ObjectId),
    #[error("a different domain object with id '{0}' is already enlisted in this transaction")]
    ObjectAlreadyEnlisted(ObjectId),
    #[error("domain object '{id}' cannot be used in transaction {transaction}")]
    TransactionsDiffer {
        id: ObjectId,
        transaction: TransactionId,
    },
    #[error("operation cancelled: {0}")]
    Cancelled(String),
    #[error("listener failed after the change was applied: {0}")]
    Listener(String),
    #[error("mandatory relation '{property}' of object '{id}' is not set")]
    MandatoryRelationNotSet { id: ObjectId, property: String },
    #[error("object '{from}' references '{to}', which is deleted in the same commit")]
    DanglingReference { from: ObjectId, to: ObjectId },
    #[error("a listener with key '{0}' is already registered")]
    DuplicateListener(String),
    #[error("transaction has been discarded")]
    TransactionDiscarded,
}

impl Error {
    pub fn is_concurrency_violation(&self) -> bool {
        matches!(self, Error::Storage(StorageError::ConcurrencyViolation { .. }))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
