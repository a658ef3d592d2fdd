//! Transactional unit-of-work core for domain object graphs.
//!
//! A [`ClientTransaction`] tracks loaded objects, their property values and the
//! bidirectional relations between them, keeps both sides of every relation in sync,
//! announces changes to [`TransactionListener`]s with cancellation, and commits to
//! [`StorageProvider`]s with optimistic concurrency checks.

mod collection;
mod data;
mod data_manager;
mod domain_object;
#[cfg(feature = "emitter")]
mod emitter;
mod end_point;
mod error;
mod listener;
pub mod mapping;
mod modification;
mod object_id;
mod persistence;
pub mod storage;
mod transaction;
mod value;

pub use collection::{AssociatedCollection, CollectionHandler, DomainObjectCollection, Identified, OrderedIdSet};
pub use data::{DataContainer, DataContainerMap, PropertyValue, PropertyValueCollection, StateType};
pub use data_manager::DataManager;
pub use domain_object::{DomainObject, PropertyAccessor, PropertyKind};
pub use end_point::{
    ChangeDetection, CollectionEndPoint, RealObjectEndPoint, RelationEndPoint, RelationEndPointId,
    RelationEndPointMap, VirtualObjectEndPoint,
};
pub use error::{ArgumentError, Error, Result};
pub use listener::{ListenerCollection, ListenerError, ListenerResult, TransactionListener};
pub use mapping::{
    ClassBuilder, ClassDefinition, MappingBuilder, MappingConfiguration, MappingError, PropertyBuilder,
    RelationBuilder,
};
pub use modification::{ApprovedCommand, PerformedCommand, RelationCommand, RelationStep};
pub use object_id::{KeyValue, ObjectId};
pub use persistence::{ChangeSet, PersistenceStrategy, RootPersistenceStrategy, SubPersistenceStrategy};
pub use storage::{InMemoryStorageProvider, StorageError, StorageProvider, StorageProviderRegistry, Timestamp};
pub use transaction::{
    current_transaction_id, AutoRollbackBehavior, ClientTransaction, TransactionId, TransactionScope,
};
pub use value::{Value, ValueTypeError};

#[cfg(feature = "emitter")]
pub use emitter::{CommitEmitter, COMMITTED, ROLLED_BACK};

// Re-export the EventEmitter from the event_emitter_rs crate
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
