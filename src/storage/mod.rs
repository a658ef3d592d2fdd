//! Persistence collaborator contract.
//!
//! A [`StorageProvider`] is the only component that talks to a backing store. The
//! transaction core hands it containers to load and save; it never sees domain objects.

mod in_memory;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::DataContainer;
use crate::mapping::{ClassDefinition, MappingConfiguration, MappingError, RelationEndPointDefinition};
use crate::object_id::ObjectId;

pub use in_memory::InMemoryStorageProvider;

/// Opaque optimistic-concurrency token handed out by a storage provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("concurrency violation: {} object(s) were changed or removed by another transaction", .ids.len())]
    ConcurrencyViolation { ids: Vec<ObjectId> },
    #[error("storage provider error: {0}")]
    Provider(String),
    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("no storage provider registered with id '{0}'")]
    UnknownProvider(String),
    #[error("storage provider '{0}' is registered more than once")]
    DuplicateProvider(String),
    #[error("one-to-one end-point '{end_point}' has {count} related objects in storage")]
    InconsistentRelation { end_point: String, count: usize },
    #[error(transparent)]
    Mapping(#[from] MappingError),
}

impl From<bitcode::Error> for StorageError {
    fn from(err: bitcode::Error) -> Self {
        StorageError::Serde(err.to_string())
    }
}

/// Loads and saves data containers for the classes mapped to one storage provider id.
pub trait StorageProvider: Send + Sync {
    fn id(&self) -> &str;

    fn new_object_id(&self, class: &ClassDefinition) -> Result<ObjectId, StorageError>;

    fn load_data_container(
        &self,
        mapping: &MappingConfiguration,
        id: &ObjectId,
    ) -> Result<Option<DataContainer>, StorageError>;

    /// Order preserving; missing objects are `None`.
    fn load_data_containers(
        &self,
        mapping: &MappingConfiguration,
        ids: &[ObjectId],
    ) -> Result<Vec<Option<DataContainer>>, StorageError> {
        ids.iter()
            .map(|id| self.load_data_container(mapping, id))
            .collect()
    }

    /// Every object whose foreign key `end_point` (a real end-point) holds `related_id`.
    fn load_related_data_containers(
        &self,
        mapping: &MappingConfiguration,
        end_point: &RelationEndPointDefinition,
        related_id: &ObjectId,
    ) -> Result<Vec<DataContainer>, StorageError>;

    /// Inserts New, updates Changed and deletes Deleted containers, in the given order.
    /// Either every container is written or none is.
    fn save(&self, containers: &[&DataContainer]) -> Result<(), StorageError>;

    fn refresh_timestamps(&self, ids: &[ObjectId]) -> Result<Vec<(ObjectId, Timestamp)>, StorageError>;
}

/// Storage providers by id. Cloning shares the providers.
#[derive(Clone, Default)]
pub struct StorageProviderRegistry {
    providers: HashMap<String, Arc<dyn StorageProvider>>,
}

impl StorageProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn StorageProvider>) -> Result<(), StorageError> {
        let id = provider.id().to_string();
        if self.providers.contains_key(&id) {
            return Err(StorageError::DuplicateProvider(id));
        }
        self.providers.insert(id, provider);
        Ok(())
    }

    pub fn with(mut self, provider: Arc<dyn StorageProvider>) -> Result<Self, StorageError> {
        self.register(provider)?;
        Ok(self)
    }

    pub fn get(&self, id: &str) -> Result<&Arc<dyn StorageProvider>, StorageError> {
        self.providers
            .get(id)
            .ok_or_else(|| StorageError::UnknownProvider(id.to_string()))
    }

    pub fn provider_for(&self, class: &ClassDefinition) -> Result<&Arc<dyn StorageProvider>, StorageError> {
        self.get(class.storage_provider_id())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

impl fmt::Debug for StorageProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.ids().collect();
        ids.sort_unstable();
        f.debug_struct("StorageProviderRegistry")
            .field("providers", &ids)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_rejects_duplicate_ids() {
        let mut registry = StorageProviderRegistry::new();
        registry
            .register(Arc::new(InMemoryStorageProvider::new("default")))
            .unwrap();

        let err = registry
            .register(Arc::new(InMemoryStorageProvider::new("default")))
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateProvider(id) if id == "default"));
    }

    #[test]
    fn registry_unknown_provider() {
        let registry = StorageProviderRegistry::new();
        assert!(matches!(
            registry.get("other"),
            Err(StorageError::UnknownProvider(_))
        ));
    }
}
