use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::data::{DataContainer, StateType};
use crate::domain_object::DomainObject;
use crate::end_point::{ChangeDetection, RelationEndPointId};
use crate::error::{Error, Result};
use crate::mapping::{ClassDefinition, MappingConfiguration, RelationEndPointDefinition};
use crate::object_id::ObjectId;
use crate::storage::{StorageProviderRegistry, Timestamp};

use super::{check_dangling_references, order_for_save, ChangeSet, PersistenceStrategy};

/// Persistence of a root transaction: the registered storage providers.
#[derive(Debug, Clone)]
pub struct RootPersistenceStrategy {
    mapping: Arc<MappingConfiguration>,
    providers: StorageProviderRegistry,
}

impl RootPersistenceStrategy {
    pub fn new(mapping: Arc<MappingConfiguration>, providers: StorageProviderRegistry) -> Self {
        RootPersistenceStrategy { mapping, providers }
    }

    pub fn providers(&self) -> &StorageProviderRegistry {
        &self.providers
    }
}

impl PersistenceStrategy for RootPersistenceStrategy {
    fn change_detection(&self) -> ChangeDetection {
        ChangeDetection::Unordered
    }

    fn new_object_id(&mut self, class: &ClassDefinition) -> Result<ObjectId> {
        Ok(self.providers.provider_for(class)?.new_object_id(class)?)
    }

    fn load_data_container(&mut self, id: &ObjectId) -> Result<DataContainer> {
        let class = self.mapping.class(id.class_id())?;
        self.providers
            .provider_for(class)?
            .load_data_container(&self.mapping, id)?
            .ok_or_else(|| Error::ObjectNotFound(id.clone()))
    }

    fn load_data_containers(&mut self, ids: &[ObjectId]) -> Result<Vec<Option<DataContainer>>> {
        let mut by_provider: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (index, id) in ids.iter().enumerate() {
            let class = self.mapping.class(id.class_id())?;
            by_provider
                .entry(class.storage_provider_id())
                .or_default()
                .push(index);
        }

        let mut loaded: Vec<Option<DataContainer>> = ids.iter().map(|_| None).collect();
        for (provider_id, indexes) in by_provider {
            let batch: Vec<ObjectId> = indexes.iter().map(|&i| ids[i].clone()).collect();
            let containers = self
                .providers
                .get(provider_id)?
                .load_data_containers(&self.mapping, &batch)?;
            for (index, container) in indexes.into_iter().zip(containers) {
                loaded[index] = container;
            }
        }
        Ok(loaded)
    }

    fn load_related_data_containers(
        &mut self,
        end_point: &RelationEndPointId,
        definition: &RelationEndPointDefinition,
    ) -> Result<Vec<DataContainer>> {
        let real = self.mapping.opposite_end_point(definition)?;
        let class = self.mapping.class(real.class_id())?;
        let containers = self
            .providers
            .provider_for(class)?
            .load_related_data_containers(&self.mapping, real, end_point.object_id())?;
        Ok(containers)
    }

    fn persist(&mut self, changes: &ChangeSet<'_>) -> Result<HashMap<ObjectId, Timestamp>> {
        check_dangling_references(&changes.containers)?;

        let mut by_provider: BTreeMap<&str, Vec<&DataContainer>> = BTreeMap::new();
        for &container in &changes.containers {
            if container.state() == StateType::Changed && !container.has_persistent_changes() {
                continue;
            }
            by_provider
                .entry(container.class().storage_provider_id())
                .or_default()
                .push(container);
        }

        let mut timestamps = HashMap::new();
        for (provider_id, containers) in by_provider {
            let provider = self.providers.get(provider_id)?;
            let ordered = order_for_save(&containers);
            provider.save(&ordered)?;

            let saved: Vec<ObjectId> = ordered
                .iter()
                .filter(|c| !c.is_deleted())
                .map(|c| c.id().clone())
                .collect();
            timestamps.extend(provider.refresh_timestamps(&saved)?);
            tracing::debug!(provider = provider_id, count = ordered.len(), "saved containers");
        }
        Ok(timestamps)
    }

    fn enlisted_object(&self, _id: &ObjectId) -> Option<DomainObject> {
        None
    }
}
