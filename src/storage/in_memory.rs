//! InMemoryStorageProvider - BTreeMap-backed storage for tests and development.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::data::{DataContainer, StateType};
use crate::mapping::{ClassDefinition, MappingConfiguration, RelationEndPointDefinition};
use crate::object_id::{KeyValue, ObjectId};
use crate::value::Value;

use super::{StorageError, StorageProvider, Timestamp};

/// Internal stored representation of one row.
struct StoredRow {
    class_id: String,
    timestamp: u64,
    /// bitcode-encoded `BTreeMap<String, Value>` of the persistent properties.
    bytes: Vec<u8>,
}

/// In-memory storage provider.
///
/// Rows are keyed by object id and carry a timestamp that is bumped on every update.
/// Clone-friendly via Arc: clones share the same rows.
#[derive(Clone)]
pub struct InMemoryStorageProvider {
    id: String,
    rows: Arc<RwLock<BTreeMap<ObjectId, StoredRow>>>,
    next_key: Arc<AtomicI64>,
    loads: Arc<AtomicUsize>,
    fail_next_save: Arc<Mutex<Option<String>>>,
}

impl InMemoryStorageProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rows: Arc::new(RwLock::new(BTreeMap::new())),
            next_key: Arc::new(AtomicI64::new(1)),
            loads: Arc::new(AtomicUsize::new(0)),
            fail_next_save: Arc::new(Mutex::new(None)),
        }
    }

    /// Seed a row directly, bypassing transactions. Returns the row's timestamp.
    pub fn insert_row<I, K>(&self, id: ObjectId, values: I) -> Result<Timestamp, StorageError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let values: BTreeMap<String, Value> =
            values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let bytes = bitcode::serialize(&values)?;

        if let KeyValue::Int(key) = id.value() {
            self.next_key.fetch_max(key + 1, Ordering::SeqCst);
        }

        let mut rows = self
            .rows
            .write()
            .map_err(|_| StorageError::LockPoisoned("in-memory storage rows"))?;
        let timestamp = rows.get(&id).map(|row| row.timestamp + 1).unwrap_or(1);
        rows.insert(
            id.clone(),
            StoredRow {
                class_id: id.class_id().to_string(),
                timestamp,
                bytes,
            },
        );
        Ok(Timestamp(timestamp))
    }

    /// The stored values of a row, or `None` if it does not exist.
    pub fn row_values(&self, id: &ObjectId) -> Result<Option<BTreeMap<String, Value>>, StorageError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StorageError::LockPoisoned("in-memory storage rows"))?;
        rows.get(id).map(|row| decode(&row.bytes)).transpose()
    }

    pub fn row_value(&self, id: &ObjectId, property: &str) -> Result<Option<Value>, StorageError> {
        Ok(self
            .row_values(id)?
            .and_then(|mut values| values.remove(property)))
    }

    pub fn timestamp(&self, id: &ObjectId) -> Result<Option<Timestamp>, StorageError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StorageError::LockPoisoned("in-memory storage rows"))?;
        Ok(rows.get(id).map(|row| Timestamp(row.timestamp)))
    }

    pub fn contains(&self, id: &ObjectId) -> Result<bool, StorageError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StorageError::LockPoisoned("in-memory storage rows"))?;
        Ok(rows.contains_key(id))
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StorageError::LockPoisoned("in-memory storage rows"))?;
        Ok(rows.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Number of load calls served so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Makes the next `save` fail with a provider error before anything is written.
    pub fn fail_next_save(&self, message: impl Into<String>) -> Result<(), StorageError> {
        let mut slot = self
            .fail_next_save
            .lock()
            .map_err(|_| StorageError::LockPoisoned("in-memory storage failure flag"))?;
        *slot = Some(message.into());
        Ok(())
    }

    fn container_from_row(
        mapping: &MappingConfiguration,
        id: &ObjectId,
        row: &StoredRow,
    ) -> Result<DataContainer, StorageError> {
        let class = mapping.class(&row.class_id)?;
        let values = decode(&row.bytes)?;
        Ok(DataContainer::existing(
            id.clone(),
            class.clone(),
            Some(Timestamp(row.timestamp)),
            values,
        )?)
    }
}

fn decode(bytes: &[u8]) -> Result<BTreeMap<String, Value>, StorageError> {
    Ok(bitcode::deserialize(bytes)?)
}

impl StorageProvider for InMemoryStorageProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn new_object_id(&self, class: &ClassDefinition) -> Result<ObjectId, StorageError> {
        let key = self.next_key.fetch_add(1, Ordering::SeqCst);
        Ok(ObjectId::new(class.id(), key))
    }

    fn load_data_container(
        &self,
        mapping: &MappingConfiguration,
        id: &ObjectId,
    ) -> Result<Option<DataContainer>, StorageError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let rows = self
            .rows
            .read()
            .map_err(|_| StorageError::LockPoisoned("in-memory storage rows"))?;

        tracing::trace!(provider = %self.id, %id, "loading data container");
        rows.get(id)
            .map(|row| Self::container_from_row(mapping, id, row))
            .transpose()
    }

    fn load_data_containers(
        &self,
        mapping: &MappingConfiguration,
        ids: &[ObjectId],
    ) -> Result<Vec<Option<DataContainer>>, StorageError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let rows = self
            .rows
            .read()
            .map_err(|_| StorageError::LockPoisoned("in-memory storage rows"))?;

        tracing::trace!(provider = %self.id, count = ids.len(), "loading data containers");
        ids.iter()
            .map(|id| {
                rows.get(id)
                    .map(|row| Self::container_from_row(mapping, id, row))
                    .transpose()
            })
            .collect()
    }

    fn load_related_data_containers(
        &self,
        mapping: &MappingConfiguration,
        end_point: &RelationEndPointDefinition,
        related_id: &ObjectId,
    ) -> Result<Vec<DataContainer>, StorageError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let rows = self
            .rows
            .read()
            .map_err(|_| StorageError::LockPoisoned("in-memory storage rows"))?;

        let mut related = Vec::new();
        for (id, row) in rows.iter() {
            let class = mapping.class(&row.class_id)?;
            if !class.is_same_or_derived_from(end_point.class_id()) {
                continue;
            }
            let values = decode(&row.bytes)?;
            if values.get(end_point.property_name()).and_then(Value::as_object_id) != Some(related_id) {
                continue;
            }
            related.push(DataContainer::existing(
                id.clone(),
                class.clone(),
                Some(Timestamp(row.timestamp)),
                values,
            )?);
        }

        tracing::trace!(
            provider = %self.id,
            end_point = end_point.property_name(),
            %related_id,
            count = related.len(),
            "loaded related data containers"
        );
        Ok(related)
    }

    fn save(&self, containers: &[&DataContainer]) -> Result<(), StorageError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StorageError::LockPoisoned("in-memory storage rows"))?;

        if let Some(message) = self
            .fail_next_save
            .lock()
            .map_err(|_| StorageError::LockPoisoned("in-memory storage failure flag"))?
            .take()
        {
            return Err(StorageError::Provider(message));
        }

        // Validate the whole batch before writing anything.
        let mut conflicts = Vec::new();
        for container in containers {
            let stored = rows.get(container.id()).map(|row| Timestamp(row.timestamp));
            let consistent = match container.state() {
                StateType::New => stored.is_none(),
                StateType::Changed | StateType::Deleted => {
                    stored.is_some() && stored == container.timestamp()
                }
                StateType::Unchanged | StateType::Discarded => true,
            };
            if !consistent {
                conflicts.push(container.id().clone());
            }
        }
        if !conflicts.is_empty() {
            tracing::warn!(provider = %self.id, ?conflicts, "concurrency violation");
            return Err(StorageError::ConcurrencyViolation { ids: conflicts });
        }

        for container in containers {
            let id = container.id();
            match container.state() {
                StateType::New | StateType::Changed => {
                    let bytes = bitcode::serialize(&container.persistent_values())?;
                    let timestamp = rows.get(id).map(|row| row.timestamp + 1).unwrap_or(1);
                    rows.insert(
                        id.clone(),
                        StoredRow {
                            class_id: container.class().id().to_string(),
                            timestamp,
                            bytes,
                        },
                    );
                }
                StateType::Deleted => {
                    rows.remove(id);
                }
                StateType::Unchanged | StateType::Discarded => {}
            }
        }

        tracing::debug!(provider = %self.id, count = containers.len(), "saved data containers");
        Ok(())
    }

    fn refresh_timestamps(&self, ids: &[ObjectId]) -> Result<Vec<(ObjectId, Timestamp)>, StorageError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StorageError::LockPoisoned("in-memory storage rows"))?;
        Ok(ids
            .iter()
            .filter_map(|id| rows.get(id).map(|row| (id.clone(), Timestamp(row.timestamp))))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{ClassBuilder, MappingBuilder, PropertyBuilder, RelationBuilder};
    use std::sync::Arc;

    fn mapping() -> Arc<MappingConfiguration> {
        MappingBuilder::new()
            .class(ClassBuilder::new("Customer").property(PropertyBuilder::text("Name")))
            .class(ClassBuilder::new("Order").property(PropertyBuilder::int("OrderNumber")))
            .relation(RelationBuilder::one_to_many(
                "OrderToCustomer",
                ("Order", "Customer"),
                ("Customer", "Orders"),
            ))
            .build()
            .unwrap()
    }

    fn seeded() -> InMemoryStorageProvider {
        let provider = InMemoryStorageProvider::new("default");
        provider
            .insert_row(ObjectId::new("Customer", 1), [("Name", Value::from("Acme"))])
            .unwrap();
        provider
            .insert_row(
                ObjectId::new("Order", 2),
                [
                    ("OrderNumber", Value::Int(10)),
                    ("Customer", Value::ObjectId(ObjectId::new("Customer", 1))),
                ],
            )
            .unwrap();
        provider
            .insert_row(ObjectId::new("Order", 3), [("OrderNumber", Value::Int(11))])
            .unwrap();
        provider
    }

    #[test]
    fn load_roundtrip() {
        let mapping = mapping();
        let provider = seeded();

        let container = provider
            .load_data_container(&mapping, &ObjectId::new("Order", 2))
            .unwrap()
            .unwrap();
        assert_eq!(container.value("OrderNumber").unwrap(), &Value::Int(10));
        assert_eq!(container.timestamp(), Some(Timestamp(1)));
        assert_eq!(container.state(), StateType::Unchanged);

        let missing = provider
            .load_data_container(&mapping, &ObjectId::new("Order", 99))
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn load_many_preserves_order_with_gaps() {
        let mapping = mapping();
        let provider = seeded();
        let loaded = provider
            .load_data_containers(
                &mapping,
                &[
                    ObjectId::new("Order", 3),
                    ObjectId::new("Order", 42),
                    ObjectId::new("Customer", 1),
                ],
            )
            .unwrap();

        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].as_ref().unwrap().id(), &ObjectId::new("Order", 3));
        assert!(loaded[1].is_none());
        assert_eq!(loaded[2].as_ref().unwrap().id(), &ObjectId::new("Customer", 1));
    }

    #[test]
    fn load_related_filters_by_foreign_key() {
        let mapping = mapping();
        let provider = seeded();
        let end_point = mapping.class("Order").unwrap().end_point("Customer").unwrap().clone();

        let related = provider
            .load_related_data_containers(&mapping, &end_point, &ObjectId::new("Customer", 1))
            .unwrap();
        let ids: Vec<_> = related.iter().map(|c| c.id().clone()).collect();
        assert_eq!(ids, vec![ObjectId::new("Order", 2)]);
    }

    #[test]
    fn seeding_advances_key_allocation() {
        let mapping = mapping();
        let provider = seeded();
        let id = provider
            .new_object_id(mapping.class("Order").unwrap())
            .unwrap();
        assert_eq!(id, ObjectId::new("Order", 4));
    }

    #[test]
    fn save_rejects_stale_timestamp_without_writing() {
        let mapping = mapping();
        let provider = seeded();
        let mut first = provider
            .load_data_container(&mapping, &ObjectId::new("Order", 2))
            .unwrap()
            .unwrap();
        let mut second = first.clone();

        first.set_value("OrderNumber", Value::Int(20)).unwrap();
        provider.save(&[&first]).unwrap();
        assert_eq!(provider.timestamp(&ObjectId::new("Order", 2)).unwrap(), Some(Timestamp(2)));

        second.set_value("OrderNumber", Value::Int(30)).unwrap();
        let err = provider.save(&[&second]).unwrap_err();
        assert!(matches!(err, StorageError::ConcurrencyViolation { ref ids } if ids.len() == 1));
        assert_eq!(
            provider.row_value(&ObjectId::new("Order", 2), "OrderNumber").unwrap(),
            Some(Value::Int(20))
        );
    }

    #[test]
    fn injected_failure_applies_once() {
        let mapping = mapping();
        let provider = seeded();
        let mut container = provider
            .load_data_container(&mapping, &ObjectId::new("Order", 3))
            .unwrap()
            .unwrap();
        container.set_value("OrderNumber", Value::Int(1)).unwrap();

        provider.fail_next_save("disk full").unwrap();
        assert!(matches!(provider.save(&[&container]), Err(StorageError::Provider(_))));
        provider.save(&[&container]).unwrap();
    }
}
