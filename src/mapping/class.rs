use std::collections::HashMap;
use std::sync::Arc;

use super::{MappingError, PropertyDefinition, RelationEndPointDefinition};

/// A mapped class with its inherited properties and relation end-points flattened in.
#[derive(Debug)]
pub struct ClassDefinition {
    id: String,
    base_class_id: Option<String>,
    storage_provider_id: String,
    is_abstract: bool,
    /// This class first, then its base chain up to the root.
    ancestors: Vec<String>,
    properties: Vec<Arc<PropertyDefinition>>,
    property_index: HashMap<String, usize>,
    end_points: Vec<Arc<RelationEndPointDefinition>>,
    end_point_index: HashMap<String, usize>,
}

impl ClassDefinition {
    pub(crate) fn new(
        id: String,
        base_class_id: Option<String>,
        storage_provider_id: String,
        is_abstract: bool,
        ancestors: Vec<String>,
        properties: Vec<Arc<PropertyDefinition>>,
        end_points: Vec<Arc<RelationEndPointDefinition>>,
    ) -> Self {
        let property_index = properties
            .iter()
            .enumerate()
            .map(|(index, p)| (p.name().to_string(), index))
            .collect();
        let end_point_index = end_points
            .iter()
            .enumerate()
            .map(|(index, e)| (e.property_name().to_string(), index))
            .collect();

        ClassDefinition {
            id,
            base_class_id,
            storage_provider_id,
            is_abstract,
            ancestors,
            properties,
            property_index,
            end_points,
            end_point_index,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn base_class_id(&self) -> Option<&str> {
        self.base_class_id.as_deref()
    }

    pub fn storage_provider_id(&self) -> &str {
        &self.storage_provider_id
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn is_same_or_derived_from(&self, class_id: &str) -> bool {
        self.ancestors.iter().any(|ancestor| ancestor == class_id)
    }

    /// Stored (persistent and transaction-only) properties, base class properties first.
    /// Includes the foreign keys of real relation end-points.
    pub fn properties(&self) -> &[Arc<PropertyDefinition>] {
        &self.properties
    }

    pub fn find_property(&self, name: &str) -> Option<&Arc<PropertyDefinition>> {
        self.property_index.get(name).map(|&index| &self.properties[index])
    }

    pub fn property(&self, name: &str) -> Result<&Arc<PropertyDefinition>, MappingError> {
        self.find_property(name)
            .ok_or_else(|| MappingError::UnknownProperty {
                class: self.id.clone(),
                property: name.to_string(),
            })
    }

    pub(crate) fn property_index(&self, name: &str) -> Option<usize> {
        self.property_index.get(name).copied()
    }

    pub fn end_points(&self) -> &[Arc<RelationEndPointDefinition>] {
        &self.end_points
    }

    pub fn find_end_point(&self, property: &str) -> Option<&Arc<RelationEndPointDefinition>> {
        self.end_point_index
            .get(property)
            .map(|&index| &self.end_points[index])
    }

    pub fn end_point(&self, property: &str) -> Result<&Arc<RelationEndPointDefinition>, MappingError> {
        self.find_end_point(property)
            .ok_or_else(|| MappingError::NotRelationProperty {
                class: self.id.clone(),
                property: property.to_string(),
            })
    }

    /// True if `name` is a value property or a relation end-point of this class.
    pub fn has_property(&self, name: &str) -> bool {
        self.property_index.contains_key(name) || self.end_point_index.contains_key(name)
    }
}
