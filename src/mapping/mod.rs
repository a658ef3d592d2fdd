//! Mapping metadata: classes, properties and relations known to a transaction.
//!
//! A [`MappingConfiguration`] is built once through [`MappingBuilder`] and shared as
//! `Arc<MappingConfiguration>` by every transaction that uses it.

mod builder;
mod class;
mod property;
mod relation;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

pub use builder::{
    ClassBuilder, MappingBuilder, PropertyBuilder, RelationBuilder, DEFAULT_STORAGE_PROVIDER,
};
pub use class::ClassDefinition;
pub use property::{PropertyDefinition, PropertyType, StorageClass};
pub use relation::{Cardinality, RelationDefinition, RelationEndPointDefinition};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("unknown class '{0}'")]
    UnknownClass(String),
    #[error("class '{class}' has no property '{property}'")]
    UnknownProperty { class: String, property: String },
    #[error("unknown relation '{0}'")]
    UnknownRelation(String),
    #[error("class '{0}' is defined more than once")]
    DuplicateClass(String),
    #[error("relation '{0}' is defined more than once")]
    DuplicateRelation(String),
    #[error("property '{property}' is defined more than once in the hierarchy of class '{class}'")]
    DuplicateProperty { class: String, property: String },
    #[error("inheritance cycle detected at class '{0}'")]
    InheritanceCycle(String),
    #[error("property '{property}' expects a {expected} value, got {actual}")]
    InvalidType {
        property: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("property '{0}' does not allow null values")]
    NotNullable(String),
    #[error("value of property '{property}' has length {actual}, the maximum is {max}")]
    ValueTooLong {
        property: String,
        max: usize,
        actual: usize,
    },
    #[error("property '{property}' of class '{class}' is a relation end-point, use the relation API")]
    RelationProperty { class: String, property: String },
    #[error("property '{property}' of class '{class}' is not a relation end-point")]
    NotRelationProperty { class: String, property: String },
    #[error("end-point '{class}.{property}' is {actual}, expected {expected}")]
    CardinalityMismatch {
        class: String,
        property: String,
        expected: Cardinality,
        actual: Cardinality,
    },
    #[error("class '{0}' is abstract and cannot be instantiated")]
    AbstractClass(String),
}

/// Immutable, validated set of class and relation definitions.
#[derive(Debug)]
pub struct MappingConfiguration {
    classes: HashMap<String, Arc<ClassDefinition>>,
    relations: HashMap<String, Arc<RelationDefinition>>,
}

impl MappingConfiguration {
    pub(crate) fn new(
        classes: HashMap<String, Arc<ClassDefinition>>,
        relations: HashMap<String, Arc<RelationDefinition>>,
    ) -> Self {
        MappingConfiguration { classes, relations }
    }

    pub fn builder() -> MappingBuilder {
        MappingBuilder::new()
    }

    pub fn class(&self, class_id: &str) -> Result<&Arc<ClassDefinition>, MappingError> {
        self.classes
            .get(class_id)
            .ok_or_else(|| MappingError::UnknownClass(class_id.to_string()))
    }

    pub fn classes(&self) -> impl Iterator<Item = &Arc<ClassDefinition>> {
        self.classes.values()
    }

    pub fn relation(&self, relation_id: &str) -> Result<&Arc<RelationDefinition>, MappingError> {
        self.relations
            .get(relation_id)
            .ok_or_else(|| MappingError::UnknownRelation(relation_id.to_string()))
    }

    pub fn relations(&self) -> impl Iterator<Item = &Arc<RelationDefinition>> {
        self.relations.values()
    }

    pub fn opposite_end_point(
        &self,
        end_point: &RelationEndPointDefinition,
    ) -> Result<&Arc<RelationEndPointDefinition>, MappingError> {
        self.relation(end_point.relation_id())?
            .opposite(end_point)
            .ok_or_else(|| MappingError::NotRelationProperty {
                class: end_point.class_id().to_string(),
                property: end_point.property_name().to_string(),
            })
    }

    pub fn is_same_or_derived_from(
        &self,
        class_id: &str,
        base_class_id: &str,
    ) -> Result<bool, MappingError> {
        Ok(self.class(class_id)?.is_same_or_derived_from(base_class_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_end_point_resolves_through_relation() {
        let mapping = MappingBuilder::new()
            .class(ClassBuilder::new("Order"))
            .class(ClassBuilder::new("OrderTicket"))
            .relation(RelationBuilder::one_to_one(
                "OrderTicketToOrder",
                ("OrderTicket", "Order"),
                ("Order", "OrderTicket"),
            ))
            .build()
            .unwrap();

        let order = mapping.class("Order").unwrap();
        let virtual_side = order.end_point("OrderTicket").unwrap();
        let opposite = mapping.opposite_end_point(virtual_side).unwrap();

        assert_eq!(opposite.class_id(), "OrderTicket");
        assert_eq!(opposite.property_name(), "Order");
        assert!(!opposite.is_virtual());
        assert!(!virtual_side.is_many());
    }

    #[test]
    fn unknown_lookups() {
        let mapping = MappingBuilder::new()
            .class(ClassBuilder::new("Order"))
            .build()
            .unwrap();

        assert_eq!(
            mapping.class("Nope").unwrap_err(),
            MappingError::UnknownClass("Nope".into())
        );
        assert!(matches!(
            mapping.class("Order").unwrap().property("Nope"),
            Err(MappingError::UnknownProperty { .. })
        ));
    }
}
