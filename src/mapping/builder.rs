//! Code-first mapping configuration.
//!
//! ```ignore
//! let mapping = MappingBuilder::new()
//!     .class(ClassBuilder::new("Customer").property(PropertyBuilder::text("Name")))
//!     .class(ClassBuilder::new("Order").property(PropertyBuilder::int("OrderNumber")))
//!     .relation(RelationBuilder::one_to_many(
//!         "OrderToCustomer",
//!         ("Order", "Customer"),
//!         ("Customer", "Orders"),
//!     ))
//!     .build()?;
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{
    Cardinality, ClassDefinition, MappingConfiguration, MappingError, PropertyDefinition,
    PropertyType, RelationDefinition, RelationEndPointDefinition, StorageClass,
};

pub const DEFAULT_STORAGE_PROVIDER: &str = "default";

#[derive(Debug, Clone)]
pub struct PropertyBuilder {
    name: String,
    property_type: PropertyType,
    nullable: bool,
    max_length: Option<usize>,
    storage_class: StorageClass,
}

impl PropertyBuilder {
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        PropertyBuilder {
            name: name.into(),
            property_type,
            nullable: false,
            max_length: None,
            storage_class: StorageClass::Persistent,
        }
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Bool)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Int)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Float)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Text)
    }

    pub fn bytes(name: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Bytes)
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Tracked inside transactions, never written to storage.
    pub fn transaction_only(mut self) -> Self {
        self.storage_class = StorageClass::Transaction;
        self
    }

    fn build(self, class_id: &str) -> PropertyDefinition {
        PropertyDefinition::new(
            self.name,
            class_id.to_string(),
            self.property_type,
            self.nullable,
            self.max_length,
            self.storage_class,
        )
    }
}

#[derive(Debug, Clone)]
pub struct ClassBuilder {
    id: String,
    base: Option<String>,
    storage_provider_id: Option<String>,
    is_abstract: bool,
    properties: Vec<PropertyBuilder>,
}

impl ClassBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        ClassBuilder {
            id: id.into(),
            base: None,
            storage_provider_id: None,
            is_abstract: false,
            properties: Vec::new(),
        }
    }

    pub fn base(mut self, base_class_id: impl Into<String>) -> Self {
        self.base = Some(base_class_id.into());
        self
    }

    /// Defaults to the base class's provider, or the builder default for root classes.
    pub fn storage_provider(mut self, storage_provider_id: impl Into<String>) -> Self {
        self.storage_provider_id = Some(storage_provider_id.into());
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn property(mut self, property: PropertyBuilder) -> Self {
        self.properties.push(property);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RelationBuilder {
    id: String,
    real: (String, String),
    virtual_side: (String, String),
    virtual_cardinality: Cardinality,
    mandatory_real: bool,
    mandatory_virtual: bool,
}

impl RelationBuilder {
    /// `real` is the (class, property) owning the foreign key; `many` is the collection side.
    pub fn one_to_many(
        id: impl Into<String>,
        real: (&str, &str),
        many: (&str, &str),
    ) -> Self {
        Self::new(id.into(), real, many, Cardinality::Many)
    }

    /// `real` is the (class, property) owning the foreign key; `other` is the virtual side.
    pub fn one_to_one(id: impl Into<String>, real: (&str, &str), other: (&str, &str)) -> Self {
        Self::new(id.into(), real, other, Cardinality::One)
    }

    fn new(
        id: String,
        real: (&str, &str),
        virtual_side: (&str, &str),
        virtual_cardinality: Cardinality,
    ) -> Self {
        RelationBuilder {
            id,
            real: (real.0.to_string(), real.1.to_string()),
            virtual_side: (virtual_side.0.to_string(), virtual_side.1.to_string()),
            virtual_cardinality,
            mandatory_real: false,
            mandatory_virtual: false,
        }
    }

    /// The foreign key must be set for the owning object to be committed.
    pub fn mandatory_real(mut self) -> Self {
        self.mandatory_real = true;
        self
    }

    /// The virtual side must be non-empty for its owner to be committed.
    pub fn mandatory_virtual(mut self) -> Self {
        self.mandatory_virtual = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct MappingBuilder {
    default_storage_provider: String,
    classes: Vec<ClassBuilder>,
    relations: Vec<RelationBuilder>,
}

impl Default for MappingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingBuilder {
    pub fn new() -> Self {
        MappingBuilder {
            default_storage_provider: DEFAULT_STORAGE_PROVIDER.to_string(),
            classes: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn default_storage_provider(mut self, storage_provider_id: impl Into<String>) -> Self {
        self.default_storage_provider = storage_provider_id.into();
        self
    }

    pub fn class(mut self, class: ClassBuilder) -> Self {
        self.classes.push(class);
        self
    }

    pub fn relation(mut self, relation: RelationBuilder) -> Self {
        self.relations.push(relation);
        self
    }

    /// Validates and freezes the configuration.
    pub fn build(self) -> Result<Arc<MappingConfiguration>, MappingError> {
        let mut declared: HashMap<String, ClassBuilder> = HashMap::new();
        let mut order = Vec::new();
        for class in self.classes {
            if declared.contains_key(&class.id) {
                return Err(MappingError::DuplicateClass(class.id));
            }
            order.push(class.id.clone());
            declared.insert(class.id.clone(), class);
        }

        // Own (non-inherited) definitions per class, shared with derived classes through Arc.
        let mut own_properties: HashMap<String, Vec<Arc<PropertyDefinition>>> = HashMap::new();
        let mut own_end_points: HashMap<String, Vec<Arc<RelationEndPointDefinition>>> =
            HashMap::new();
        for (id, class) in &declared {
            let properties = class
                .properties
                .iter()
                .cloned()
                .map(|p| Arc::new(p.build(id)))
                .collect();
            own_properties.insert(id.clone(), properties);
        }

        let mut relations = HashMap::new();
        for relation in self.relations {
            if relations.contains_key(&relation.id) {
                return Err(MappingError::DuplicateRelation(relation.id));
            }
            let (real_class, real_property) = &relation.real;
            let (virtual_class, virtual_property) = &relation.virtual_side;
            for class_id in [real_class, virtual_class] {
                if !declared.contains_key(class_id) {
                    return Err(MappingError::UnknownClass(class_id.clone()));
                }
            }

            let real = Arc::new(RelationEndPointDefinition::new(
                relation.id.clone(),
                real_class.clone(),
                real_property.clone(),
                Cardinality::One,
                false,
                relation.mandatory_real,
            ));
            let virtual_side = Arc::new(RelationEndPointDefinition::new(
                relation.id.clone(),
                virtual_class.clone(),
                virtual_property.clone(),
                relation.virtual_cardinality,
                true,
                relation.mandatory_virtual,
            ));

            let foreign_key = PropertyDefinition::new(
                real_property.clone(),
                real_class.clone(),
                PropertyType::ObjectId {
                    class_id: virtual_class.clone(),
                },
                true,
                None,
                StorageClass::Persistent,
            );
            own_properties
                .entry(real_class.clone())
                .or_default()
                .push(Arc::new(foreign_key));
            own_end_points
                .entry(real_class.clone())
                .or_default()
                .push(real.clone());
            own_end_points
                .entry(virtual_class.clone())
                .or_default()
                .push(virtual_side.clone());

            relations.insert(
                relation.id.clone(),
                Arc::new(RelationDefinition::new(relation.id, real, virtual_side)),
            );
        }

        let mut classes = HashMap::new();
        for id in &order {
            let ancestors = ancestors_of(id, &declared)?;

            let storage_provider_id = ancestors
                .iter()
                .find_map(|ancestor| {
                    declared
                        .get(ancestor)
                        .and_then(|c| c.storage_provider_id.clone())
                })
                .unwrap_or_else(|| self.default_storage_provider.clone());

            let mut properties: Vec<Arc<PropertyDefinition>> = Vec::new();
            let mut end_points: Vec<Arc<RelationEndPointDefinition>> = Vec::new();
            let mut names = HashSet::new();
            for ancestor in ancestors.iter().rev() {
                for property in own_properties.get(ancestor).into_iter().flatten() {
                    if !names.insert(property.name().to_string()) {
                        return Err(MappingError::DuplicateProperty {
                            class: id.clone(),
                            property: property.name().to_string(),
                        });
                    }
                    properties.push(property.clone());
                }
                for end_point in own_end_points.get(ancestor).into_iter().flatten() {
                    // Real end-points share their name with the foreign key property.
                    if end_point.is_virtual() && !names.insert(end_point.property_name().to_string())
                    {
                        return Err(MappingError::DuplicateProperty {
                            class: id.clone(),
                            property: end_point.property_name().to_string(),
                        });
                    }
                    end_points.push(end_point.clone());
                }
            }

            let class = &declared[id];
            classes.insert(
                id.clone(),
                Arc::new(ClassDefinition::new(
                    id.clone(),
                    class.base.clone(),
                    storage_provider_id,
                    class.is_abstract,
                    ancestors,
                    properties,
                    end_points,
                )),
            );
        }

        tracing::debug!(
            classes = classes.len(),
            relations = relations.len(),
            "mapping configuration built"
        );

        Ok(Arc::new(MappingConfiguration::new(classes, relations)))
    }
}

fn ancestors_of(
    id: &str,
    declared: &HashMap<String, ClassBuilder>,
) -> Result<Vec<String>, MappingError> {
    let mut ancestors = vec![id.to_string()];
    let mut current = id;
    while let Some(base) = declared.get(current).and_then(|c| c.base.as_deref()) {
        if !declared.contains_key(base) {
            return Err(MappingError::UnknownClass(base.to_string()));
        }
        if ancestors.iter().any(|a| a == base) {
            return Err(MappingError::InheritanceCycle(id.to_string()));
        }
        ancestors.push(base.to_string());
        current = base;
    }
    Ok(ancestors)
}
