use std::sync::Arc;

use crate::data::{DataContainer, PropertyValue};
use crate::mapping::{MappingError, RelationEndPointDefinition};
use crate::object_id::ObjectId;

use super::RelationEndPointId;

/// The foreign-key side of a relation, read straight from the owning container.
#[derive(Debug, Clone, Copy)]
pub struct RealObjectEndPoint<'a> {
    definition: &'a Arc<RelationEndPointDefinition>,
    container: &'a DataContainer,
    foreign_key: &'a PropertyValue,
}

impl<'a> RealObjectEndPoint<'a> {
    pub fn new(
        container: &'a DataContainer,
        definition: &'a Arc<RelationEndPointDefinition>,
    ) -> Result<Self, MappingError> {
        let foreign_key = container.property_value(definition.property_name())?;
        Ok(RealObjectEndPoint {
            definition,
            container,
            foreign_key,
        })
    }

    pub fn id(&self) -> RelationEndPointId {
        RelationEndPointId::new(self.container.id().clone(), self.definition.property_name())
    }

    pub fn definition(&self) -> &'a Arc<RelationEndPointDefinition> {
        self.definition
    }

    pub fn opposite(&self) -> Option<&'a ObjectId> {
        self.foreign_key.value().as_object_id()
    }

    pub fn original_opposite(&self) -> Option<&'a ObjectId> {
        self.foreign_key.original_value().as_object_id()
    }

    pub fn has_changed(&self) -> bool {
        self.foreign_key.has_changed()
    }

    pub fn has_been_touched(&self) -> bool {
        self.foreign_key.has_been_touched()
    }
}
