use std::fmt;
use std::sync::Arc;

/// How many objects an end-point refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::One => write!(f, "a single-object end-point"),
            Cardinality::Many => write!(f, "a collection end-point"),
        }
    }
}

/// One named side of a bidirectional relation.
///
/// The real side owns the foreign key column; the virtual side is derived from the
/// foreign keys that point at its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationEndPointDefinition {
    relation_id: String,
    class_id: String,
    property_name: String,
    cardinality: Cardinality,
    is_virtual: bool,
    mandatory: bool,
}

impl RelationEndPointDefinition {
    pub(crate) fn new(
        relation_id: String,
        class_id: String,
        property_name: String,
        cardinality: Cardinality,
        is_virtual: bool,
        mandatory: bool,
    ) -> Self {
        RelationEndPointDefinition {
            relation_id,
            class_id,
            property_name,
            cardinality,
            is_virtual,
            mandatory,
        }
    }

    pub fn relation_id(&self) -> &str {
        &self.relation_id
    }

    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    pub fn property_name(&self) -> &str {
        &self.property_name
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::Many
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    fn same_end_point(&self, other: &RelationEndPointDefinition) -> bool {
        self.class_id == other.class_id && self.property_name == other.property_name
    }
}

/// A bidirectional relation: exactly two end-points, one real and one virtual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDefinition {
    id: String,
    real: Arc<RelationEndPointDefinition>,
    virtual_side: Arc<RelationEndPointDefinition>,
}

impl RelationDefinition {
    pub(crate) fn new(
        id: String,
        real: Arc<RelationEndPointDefinition>,
        virtual_side: Arc<RelationEndPointDefinition>,
    ) -> Self {
        RelationDefinition {
            id,
            real,
            virtual_side,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn real_end_point(&self) -> &Arc<RelationEndPointDefinition> {
        &self.real
    }

    pub fn virtual_end_point(&self) -> &Arc<RelationEndPointDefinition> {
        &self.virtual_side
    }

    pub fn is_one_to_many(&self) -> bool {
        self.virtual_side.is_many()
    }

    /// The end-point on the other side of `end_point`, or `None` if it is not part of this relation.
    pub fn opposite(
        &self,
        end_point: &RelationEndPointDefinition,
    ) -> Option<&Arc<RelationEndPointDefinition>> {
        if self.real.same_end_point(end_point) {
            Some(&self.virtual_side)
        } else if self.virtual_side.same_end_point(end_point) {
            Some(&self.real)
        } else {
            None
        }
    }
}
