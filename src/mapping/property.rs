use std::fmt;

use crate::value::Value;

use super::MappingError;

/// Whether a property is written to storage or only tracked inside transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Persistent,
    /// Participates in change tracking and notifications but is never saved.
    Transaction,
}

/// Declared semantic type of a property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyType {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    /// Foreign key of a relation; holds the id of an object of `class_id` (or a derived class).
    ObjectId { class_id: String },
}

impl PropertyType {
    pub fn name(&self) -> &'static str {
        match self {
            PropertyType::Bool => "bool",
            PropertyType::Int => "int",
            PropertyType::Float => "float",
            PropertyType::Text => "text",
            PropertyType::Bytes => "bytes",
            PropertyType::ObjectId { .. } => "object id",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (PropertyType::Bool, Value::Bool(_))
                | (PropertyType::Int, Value::Int(_))
                | (PropertyType::Float, Value::Float(_))
                | (PropertyType::Text, Value::Text(_))
                | (PropertyType::Bytes, Value::Bytes(_))
                | (PropertyType::ObjectId { .. }, Value::ObjectId(_))
        )
    }

    fn default_value(&self) -> Value {
        match self {
            PropertyType::Bool => Value::Bool(false),
            PropertyType::Int => Value::Int(0),
            PropertyType::Float => Value::Float(0.0),
            PropertyType::Text => Value::Text(String::new()),
            PropertyType::Bytes => Value::Bytes(Vec::new()),
            PropertyType::ObjectId { .. } => Value::Null,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyType::ObjectId { class_id } => write!(f, "object id of {}", class_id),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Run-time description of one persistent (or transaction-local) property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDefinition {
    name: String,
    class_id: String,
    property_type: PropertyType,
    nullable: bool,
    max_length: Option<usize>,
    storage_class: StorageClass,
}

impl PropertyDefinition {
    pub(crate) fn new(
        name: String,
        class_id: String,
        property_type: PropertyType,
        nullable: bool,
        max_length: Option<usize>,
        storage_class: StorageClass,
    ) -> Self {
        PropertyDefinition {
            name,
            class_id,
            property_type,
            nullable,
            max_length,
            storage_class,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The class that declares this property (a base class for inherited properties).
    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    pub fn property_type(&self) -> &PropertyType {
        &self.property_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn max_length(&self) -> Option<usize> {
        self.max_length
    }

    pub fn storage_class(&self) -> StorageClass {
        self.storage_class
    }

    pub fn is_persistent(&self) -> bool {
        self.storage_class == StorageClass::Persistent
    }

    /// True for the foreign-key property backing a real relation end-point.
    pub fn is_relation(&self) -> bool {
        matches!(self.property_type, PropertyType::ObjectId { .. })
    }

    pub fn default_value(&self) -> Value {
        if self.nullable {
            Value::Null
        } else {
            self.property_type.default_value()
        }
    }

    /// Checks type, nullability and maximum length of a value about to be assigned.
    pub fn validate(&self, value: &Value) -> Result<(), MappingError> {
        if value.is_null() {
            return if self.nullable {
                Ok(())
            } else {
                Err(MappingError::NotNullable(self.name.clone()))
            };
        }

        if !self.property_type.accepts(value) {
            return Err(MappingError::InvalidType {
                property: self.name.clone(),
                expected: self.property_type.name(),
                actual: value.type_name(),
            });
        }

        if let Some(max) = self.max_length {
            let actual = match value {
                Value::Text(text) => text.chars().count(),
                Value::Bytes(bytes) => bytes.len(),
                _ => 0,
            };
            if actual > max {
                return Err(MappingError::ValueTooLong {
                    property: self.name.clone(),
                    max,
                    actual,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(nullable: bool, max_length: Option<usize>) -> PropertyDefinition {
        PropertyDefinition::new(
            "Name".into(),
            "Customer".into(),
            PropertyType::Text,
            nullable,
            max_length,
            StorageClass::Persistent,
        )
    }

    #[test]
    fn default_values() {
        assert_eq!(text(false, None).default_value(), Value::Text(String::new()));
        assert_eq!(text(true, None).default_value(), Value::Null);
    }

    #[test]
    fn validate_type() {
        let err = text(false, None).validate(&Value::Int(1)).unwrap_err();
        assert_eq!(
            err,
            MappingError::InvalidType {
                property: "Name".into(),
                expected: "text",
                actual: "int",
            }
        );
    }

    #[test]
    fn validate_nullability() {
        assert!(text(true, None).validate(&Value::Null).is_ok());
        assert_eq!(
            text(false, None).validate(&Value::Null).unwrap_err(),
            MappingError::NotNullable("Name".into())
        );
    }

    #[test]
    fn validate_max_length_counts_characters() {
        let definition = text(false, Some(3));
        assert!(definition.validate(&Value::from("äöü")).is_ok());
        assert!(matches!(
            definition.validate(&Value::from("abcd")),
            Err(MappingError::ValueTooLong { max: 3, actual: 4, .. })
        ));
    }
}
