use std::sync::Arc;

use crate::mapping::{ClassDefinition, MappingError, PropertyDefinition};
use crate::value::Value;

/// Current and original value of one property, plus whether it was ever assigned.
#[derive(Debug, Clone)]
pub struct PropertyValue {
    definition: Arc<PropertyDefinition>,
    value: Value,
    original_value: Value,
    touched: bool,
}

impl PropertyValue {
    pub(crate) fn new(definition: Arc<PropertyDefinition>, value: Value) -> Self {
        PropertyValue {
            definition,
            original_value: value.clone(),
            value,
            touched: false,
        }
    }

    pub fn definition(&self) -> &Arc<PropertyDefinition> {
        &self.definition
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn original_value(&self) -> &Value {
        &self.original_value
    }

    pub fn has_changed(&self) -> bool {
        self.value != self.original_value
    }

    pub fn has_been_touched(&self) -> bool {
        self.touched
    }

    pub(crate) fn set_value(&mut self, value: Value) {
        self.value = value;
        self.touched = true;
    }

    pub(crate) fn touch(&mut self) {
        self.touched = true;
    }

    pub(crate) fn commit(&mut self) {
        self.original_value = self.value.clone();
        self.touched = false;
    }

    pub(crate) fn rollback(&mut self) {
        self.value = self.original_value.clone();
        self.touched = false;
    }
}

/// The property values of one container, in class definition order.
#[derive(Debug, Clone)]
pub struct PropertyValueCollection {
    class: Arc<ClassDefinition>,
    values: Vec<PropertyValue>,
}

impl PropertyValueCollection {
    /// Every property of `class` at its default value.
    pub(crate) fn with_defaults(class: Arc<ClassDefinition>) -> Self {
        let values = class
            .properties()
            .iter()
            .map(|definition| PropertyValue::new(definition.clone(), definition.default_value()))
            .collect();
        PropertyValueCollection { class, values }
    }

    pub fn class(&self) -> &Arc<ClassDefinition> {
        &self.class
    }

    pub fn get(&self, name: &str) -> Result<&PropertyValue, MappingError> {
        let index = self.index_of(name)?;
        Ok(&self.values[index])
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Result<&mut PropertyValue, MappingError> {
        let index = self.index_of(name)?;
        Ok(&mut self.values[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyValue> {
        self.values.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut PropertyValue> {
        self.values.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn has_changed(&self) -> bool {
        self.values.iter().any(PropertyValue::has_changed)
    }

    pub fn has_been_touched(&self) -> bool {
        self.values.iter().any(PropertyValue::has_been_touched)
    }

    pub(crate) fn commit(&mut self) {
        self.values.iter_mut().for_each(PropertyValue::commit);
    }

    pub(crate) fn rollback(&mut self) {
        self.values.iter_mut().for_each(PropertyValue::rollback);
    }

    fn index_of(&self, name: &str) -> Result<usize, MappingError> {
        self.class
            .property_index(name)
            .ok_or_else(|| MappingError::UnknownProperty {
                class: self.class.id().to_string(),
                property: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{PropertyType, StorageClass};

    fn number() -> PropertyValue {
        let definition = PropertyDefinition::new(
            "OrderNumber".into(),
            "Order".into(),
            PropertyType::Int,
            false,
            None,
            StorageClass::Persistent,
        );
        PropertyValue::new(Arc::new(definition), Value::Int(1))
    }

    #[test]
    fn touch_without_change() {
        let mut value = number();
        value.set_value(Value::Int(1));

        assert!(value.has_been_touched());
        assert!(!value.has_changed());
    }

    #[test]
    fn change_then_revert_is_unchanged_but_touched() {
        let mut value = number();
        value.set_value(Value::Int(2));
        assert!(value.has_changed());

        value.set_value(Value::Int(1));
        assert!(!value.has_changed());
        assert!(value.has_been_touched());
    }

    #[test]
    fn commit_and_rollback() {
        let mut value = number();
        value.set_value(Value::Int(2));
        value.commit();
        assert_eq!(value.original_value(), &Value::Int(2));
        assert!(!value.has_been_touched());

        value.set_value(Value::Int(3));
        value.rollback();
        assert_eq!(value.value(), &Value::Int(2));
        assert!(!value.has_changed());
        assert!(!value.has_been_touched());
    }
}
