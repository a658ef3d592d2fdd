//! Domain object handles and typed property access.
//!
//! A [`DomainObject`] is only an id and a class. Its state lives in the DataManager of
//! every transaction it is enlisted in, so every read or write takes the transaction.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::collection::{AssociatedCollection, DomainObjectCollection, Identified};
use crate::data::StateType;
use crate::error::Result;
use crate::mapping::{ClassDefinition, MappingError};
use crate::object_id::ObjectId;
use crate::transaction::ClientTransaction;
use crate::value::{Value, ValueTypeError};

struct Inner {
    id: ObjectId,
    class: Arc<ClassDefinition>,
}

/// Shared handle of one domain object. Two handles are equal only if they are the same
/// handle; separate root transactions hand out separate handles for the same id.
#[derive(Clone)]
pub struct DomainObject(Arc<Inner>);

impl DomainObject {
    pub(crate) fn new(id: ObjectId, class: Arc<ClassDefinition>) -> Self {
        DomainObject(Arc::new(Inner { id, class }))
    }

    pub fn id(&self) -> &ObjectId {
        &self.0.id
    }

    pub fn class(&self) -> &Arc<ClassDefinition> {
        &self.0.class
    }

    pub fn class_id(&self) -> &str {
        self.0.class.id()
    }

    pub fn ptr_eq(&self, other: &DomainObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn get<T>(&self, tx: &mut ClientTransaction<'_>, property: &str) -> Result<T>
    where
        T: TryFrom<Value, Error = ValueTypeError>,
    {
        convert(property, tx.get_value(self, property)?)
    }

    pub fn set(&self, tx: &mut ClientTransaction<'_>, property: &str, value: impl Into<Value>) -> Result<()> {
        tx.set_value(self, property, value)
    }

    pub fn related(&self, tx: &mut ClientTransaction<'_>, property: &str) -> Result<Option<DomainObject>> {
        tx.get_related_object(self, property)
    }

    pub fn set_related(
        &self,
        tx: &mut ClientTransaction<'_>,
        property: &str,
        related: Option<&DomainObject>,
    ) -> Result<()> {
        tx.set_related_object(self, property, related)
    }

    pub fn state(&self, tx: &mut ClientTransaction<'_>) -> Result<StateType> {
        tx.state(self)
    }

    pub fn delete(&self, tx: &mut ClientTransaction<'_>) -> Result<()> {
        tx.delete(self)
    }

    pub fn property<'t, 'p>(
        &self,
        tx: &'t mut ClientTransaction<'p>,
        name: &str,
    ) -> Result<PropertyAccessor<'t, 'p>> {
        PropertyAccessor::new(tx, self.clone(), name)
    }
}

impl PartialEq for DomainObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for DomainObject {}

impl Hash for DomainObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl Identified for DomainObject {
    fn object_id(&self) -> &ObjectId {
        self.id()
    }
}

impl fmt::Debug for DomainObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DomainObject({})", self.0.id)
    }
}

impl fmt::Display for DomainObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.id, f)
    }
}

fn convert<T>(property: &str, value: Value) -> Result<T>
where
    T: TryFrom<Value, Error = ValueTypeError>,
{
    T::try_from(value).map_err(|err| {
        MappingError::InvalidType {
            property: property.to_string(),
            expected: err.expected,
            actual: err.actual,
        }
        .into()
    })
}

/// What a property name resolves to on a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Value,
    RelatedObject,
    RelatedObjects,
}

/// One property of one object in one transaction, resolved once.
pub struct PropertyAccessor<'t, 'p> {
    transaction: &'t mut ClientTransaction<'p>,
    object: DomainObject,
    name: String,
    kind: PropertyKind,
}

impl<'t, 'p> PropertyAccessor<'t, 'p> {
    pub(crate) fn new(transaction: &'t mut ClientTransaction<'p>, object: DomainObject, name: &str) -> Result<Self> {
        let class = object.class();
        let kind = match class.find_end_point(name) {
            Some(end_point) if end_point.is_many() => PropertyKind::RelatedObjects,
            Some(_) => PropertyKind::RelatedObject,
            None => {
                class.property(name)?;
                PropertyKind::Value
            }
        };
        Ok(PropertyAccessor {
            transaction,
            object,
            name: name.to_string(),
            kind,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn object(&self) -> &DomainObject {
        &self.object
    }

    pub fn get_value(&mut self) -> Result<Value> {
        self.transaction.get_value(&self.object, &self.name)
    }

    pub fn get_original_value(&mut self) -> Result<Value> {
        self.transaction.get_original_value(&self.object, &self.name)
    }

    /// The current value converted to `T`.
    pub fn get<T>(&mut self) -> Result<T>
    where
        T: TryFrom<Value, Error = ValueTypeError>,
    {
        let value = self.get_value()?;
        convert(&self.name, value)
    }

    /// `None` for null, otherwise the value converted to `T`.
    pub fn get_optional<T>(&mut self) -> Result<Option<T>>
    where
        T: TryFrom<Value, Error = ValueTypeError>,
    {
        match self.get_value()? {
            Value::Null => Ok(None),
            value => convert(&self.name, value).map(Some),
        }
    }

    pub fn set_value(&mut self, value: impl Into<Value>) -> Result<()> {
        self.transaction.set_value(&self.object, &self.name, value)
    }

    pub fn get_related_object(&mut self) -> Result<Option<DomainObject>> {
        self.transaction.get_related_object(&self.object, &self.name)
    }

    pub fn get_original_related_object(&mut self) -> Result<Option<DomainObject>> {
        self.transaction
            .get_original_related_object(&self.object, &self.name)
    }

    pub fn set_related_object(&mut self, related: Option<&DomainObject>) -> Result<()> {
        self.transaction
            .set_related_object(&self.object, &self.name, related)
    }

    pub fn get_related_objects(&mut self) -> Result<DomainObjectCollection> {
        self.transaction.get_related_objects(&self.object, &self.name)
    }

    pub fn get_original_related_objects(&mut self) -> Result<DomainObjectCollection> {
        self.transaction
            .get_original_related_objects(&self.object, &self.name)
    }

    pub fn related_objects_mut(&mut self) -> Result<AssociatedCollection<'_, 'p>> {
        self.transaction.related_objects_mut(&self.object, &self.name)
    }

    pub fn has_changed(&mut self) -> Result<bool> {
        self.transaction.property_has_changed(&self.object, &self.name)
    }

    pub fn has_been_touched(&mut self) -> Result<bool> {
        self.transaction
            .property_has_been_touched(&self.object, &self.name)
    }
}
