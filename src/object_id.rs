use std::fmt;

use serde::{Deserialize, Serialize};

/// Primary key value of a persistent object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(value) => write!(f, "{}", value),
            KeyValue::Text(value) => write!(f, "{}", value),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        KeyValue::Int(value)
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        KeyValue::Text(value.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        KeyValue::Text(value)
    }
}

/// Identity of a persistent object: the class it was created as plus its key.
///
/// Used as the key of every identity map in a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    class_id: String,
    value: KeyValue,
}

impl ObjectId {
    pub fn new(class_id: impl Into<String>, value: impl Into<KeyValue>) -> Self {
        ObjectId {
            class_id: class_id.into(),
            value: value.into(),
        }
    }

    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    pub fn value(&self) -> &KeyValue {
        &self.value
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.class_id, self.value)
    }
}
