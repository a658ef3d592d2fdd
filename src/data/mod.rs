//! Property state of loaded objects: values, containers and the per-transaction identity map.

mod container_map;
mod data_container;
mod property_value;

pub use container_map::DataContainerMap;
pub use data_container::{DataContainer, StateType};
pub use property_value::{PropertyValue, PropertyValueCollection};
