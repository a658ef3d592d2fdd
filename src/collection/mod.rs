//! Ordered, id-unique collections of domain objects.
//!
//! [`DomainObjectCollection`] is a standalone collection with its own change events.
//! [`AssociatedCollection`] is bound to a collection end-point and routes every change
//! through the owning transaction so the opposite foreign keys follow.

mod associated;
mod data;
mod domain_object_collection;

pub use associated::AssociatedCollection;
pub use data::{Identified, OrderedIdSet};
pub use domain_object_collection::{CollectionHandler, DomainObjectCollection};
