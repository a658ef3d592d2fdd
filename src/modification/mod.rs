//! Bidirectional relation modifications.
//!
//! A modification is built as a list of [`RelationStep`]s covering every end-point it
//! touches, then announced, performed and announced again as one unit.

mod builder;
mod command;

pub(crate) use builder::{clear, delete, insert, remove, replace, set_object};
pub use command::{ApprovedCommand, PerformedCommand, RelationCommand, RelationStep};
