//! Save ordering within one storage provider.
//!
//! Inserts go out referenced-first so a foreign key never points at a row that does not
//! exist yet; deletes go out referencing-first for the same reason. Updates sit in between.

use std::collections::{HashMap, HashSet};

use crate::data::{DataContainer, StateType};
use crate::error::{Error, Result};
use crate::object_id::ObjectId;

pub fn order_for_save<'a>(containers: &[&'a DataContainer]) -> Vec<&'a DataContainer> {
    let by_state = |state: StateType| -> Vec<&'a DataContainer> {
        containers
            .iter()
            .copied()
            .filter(|c| c.state() == state)
            .collect()
    };

    let mut ordered = Vec::with_capacity(containers.len());
    ordered.extend(dependencies_first(&by_state(StateType::New), &|c| {
        c.foreign_keys().map(|(_, id)| id.clone()).collect()
    }));
    ordered.extend(by_state(StateType::Changed));

    let mut deletes = dependencies_first(&by_state(StateType::Deleted), &|c| {
        c.original_foreign_keys().map(|(_, id)| id.clone()).collect()
    });
    deletes.reverse();
    ordered.extend(deletes);
    ordered
}

/// Fails if a surviving container still points at an object deleted by the same commit.
pub fn check_dangling_references(containers: &[&DataContainer]) -> Result<()> {
    let deleted: HashSet<&ObjectId> = containers
        .iter()
        .filter(|c| c.is_deleted())
        .map(|c| c.id())
        .collect();
    if deleted.is_empty() {
        return Ok(());
    }

    for container in containers.iter().filter(|c| !c.is_deleted()) {
        if let Some((_, target)) = container.foreign_keys().find(|(_, id)| deleted.contains(id)) {
            return Err(Error::DanglingReference {
                from: container.id().clone(),
                to: target.clone(),
            });
        }
    }
    Ok(())
}

type References<'f> = &'f dyn Fn(&DataContainer) -> Vec<ObjectId>;

fn dependencies_first<'a>(
    containers: &[&'a DataContainer],
    references: References<'_>,
) -> Vec<&'a DataContainer> {
    let by_id: HashMap<&ObjectId, &'a DataContainer> =
        containers.iter().map(|c| (c.id(), *c)).collect();
    let mut visited = HashSet::new();
    let mut ordered = Vec::with_capacity(containers.len());
    for container in containers {
        visit(container, &by_id, references, &mut visited, &mut ordered);
    }
    ordered
}

fn visit<'a>(
    container: &'a DataContainer,
    by_id: &HashMap<&ObjectId, &'a DataContainer>,
    references: References<'_>,
    visited: &mut HashSet<ObjectId>,
    ordered: &mut Vec<&'a DataContainer>,
) {
    if !visited.insert(container.id().clone()) {
        return;
    }
    for id in references(container) {
        if let Some(dependency) = by_id.get(&id) {
            visit(dependency, by_id, references, visited, ordered);
        }
    }
    ordered.push(container);
}
