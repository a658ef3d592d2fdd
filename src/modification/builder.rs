//! Builds the steps of a bidirectional modification.
//!
//! Each builder loads everything its command touches first, so performing the command
//! afterwards cannot fail halfway.

use crate::data_manager::{cardinality_mismatch, DataManager};
use crate::end_point::RelationEndPointId;
use crate::error::{ArgumentError, Result};
use crate::mapping::Cardinality;
use crate::object_id::ObjectId;
use crate::transaction::TransactionContext;

use super::command::{RelationCommand, RelationStep};

/// Sets the object end-point `property` of `owner` to `new`, keeping every affected
/// opposite side in sync.
pub(crate) fn set_object(
    dm: &mut DataManager,
    ctx: &mut TransactionContext<'_, '_>,
    owner: &ObjectId,
    property: &str,
    new: Option<&ObjectId>,
) -> Result<RelationCommand> {
    let definition = dm.end_point_definition(owner, property)?;
    let end_point = RelationEndPointId::new(owner.clone(), property);
    if definition.is_many() {
        return Err(cardinality_mismatch(&end_point, Cardinality::One, Cardinality::Many));
    }
    let opposite = dm.mapping().opposite_end_point(&definition)?.clone();
    if let Some(new) = new {
        dm.check_related(ctx, new, opposite.class_id())?;
    }
    let old = dm.current_opposite(ctx, &end_point)?;

    if old.as_ref() == new {
        let mut steps = vec![RelationStep::Touch {
            end_point,
            is_virtual: definition.is_virtual(),
        }];
        if let Some(new) = new {
            let new_opposite = RelationEndPointId::new(new.clone(), opposite.property_name());
            dm.ensure_end_point(ctx, &new_opposite)?;
            steps.push(RelationStep::Touch {
                end_point: new_opposite,
                is_virtual: opposite.is_virtual(),
            });
        }
        return Ok(RelationCommand::new(steps));
    }

    let mut steps = vec![RelationStep::SetObject {
        end_point,
        is_virtual: definition.is_virtual(),
        old: old.clone(),
        new: new.cloned(),
    }];

    // One-to-one: the new partner's previous partner loses it.
    let mut previous_partner = None;
    if let Some(new) = new {
        let new_opposite = RelationEndPointId::new(new.clone(), opposite.property_name());
        if opposite.is_many() {
            let index = dm.collection_items(ctx, &new_opposite)?.len();
            steps.push(RelationStep::Insert {
                end_point: new_opposite,
                item: owner.clone(),
                index,
            });
        } else {
            let previous = dm.current_opposite(ctx, &new_opposite)?;
            steps.push(RelationStep::SetObject {
                end_point: new_opposite,
                is_virtual: opposite.is_virtual(),
                old: previous.clone(),
                new: Some(owner.clone()),
            });
            previous_partner = previous;
        }
    }

    if let Some(old) = &old {
        let old_opposite = RelationEndPointId::new(old.clone(), opposite.property_name());
        dm.ensure_end_point(ctx, &old_opposite)?;
        if opposite.is_many() {
            steps.push(RelationStep::Remove {
                end_point: old_opposite,
                item: owner.clone(),
            });
        } else {
            steps.push(RelationStep::SetObject {
                end_point: old_opposite,
                is_virtual: opposite.is_virtual(),
                old: Some(owner.clone()),
                new: None,
            });
        }
    }

    if let Some(previous) = previous_partner {
        let previous_end_point = RelationEndPointId::new(previous, property);
        dm.ensure_end_point(ctx, &previous_end_point)?;
        steps.push(RelationStep::SetObject {
            end_point: previous_end_point,
            is_virtual: definition.is_virtual(),
            old: new.cloned(),
            new: None,
        });
    }

    Ok(RelationCommand::new(steps))
}

/// Inserts `item` into the collection `property` of `owner`, at the end when `index` is `None`.
/// The item leaves the collection it belonged to before.
pub(crate) fn insert(
    dm: &mut DataManager,
    ctx: &mut TransactionContext<'_, '_>,
    owner: &ObjectId,
    property: &str,
    index: Option<usize>,
    item: &ObjectId,
) -> Result<RelationCommand> {
    let (end_point, opposite_property) = collection_end_point(dm, ctx, owner, property, item)?;
    let items = dm.collection_items(ctx, &end_point)?;
    if items.contains(item) {
        return Err(ArgumentError::DuplicateItem(item.clone()).into());
    }
    let index = index.unwrap_or(items.len());
    if index > items.len() {
        return Err(ArgumentError::IndexOutOfRange {
            index,
            len: items.len(),
        }
        .into());
    }

    let item_end_point = RelationEndPointId::new(item.clone(), opposite_property);
    let previous = dm.current_opposite(ctx, &item_end_point)?;
    let mut steps = vec![
        RelationStep::SetObject {
            end_point: item_end_point,
            is_virtual: false,
            old: previous.clone(),
            new: Some(owner.clone()),
        },
        RelationStep::Insert {
            end_point,
            item: item.clone(),
            index,
        },
    ];
    if let Some(previous) = previous {
        steps.push(leave_previous_collection(dm, ctx, previous, property, item)?);
    }
    Ok(RelationCommand::new(steps))
}

/// `None` when `item` is not part of the collection.
pub(crate) fn remove(
    dm: &mut DataManager,
    ctx: &mut TransactionContext<'_, '_>,
    owner: &ObjectId,
    property: &str,
    item: &ObjectId,
) -> Result<Option<RelationCommand>> {
    let end_point = RelationEndPointId::new(owner.clone(), property);
    let items = dm.collection_items(ctx, &end_point)?;
    if !items.contains(item) {
        return Ok(None);
    }
    let steps = removal_steps(dm, ctx, &end_point, item)?;
    Ok(Some(RelationCommand::new(steps)))
}

/// Replaces the item at `index` with `item`.
pub(crate) fn replace(
    dm: &mut DataManager,
    ctx: &mut TransactionContext<'_, '_>,
    owner: &ObjectId,
    property: &str,
    index: usize,
    item: &ObjectId,
) -> Result<RelationCommand> {
    let (end_point, opposite_property) = collection_end_point(dm, ctx, owner, property, item)?;
    let items = dm.collection_items(ctx, &end_point)?;
    let old_item = items
        .get(index)
        .cloned()
        .ok_or(ArgumentError::IndexOutOfRange {
            index,
            len: items.len(),
        })?;

    let item_end_point = RelationEndPointId::new(item.clone(), opposite_property.clone());
    if old_item == *item {
        return Ok(RelationCommand::new(vec![
            RelationStep::Touch {
                end_point,
                is_virtual: true,
            },
            RelationStep::Touch {
                end_point: item_end_point,
                is_virtual: false,
            },
        ]));
    }
    if items.contains(item) {
        return Err(ArgumentError::DuplicateItem(item.clone()).into());
    }

    let old_item_end_point = RelationEndPointId::new(old_item.clone(), opposite_property);
    dm.ensure_end_point(ctx, &old_item_end_point)?;
    let previous = dm.current_opposite(ctx, &item_end_point)?;
    let mut steps = vec![
        RelationStep::SetObject {
            end_point: old_item_end_point,
            is_virtual: false,
            old: Some(owner.clone()),
            new: None,
        },
        RelationStep::SetObject {
            end_point: item_end_point,
            is_virtual: false,
            old: previous.clone(),
            new: Some(owner.clone()),
        },
        RelationStep::Replace {
            end_point,
            index,
            old_item,
            new_item: item.clone(),
        },
    ];
    if let Some(previous) = previous {
        steps.push(leave_previous_collection(dm, ctx, previous, property, item)?);
    }
    Ok(RelationCommand::new(steps))
}

/// Removes every item of the collection.
pub(crate) fn clear(
    dm: &mut DataManager,
    ctx: &mut TransactionContext<'_, '_>,
    owner: &ObjectId,
    property: &str,
) -> Result<RelationCommand> {
    let end_point = RelationEndPointId::new(owner.clone(), property);
    let mut steps = Vec::new();
    for item in dm.collection_items(ctx, &end_point)? {
        steps.extend(removal_steps(dm, ctx, &end_point, &item)?);
    }
    Ok(RelationCommand::new(steps))
}

/// Unwinds every relation of `id` ahead of its deletion.
pub(crate) fn delete(
    dm: &mut DataManager,
    ctx: &mut TransactionContext<'_, '_>,
    id: &ObjectId,
) -> Result<RelationCommand> {
    let class = dm.mapping().class(id.class_id())?.clone();
    let mut steps = Vec::new();

    for definition in class.end_points() {
        let end_point = RelationEndPointId::new(id.clone(), definition.property_name());
        let opposite = dm.mapping().opposite_end_point(definition)?.clone();

        if definition.is_many() {
            for item in dm.collection_items(ctx, &end_point)? {
                let item_end_point = RelationEndPointId::new(item, opposite.property_name());
                dm.ensure_end_point(ctx, &item_end_point)?;
                steps.push(RelationStep::SetObject {
                    end_point: item_end_point,
                    is_virtual: false,
                    old: Some(id.clone()),
                    new: None,
                });
            }
        } else if let Some(related) = dm.current_opposite(ctx, &end_point)? {
            let related_end_point = RelationEndPointId::new(related, opposite.property_name());
            dm.ensure_end_point(ctx, &related_end_point)?;
            if opposite.is_many() {
                steps.push(RelationStep::Remove {
                    end_point: related_end_point,
                    item: id.clone(),
                });
            } else {
                steps.push(RelationStep::SetObject {
                    end_point: related_end_point,
                    is_virtual: opposite.is_virtual(),
                    old: Some(id.clone()),
                    new: None,
                });
            }
        }

        steps.push(RelationStep::Clear {
            end_point,
            is_virtual: definition.is_virtual(),
        });
    }
    Ok(RelationCommand::new(steps))
}

/// Validates a collection end-point and an item destined for it. Returns the end-point and
/// the name of the foreign key on the item.
fn collection_end_point(
    dm: &mut DataManager,
    ctx: &mut TransactionContext<'_, '_>,
    owner: &ObjectId,
    property: &str,
    item: &ObjectId,
) -> Result<(RelationEndPointId, String)> {
    let definition = dm.end_point_definition(owner, property)?;
    let end_point = RelationEndPointId::new(owner.clone(), property);
    if !definition.is_many() {
        return Err(cardinality_mismatch(&end_point, Cardinality::Many, Cardinality::One));
    }
    let opposite = dm.mapping().opposite_end_point(&definition)?.clone();
    dm.check_related(ctx, item, opposite.class_id())?;
    Ok((end_point, opposite.property_name().to_string()))
}

fn removal_steps(
    dm: &mut DataManager,
    ctx: &mut TransactionContext<'_, '_>,
    end_point: &RelationEndPointId,
    item: &ObjectId,
) -> Result<Vec<RelationStep>> {
    let definition = dm.end_point_definition(end_point.object_id(), end_point.property())?;
    let opposite = dm.mapping().opposite_end_point(&definition)?.clone();
    let item_end_point = RelationEndPointId::new(item.clone(), opposite.property_name());
    dm.ensure_end_point(ctx, &item_end_point)?;
    Ok(vec![
        RelationStep::SetObject {
            end_point: item_end_point,
            is_virtual: false,
            old: Some(end_point.object_id().clone()),
            new: None,
        },
        RelationStep::Remove {
            end_point: end_point.clone(),
            item: item.clone(),
        },
    ])
}

fn leave_previous_collection(
    dm: &mut DataManager,
    ctx: &mut TransactionContext<'_, '_>,
    previous: ObjectId,
    property: &str,
    item: &ObjectId,
) -> Result<RelationStep> {
    let end_point = RelationEndPointId::new(previous, property);
    dm.ensure_end_point(ctx, &end_point)?;
    Ok(RelationStep::Remove {
        end_point,
        item: item.clone(),
    })
}
