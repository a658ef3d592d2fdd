use crate::data::DataContainerMap;
use crate::end_point::{RelationEndPointId, RelationEndPointMap};
use crate::error::Result;
use crate::listener::{cancelled, failed, ListenerCollection, ListenerResult};
use crate::object_id::ObjectId;
use crate::transaction::TransactionId;
use crate::value::Value;

/// One elementary end-point mutation of a bidirectional modification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationStep {
    /// Sets an object end-point. Real end-points write the foreign key of their container.
    SetObject {
        end_point: RelationEndPointId,
        is_virtual: bool,
        old: Option<ObjectId>,
        new: Option<ObjectId>,
    },
    Insert {
        end_point: RelationEndPointId,
        item: ObjectId,
        index: usize,
    },
    Remove {
        end_point: RelationEndPointId,
        item: ObjectId,
    },
    Replace {
        end_point: RelationEndPointId,
        index: usize,
        old_item: ObjectId,
        new_item: ObjectId,
    },
    /// Marks an end-point as touched without changing it.
    Touch {
        end_point: RelationEndPointId,
        is_virtual: bool,
    },
    /// Empties an end-point of an object being deleted.
    Clear {
        end_point: RelationEndPointId,
        is_virtual: bool,
    },
}

impl RelationStep {
    pub fn end_point(&self) -> &RelationEndPointId {
        match self {
            RelationStep::SetObject { end_point, .. }
            | RelationStep::Insert { end_point, .. }
            | RelationStep::Remove { end_point, .. }
            | RelationStep::Replace { end_point, .. }
            | RelationStep::Touch { end_point, .. }
            | RelationStep::Clear { end_point, .. } => end_point,
        }
    }

    fn notify_changing(&self, tx: TransactionId, listeners: &ListenerCollection) -> ListenerResult {
        match self {
            RelationStep::SetObject { end_point, old, new, .. } => listeners.before(|l| {
                l.relation_changing(
                    tx,
                    end_point.object_id(),
                    end_point.property(),
                    old.as_ref(),
                    new.as_ref(),
                )
            }),
            RelationStep::Insert { end_point, item, .. } => {
                listeners.before(|l| l.collection_adding(tx, end_point, item))?;
                listeners.before(|l| {
                    l.relation_changing(tx, end_point.object_id(), end_point.property(), None, Some(item))
                })
            }
            RelationStep::Remove { end_point, item } => {
                listeners.before(|l| l.collection_removing(tx, end_point, item))?;
                listeners.before(|l| {
                    l.relation_changing(tx, end_point.object_id(), end_point.property(), Some(item), None)
                })
            }
            RelationStep::Replace {
                end_point,
                old_item,
                new_item,
                ..
            } => {
                listeners.before(|l| l.collection_removing(tx, end_point, old_item))?;
                listeners.before(|l| l.collection_adding(tx, end_point, new_item))?;
                listeners.before(|l| {
                    l.relation_changing(
                        tx,
                        end_point.object_id(),
                        end_point.property(),
                        Some(old_item),
                        Some(new_item),
                    )
                })
            }
            RelationStep::Touch { .. } | RelationStep::Clear { .. } => Ok(()),
        }
    }

    /// Mirrors `notify_changing`: the relation notification first, then the collection one.
    fn notify_changed(&self, tx: TransactionId, listeners: &ListenerCollection) -> ListenerResult {
        let mut results = Vec::new();
        match self {
            RelationStep::SetObject { end_point, old, new, .. } => {
                results.push(listeners.after(|l| {
                    l.relation_changed(
                        tx,
                        end_point.object_id(),
                        end_point.property(),
                        old.as_ref(),
                        new.as_ref(),
                    )
                }));
            }
            RelationStep::Insert { end_point, item, .. } => {
                results.push(listeners.after(|l| {
                    l.relation_changed(tx, end_point.object_id(), end_point.property(), None, Some(item))
                }));
                results.push(listeners.after(|l| l.collection_added(tx, end_point, item)));
            }
            RelationStep::Remove { end_point, item } => {
                results.push(listeners.after(|l| {
                    l.relation_changed(tx, end_point.object_id(), end_point.property(), Some(item), None)
                }));
                results.push(listeners.after(|l| l.collection_removed(tx, end_point, item)));
            }
            RelationStep::Replace {
                end_point,
                old_item,
                new_item,
                ..
            } => {
                results.push(listeners.after(|l| {
                    l.relation_changed(
                        tx,
                        end_point.object_id(),
                        end_point.property(),
                        Some(old_item),
                        Some(new_item),
                    )
                }));
                results.push(listeners.after(|l| l.collection_added(tx, end_point, new_item)));
                results.push(listeners.after(|l| l.collection_removed(tx, end_point, old_item)));
            }
            RelationStep::Touch { .. } | RelationStep::Clear { .. } => {}
        }
        results.into_iter().collect()
    }

    fn perform(&self, containers: &mut DataContainerMap, end_points: &mut RelationEndPointMap) {
        match self {
            RelationStep::SetObject {
                end_point,
                is_virtual: false,
                new,
                ..
            } => set_foreign_key(containers, end_point, new.clone()),
            RelationStep::SetObject {
                end_point,
                is_virtual: true,
                new,
                ..
            } => {
                if let Some(end_point) = end_points
                    .get_mut(end_point)
                    .and_then(|e| e.as_virtual_object_mut())
                {
                    end_point.set_opposite(new.clone());
                }
            }
            RelationStep::Insert {
                end_point,
                item,
                index,
            } => {
                if let Some(end_point) = end_points.get_mut(end_point).and_then(|e| e.as_collection_mut()) {
                    end_point.insert(*index, item.clone());
                }
            }
            RelationStep::Remove { end_point, item } => {
                if let Some(end_point) = end_points.get_mut(end_point).and_then(|e| e.as_collection_mut()) {
                    end_point.remove(item);
                }
            }
            RelationStep::Replace {
                end_point,
                index,
                new_item,
                ..
            } => {
                if let Some(end_point) = end_points.get_mut(end_point).and_then(|e| e.as_collection_mut()) {
                    end_point.replace(*index, new_item.clone());
                }
            }
            RelationStep::Touch {
                end_point,
                is_virtual: false,
            } => {
                if let Some(container) = containers.get_mut(end_point.object_id()) {
                    let _ = container.touch_value(end_point.property());
                }
            }
            RelationStep::Touch {
                end_point,
                is_virtual: true,
            } => {
                if let Some(end_point) = end_points.get_mut(end_point) {
                    end_point.touch();
                }
            }
            RelationStep::Clear {
                end_point,
                is_virtual: false,
            } => set_foreign_key(containers, end_point, None),
            RelationStep::Clear {
                end_point,
                is_virtual: true,
            } => {
                if let Some(end_point) = end_points.get_mut(end_point) {
                    end_point.clear();
                }
            }
        }
    }
}

fn set_foreign_key(
    containers: &mut DataContainerMap,
    end_point: &RelationEndPointId,
    value: Option<ObjectId>,
) {
    if let Some(container) = containers.get_mut(end_point.object_id()) {
        let value = value.map(Value::ObjectId).unwrap_or(Value::Null);
        if container.set_value(end_point.property(), value).is_err() {
            tracing::warn!(%end_point, "foreign key property missing from container");
        }
    }
}

/// A bidirectional modification that has not been announced yet.
#[derive(Debug, Default)]
pub struct RelationCommand {
    steps: Vec<RelationStep>,
}

impl RelationCommand {
    pub fn new(steps: Vec<RelationStep>) -> Self {
        RelationCommand { steps }
    }

    pub fn steps(&self) -> &[RelationStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Raises every "changing" notification of every step before anything is mutated.
    /// A veto abandons the whole command.
    pub fn notify_changing(
        self,
        tx: TransactionId,
        listeners: &ListenerCollection,
    ) -> Result<ApprovedCommand> {
        for step in &self.steps {
            step.notify_changing(tx, listeners).map_err(cancelled)?;
        }
        Ok(ApprovedCommand { steps: self.steps })
    }
}

/// A command every "changing" listener agreed to.
#[derive(Debug)]
pub struct ApprovedCommand {
    steps: Vec<RelationStep>,
}

impl ApprovedCommand {
    pub fn perform(
        self,
        containers: &mut DataContainerMap,
        end_points: &mut RelationEndPointMap,
    ) -> PerformedCommand {
        for step in &self.steps {
            step.perform(containers, end_points);
        }
        PerformedCommand { steps: self.steps }
    }
}

/// A command whose mutations have been applied.
#[derive(Debug)]
pub struct PerformedCommand {
    steps: Vec<RelationStep>,
}

impl PerformedCommand {
    /// Raises the "changed" notifications, last step first. Every listener runs; the first
    /// failure is returned.
    pub fn notify_changed(self, tx: TransactionId, listeners: &ListenerCollection) -> Result<()> {
        let results: Vec<ListenerResult> = self
            .steps
            .iter()
            .rev()
            .map(|step| step.notify_changed(tx, listeners))
            .collect();
        results.into_iter().collect::<ListenerResult>().map_err(failed)
    }
}
