//! Named, explicitly managed entity sets.
//!
//! Unlike a filter, a group's membership is exactly what callers added and
//! removed. The manager only touches it when a member is destroyed.

use std::collections::BTreeSet;

use crate::entity::EntityId;

#[derive(Debug, Clone, Default)]
pub struct EntityGroup {
    name: String,
    members: BTreeSet<EntityId>,
}

impl EntityGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members in ascending id order.
    pub fn members(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.members.iter().copied()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.members.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns `false` if `id` was already a member.
    pub(crate) fn insert(&mut self, id: EntityId) -> bool {
        self.members.insert(id)
    }

    /// Returns `false` if `id` was not a member.
    pub(crate) fn remove(&mut self, id: EntityId) -> bool {
        self.members.remove(&id)
    }
}
