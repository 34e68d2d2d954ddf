//! Named, predicate-derived entity views.
//!
//! An [`EntityFilter`] caches the ids of every entity in its manager that
//! satisfies its predicate. The manager keeps the cache exact: after any
//! manager operation returns, `members == { e : predicate(e) }`. Updates are
//! incremental; only the entity that changed is re-evaluated.
//!
//! Filters built from a component list are keyed by
//! [`canonical_filter_name`], so `[A, B]` and `[B, A]` share one filter.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::component::ComponentKind;
use crate::entity::{Entity, EntityId};

/// Separator between kind names in a canonical filter name.
pub const FILTER_NAME_SEPARATOR: char = ',';

/// Predicate deciding filter membership.
///
/// A predicate may look at anything the manager changes through its own
/// entry points: names, component kinds, dirty and enabled flags, hierarchy
/// links and tags. It must not read component data, since writes through
/// `component_mut` bypass the manager and are never re-evaluated.
pub type FilterPredicate = Box<dyn Fn(&Entity) -> bool>;

/// Sort and dedup `kinds`, then join their names with
/// [`FILTER_NAME_SEPARATOR`]. Order independent.
pub fn canonical_filter_name(kinds: &[ComponentKind]) -> String {
    let sorted = canonical_kinds(kinds);
    let mut name = String::new();
    for (i, kind) in sorted.iter().enumerate() {
        if i > 0 {
            name.push(FILTER_NAME_SEPARATOR);
        }
        name.push_str(kind.name());
    }
    name
}

fn canonical_kinds(kinds: &[ComponentKind]) -> Vec<ComponentKind> {
    let mut sorted = kinds.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
}

// ---------------------------------------------------------------------------
// EntityFilter
// ---------------------------------------------------------------------------

pub struct EntityFilter {
    name: String,
    predicate: FilterPredicate,
    /// Set when the filter was derived from a component list.
    required: Option<Vec<ComponentKind>>,
    members: BTreeSet<EntityId>,
    /// Explicit acquisitions not yet released.
    users: usize,
}

impl EntityFilter {
    /// A filter with an arbitrary predicate. Membership starts empty; the
    /// manager fills it on registration.
    pub fn new(name: impl Into<String>, predicate: FilterPredicate) -> Self {
        Self {
            name: name.into(),
            predicate,
            required: None,
            members: BTreeSet::new(),
            users: 0,
        }
    }

    /// A filter matching entities that carry every kind in `kinds`.
    pub fn for_components(kinds: &[ComponentKind]) -> Self {
        let required = canonical_kinds(kinds);
        let wanted = required.clone();
        let predicate: FilterPredicate =
            Box::new(move |entity: &Entity| wanted.iter().all(|k| entity.has_component(*k)));
        Self {
            name: canonical_filter_name(&required),
            predicate,
            required: Some(required),
            members: BTreeSet::new(),
            users: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Required kinds, sorted, when the filter was built from components.
    pub fn required_kinds(&self) -> Option<&[ComponentKind]> {
        self.required.as_deref()
    }

    /// Evaluate the predicate without touching the cache.
    pub fn matches(&self, entity: &Entity) -> bool {
        (self.predicate)(entity)
    }

    /// Cached members in ascending id order.
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

    pub fn users(&self) -> usize {
        self.users
    }

    // -- manager-driven maintenance -----------------------------------------

    /// Re-evaluate one entity. Returns `true` if membership changed.
    pub(crate) fn evaluate(&mut self, id: EntityId, entity: &Entity) -> bool {
        if (self.predicate)(entity) {
            self.members.insert(id)
        } else {
            self.members.remove(&id)
        }
    }

    /// Full scan; only used when the filter is first registered.
    pub(crate) fn rebuild(&mut self, entities: &BTreeMap<EntityId, Entity>) {
        self.members = entities
            .iter()
            .filter(|(_, entity)| (self.predicate)(entity))
            .map(|(id, _)| *id)
            .collect();
    }

    pub(crate) fn forget(&mut self, id: EntityId) -> bool {
        self.members.remove(&id)
    }

    pub(crate) fn acquire(&mut self) {
        self.users += 1;
    }

    /// Drop one user. Returns `true` when no users remain.
    pub(crate) fn release(&mut self) -> bool {
        self.users = self.users.saturating_sub(1);
        self.users == 0
    }
}

impl fmt::Debug for EntityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityFilter")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("members", &self.members.len())
            .field("users", &self.users)
            .finish()
    }
}
