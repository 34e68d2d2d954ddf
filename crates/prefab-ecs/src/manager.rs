//! The [`EntityManager`] is the single source of truth for entities, filters
//! and groups.
//!
//! # Invariant
//!
//! For every registered filter `F` and every entity `e` in the manager,
//! `F.contains(e) == F.matches(e)` holds whenever a manager method returns.
//! Every mutating entry point re-evaluates the filters for the entities it
//! touched and nothing else, so the cost of a mutation is O(filters), not
//! O(entities). A full scan only happens when a filter is first registered.
//!
//! # Ownership
//!
//! The manager owns every registered [`Entity`]. Filters and groups store ids
//! only; removing an entity removes it from all of them before the call
//! returns, together with its descendants.
//!
//! # Iteration order
//!
//! Entities, filter members and group members iterate in ascending
//! [`EntityId`] order, which is creation order since ids are monotonic. The
//! order is unaffected by unrelated insertions and removals.
//!
//! # Events
//!
//! Every lifecycle change appends to the manager's [`EventQueue`] and
//! nothing drains it implicitly. A frame driver drains it once per frame; a
//! manager used on its own (scene building, tooling) must call
//! [`EntityManager::drain_events`] itself or the queue grows with every
//! add, remove and dirty transition.

use std::collections::{BTreeMap, HashMap};

use rand::SeedableRng;
use rand_pcg::Pcg64;
use tracing::{debug, trace, warn};

use crate::component::{
    downcast_box, AnyComponent, Component, ComponentKind, ComponentRegistry, ComponentState,
};
use crate::entity::{Entity, EntityAllocator, EntityId, ExternalId};
use crate::event::{EntityEvent, EventQueue};
use crate::filter::{canonical_filter_name, EntityFilter, FilterPredicate};
use crate::group::EntityGroup;
use crate::resources::Resources;
use crate::EcsError;

/// Owns entities, the component registry, filters, groups, resources and the
/// event queue.
pub struct EntityManager {
    allocator: EntityAllocator,
    registry: ComponentRegistry,
    entities: BTreeMap<EntityId, Entity>,
    filters: HashMap<String, EntityFilter>,
    groups: HashMap<String, EntityGroup>,
    external_ids: HashMap<ExternalId, EntityId>,
    id_rng: Pcg64,
    resources: Resources,
    events: EventQueue,
}

impl std::fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityManager")
            .field("entity_count", &self.entities.len())
            .field("filter_count", &self.filters.len())
            .field("group_count", &self.groups.len())
            .field("pending_events", &self.events.len())
            .finish()
    }
}

impl EntityManager {
    /// Create an empty manager whose external-id generator is seeded with 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Create an empty manager with a seeded external-id generator, so that
    /// two runs assigning external ids in the same order get the same ids.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            allocator: EntityAllocator::new(),
            registry: ComponentRegistry::new(),
            entities: BTreeMap::new(),
            filters: HashMap::new(),
            groups: HashMap::new(),
            external_ids: HashMap::new(),
            id_rng: Pcg64::seed_from_u64(seed),
            resources: Resources::new(),
            events: EventQueue::new(),
        }
    }

    // -- registry, resources, events ----------------------------------------

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Register `T` so that it can be attached to registered entities.
    pub fn register_component<T: Component>(&mut self) -> Result<ComponentKind, EcsError> {
        self.registry.register::<T>()
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut Resources {
        &mut self.resources
    }

    /// Events raised since the last drain, oldest first.
    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<EntityEvent> {
        self.events.drain()
    }

    /// Return an undelivered batch to the front of the queue.
    pub fn requeue_events(&mut self, batch: Vec<EntityEvent>) {
        self.events.requeue_front(batch);
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create and register an empty entity.
    pub fn create_entity(&mut self, name: impl Into<String>) -> EntityId {
        let entity = Entity::new(name);
        match self.add_entity(entity) {
            Ok(id) => id,
            Err(_) => unreachable!("an entity without components always registers"),
        }
    }

    /// Register a detached entity and return its new id.
    ///
    /// Every attached component must be of a registered kind; otherwise the
    /// entity is rejected and dropped. Each component's `init` hook runs, each
    /// filter is evaluated against this entity only, and `EntityAdded` is
    /// emitted followed by one `ComponentAdded` per component.
    pub fn add_entity(&mut self, mut entity: Entity) -> Result<EntityId, EcsError> {
        for kind in entity.component_kinds() {
            if let Some(slot) = entity.get_component(kind) {
                if let Err(err) = self.registry.check(slot.value()) {
                    warn!(name = entity.name(), %err, "entity rejected");
                    return Err(err);
                }
            }
        }

        let id = self.allocator.allocate();
        entity.set_id(Some(id));
        entity.clear_links();
        for slot in entity.slots_mut() {
            slot.value_mut().init(id, &mut self.resources);
        }

        self.events.push(EntityEvent::EntityAdded { entity: id });
        for kind in entity.component_kinds() {
            self.events
                .push(EntityEvent::ComponentAdded { entity: id, kind });
        }

        for filter in self.filters.values_mut() {
            filter.evaluate(id, &entity);
        }
        trace!(entity = %id, name = entity.name(), "entity registered");
        self.entities.insert(id, entity);
        Ok(id)
    }

    /// Destroy an entity and, recursively, its children.
    ///
    /// The entity and every descendant leave the authoritative set, every
    /// filter and every group before this returns. Returns the detached root
    /// entity (descendants are dropped), or `None` if `id` is unknown.
    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        if !self.entities.contains_key(&id) {
            return None;
        }

        // Detach from the parent first so the parent's child list and tags
        // never point at a dead id.
        let parent = self.entities.get(&id).and_then(Entity::parent);
        if let Some(parent) = parent {
            if let Some(p) = self.entities.get_mut(&parent) {
                p.forget_child(id);
            }
            self.reindex(parent);
        }

        // Post-order: descendants are torn down before their parents.
        let mut order = Vec::new();
        self.collect_subtree(id, &mut order);

        let mut root = None;
        for victim in order {
            if let Some(entity) = self.detach_one(victim) {
                if victim == id {
                    root = Some(entity);
                }
            }
        }
        root
    }

    /// Collect `id` and its descendants, children before parents.
    fn collect_subtree(&self, id: EntityId, out: &mut Vec<EntityId>) {
        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                out.push(current);
                continue;
            }
            stack.push((current, true));
            if let Some(entity) = self.entities.get(&current) {
                for child in entity.children().iter().rev() {
                    stack.push((*child, false));
                }
            }
        }
    }

    /// Remove one entity from every index and run its teardown.
    fn detach_one(&mut self, id: EntityId) -> Option<Entity> {
        let mut entity = self.entities.remove(&id)?;

        for filter in self.filters.values_mut() {
            filter.forget(id);
        }
        for group in self.groups.values_mut() {
            group.remove(id);
        }
        if let Some(ext) = entity.external_id() {
            self.external_ids.remove(&ext);
        }

        for slot in entity.slots_mut() {
            slot.value_mut().uninitialize(id, &mut self.resources);
        }
        for kind in entity.component_kinds() {
            self.events
                .push(EntityEvent::ComponentRemoved { entity: id, kind });
        }
        self.events.push(EntityEvent::EntityRemoved { entity: id });

        entity.set_id(None);
        entity.set_external_id(None);
        entity.clear_links();
        trace!(entity = %id, name = entity.name(), "entity removed");
        Some(entity)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// All entities in ascending id order.
    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> + '_ {
        self.entities.iter().map(|(id, e)| (*id, e))
    }

    /// Snapshot of every live id, ascending.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    /// Rename an entity. Filters are re-evaluated since custom predicates
    /// may look at names.
    pub fn set_name(&mut self, id: EntityId, name: impl Into<String>) -> Result<(), EcsError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(EcsError::StaleEntity { entity: id })?;
        entity.set_name(name);
        self.reindex(id);
        Ok(())
    }

    // -- components ---------------------------------------------------------

    /// Attach `component` to a registered entity.
    ///
    /// A component of the same kind already present is replaced: it is
    /// uninitialized and a `ComponentRemoved` event precedes the new
    /// `ComponentAdded`.
    pub fn add_component<T: Component>(&mut self, id: EntityId, component: T) -> Result<(), EcsError> {
        self.add_boxed_component(id, Box::new(component))
    }

    /// Type-erased form of [`add_component`](Self::add_component).
    pub fn add_boxed_component(
        &mut self,
        id: EntityId,
        component: Box<dyn AnyComponent>,
    ) -> Result<(), EcsError> {
        self.registry.check(component.as_ref())?;
        let kind = component.kind();
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(EcsError::StaleEntity { entity: id })?;

        if let Some(mut old) = entity.take_slot(kind) {
            old.value_mut().uninitialize(id, &mut self.resources);
            self.events
                .push(EntityEvent::ComponentRemoved { entity: id, kind });
            debug!(entity = %id, kind = %kind, "component replaced");
        }

        entity.insert_slot(component);
        if let Some(slot) = entity.slot_mut(kind) {
            slot.value_mut().init(id, &mut self.resources);
        }
        self.events
            .push(EntityEvent::ComponentAdded { entity: id, kind });

        self.reindex(id);
        Ok(())
    }

    /// Detach the component of `kind`. Returns `None` (and emits nothing)
    /// when the entity is unknown or has no such component.
    pub fn remove_component(
        &mut self,
        id: EntityId,
        kind: ComponentKind,
    ) -> Option<Box<dyn AnyComponent>> {
        let entity = self.entities.get_mut(&id)?;
        let mut slot = entity.take_slot(kind)?;
        slot.value_mut().uninitialize(id, &mut self.resources);
        self.events
            .push(EntityEvent::ComponentRemoved { entity: id, kind });
        self.reindex(id);
        Some(slot.into_value())
    }

    /// Typed form of [`remove_component`](Self::remove_component).
    pub fn take_component<T: Component>(&mut self, id: EntityId) -> Option<T> {
        let boxed = self.remove_component(id, T::KIND)?;
        downcast_box::<T>(boxed).ok()
    }

    pub fn has_component(&self, id: EntityId, kind: ComponentKind) -> bool {
        self.entities
            .get(&id)
            .is_some_and(|e| e.has_component(kind))
    }

    pub fn component<T: Component>(&self, id: EntityId) -> Option<&T> {
        self.entities.get(&id)?.component::<T>()
    }

    /// Mutable access to component data. Does not touch the dirty flag.
    pub fn component_mut<T: Component>(&mut self, id: EntityId) -> Option<&mut T> {
        self.entities.get_mut(&id)?.component_mut::<T>()
    }

    pub fn component_state(&self, id: EntityId, kind: ComponentKind) -> Option<ComponentState> {
        self.entities.get(&id)?.component_state(kind)
    }

    pub fn is_dirty(&self, id: EntityId, kind: ComponentKind) -> Option<bool> {
        self.component_state(id, kind).map(|s| s.is_dirty())
    }

    /// Set a component's dirty flag.
    ///
    /// Returns `Some(true)` when the call completed a dirty -> clean
    /// transition, in which case exactly one `ComponentUpdated` event was
    /// emitted. Cleaning an already clean component returns `Some(false)`
    /// and emits nothing. `None` if the entity or component is absent.
    pub fn set_dirty(&mut self, id: EntityId, kind: ComponentKind, dirty: bool) -> Option<bool> {
        let slot = self.entities.get_mut(&id)?.slot_mut(kind)?;
        let finished = slot.state_mut().set_dirty(dirty);
        if finished {
            self.events
                .push(EntityEvent::ComponentUpdated { entity: id, kind });
        }
        self.reindex(id);
        Some(finished)
    }

    /// Set a component's enabled flag, returning the previous value.
    pub fn set_enabled(&mut self, id: EntityId, kind: ComponentKind, enabled: bool) -> Option<bool> {
        let slot = self.entities.get_mut(&id)?.slot_mut(kind)?;
        let previous = slot.state_mut().set_enabled(enabled);
        self.reindex(id);
        Some(previous)
    }

    // -- filters ------------------------------------------------------------

    /// Register a filter under `name`, or acquire the existing one.
    ///
    /// On first registration the filter's members are computed with one full
    /// scan. If a filter with this name exists, `predicate` is ignored and
    /// the existing filter gains a user.
    pub fn add_filter(&mut self, name: &str, predicate: FilterPredicate) -> &EntityFilter {
        if !self.filters.contains_key(name) {
            let filter = EntityFilter::new(name, predicate);
            self.install_filter(filter);
        }
        self.acquire_existing(name)
    }

    /// Register (or acquire) the filter for a component set, returning its
    /// canonical name.
    pub fn acquire_filter(&mut self, kinds: &[ComponentKind]) -> String {
        let name = canonical_filter_name(kinds);
        if !self.filters.contains_key(&name) {
            self.install_filter(EntityFilter::for_components(kinds));
        }
        self.acquire_existing(&name);
        name
    }

    fn acquire_existing(&mut self, name: &str) -> &EntityFilter {
        match self.filters.get_mut(name) {
            Some(filter) => {
                filter.acquire();
                filter
            }
            None => unreachable!("filter '{name}' installed above"),
        }
    }

    fn install_filter(&mut self, mut filter: EntityFilter) {
        filter.rebuild(&self.entities);
        debug!(
            filter = filter.name(),
            members = filter.len(),
            "filter registered"
        );
        self.filters.insert(filter.name().to_owned(), filter);
    }

    /// Drop one user of a filter, destroying it when none remain.
    ///
    /// Returns `true` if the filter was destroyed. Unknown names return
    /// `false`.
    pub fn release_filter(&mut self, name: &str) -> bool {
        let Some(filter) = self.filters.get_mut(name) else {
            return false;
        };
        if filter.release() {
            self.filters.remove(name);
            debug!(filter = name, "filter released");
            true
        } else {
            false
        }
    }

    /// Destroy every filter with no users (typically ones created implicitly
    /// by [`get_all_using_components`](Self::get_all_using_components)).
    pub fn prune_unused_filters(&mut self) -> usize {
        let before = self.filters.len();
        self.filters.retain(|_, f| f.users() > 0);
        let pruned = before - self.filters.len();
        if pruned > 0 {
            debug!(pruned, "unused filters pruned");
        }
        pruned
    }

    pub fn filter(&self, name: &str) -> Option<&EntityFilter> {
        self.filters.get(name)
    }

    /// Members of the filter named `name`, ascending. Empty if no such
    /// filter exists.
    pub fn get_all_using_filter_name(&self, name: &str) -> Vec<EntityId> {
        self.filters
            .get(name)
            .map(|f| f.members().collect())
            .unwrap_or_default()
    }

    /// Entities carrying every kind in `kinds`, ascending.
    ///
    /// Resolves to the shared filter for the canonical name, registering it
    /// (without a user) on first use.
    pub fn get_all_using_components(&mut self, kinds: &[ComponentKind]) -> Vec<EntityId> {
        let name = canonical_filter_name(kinds);
        if !self.filters.contains_key(&name) {
            self.install_filter(EntityFilter::for_components(kinds));
        }
        self.get_all_using_filter_name(&name)
    }

    /// Registered filter names, sorted.
    pub fn filter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    /// Outstanding acquisitions of filter `name`; `None` if unknown.
    pub fn filter_users(&self, name: &str) -> Option<usize> {
        self.filters.get(name).map(EntityFilter::users)
    }

    /// Re-evaluate every filter for one entity.
    fn reindex(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get(&id) else {
            return;
        };
        for filter in self.filters.values_mut() {
            filter.evaluate(id, entity);
        }
    }

    // -- groups -------------------------------------------------------------

    /// Add a registered entity to a group, creating the group on first use.
    ///
    /// Returns `Ok(false)` if the entity was already a member.
    pub fn add_entity_to_group(&mut self, id: EntityId, name: &str) -> Result<bool, EcsError> {
        if !self.entities.contains_key(&id) {
            warn!(entity = %id, group = name, "refusing to group an unknown entity");
            return Err(EcsError::StaleEntity { entity: id });
        }
        let group = self.groups.entry(name.to_owned()).or_insert_with(|| {
            debug!(group = name, "group created");
            EntityGroup::new(name)
        });
        Ok(group.insert(id))
    }

    /// Returns `false` if the group does not exist or `id` was not in it.
    pub fn remove_entity_from_group(&mut self, id: EntityId, name: &str) -> bool {
        self.groups.get_mut(name).is_some_and(|g| g.remove(id))
    }

    /// Members of group `name`, ascending. Empty if the group does not exist.
    pub fn get_all_using_group_name(&self, name: &str) -> Vec<EntityId> {
        self.groups
            .get(name)
            .map(|g| g.members().collect())
            .unwrap_or_default()
    }

    pub fn group(&self, name: &str) -> Option<&EntityGroup> {
        self.groups.get(name)
    }

    /// Drop a group entirely. Its members are unaffected.
    pub fn remove_group(&mut self, name: &str) -> Option<EntityGroup> {
        self.groups.remove(name)
    }

    /// Group names, sorted.
    pub fn group_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.groups.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Names of the groups `id` belongs to, sorted.
    pub fn groups_of(&self, id: EntityId) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .groups
            .iter()
            .filter(|(_, g)| g.contains(id))
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    // -- hierarchy ----------------------------------------------------------

    /// Make `child` a child of `parent`. The child's lifetime is then tied to
    /// the parent: removing the parent removes the child.
    ///
    /// A child that already has another parent is moved. Attaching an
    /// entity beneath itself or one of its descendants is rejected.
    pub fn add_child(&mut self, parent: EntityId, child: EntityId) -> Result<(), EcsError> {
        if !self.entities.contains_key(&parent) {
            return Err(EcsError::StaleEntity { entity: parent });
        }
        if !self.entities.contains_key(&child) {
            return Err(EcsError::StaleEntity { entity: child });
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(EcsError::HierarchyCycle { parent, child });
        }

        let previous = self.entities.get(&child).and_then(Entity::parent);
        if let Some(previous) = previous.filter(|p| *p != parent) {
            if let Some(p) = self.entities.get_mut(&previous) {
                p.forget_child(child);
            }
            self.reindex(previous);
        }

        if let Some(c) = self.entities.get_mut(&child) {
            c.set_parent(Some(parent));
        }
        if let Some(p) = self.entities.get_mut(&parent) {
            p.push_child(child);
        }
        self.reindex(parent);
        self.reindex(child);
        Ok(())
    }

    /// Detach `child` from `parent` without destroying it. Returns `false`
    /// if `child` was not a child of `parent`.
    pub fn remove_child(&mut self, parent: EntityId, child: EntityId) -> bool {
        let removed = self
            .entities
            .get_mut(&parent)
            .is_some_and(|p| p.forget_child(child));
        if removed {
            if let Some(c) = self.entities.get_mut(&child) {
                c.set_parent(None);
            }
            self.reindex(parent);
            self.reindex(child);
        }
        removed
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    fn is_ancestor_or_self(&self, ancestor: EntityId, id: EntityId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.entities.get(&current).and_then(Entity::parent);
        }
        false
    }

    /// Children of `parent` in insertion order; empty if unknown.
    pub fn children(&self, parent: EntityId) -> &[EntityId] {
        self.entities
            .get(&parent)
            .map(Entity::children)
            .unwrap_or_default()
    }

    /// Tag `child` on `parent` under the child's current name.
    pub fn tag_entity(&mut self, parent: EntityId, child: EntityId) -> Result<(), EcsError> {
        let tag = match self.entities.get(&child) {
            Some(c) if c.parent() == Some(parent) => c.name().to_owned(),
            Some(_) => return Err(EcsError::NotAChild { parent, child }),
            None => return Err(EcsError::StaleEntity { entity: child }),
        };
        let p = self
            .entities
            .get_mut(&parent)
            .ok_or(EcsError::StaleEntity { entity: parent })?;
        if let Some(replaced) = p.insert_tag(tag.clone(), child).filter(|r| *r != child) {
            debug!(parent = %parent, tag = %tag, replaced = %replaced, "tag reassigned");
        }
        self.reindex(parent);
        Ok(())
    }

    /// The child of `parent` tagged `name`.
    pub fn get_with_tag(&self, parent: EntityId, name: &str) -> Option<EntityId> {
        self.entities.get(&parent)?.get_with_tag(name)
    }

    // -- external ids -------------------------------------------------------

    /// Give an entity an external UUID, or return the one it already has.
    pub fn assign_external_id(&mut self, id: EntityId) -> Result<ExternalId, EcsError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(EcsError::StaleEntity { entity: id })?;
        if let Some(existing) = entity.external_id() {
            return Ok(existing);
        }
        let external = loop {
            let candidate = ExternalId::generate(&mut self.id_rng);
            if !self.external_ids.contains_key(&candidate) {
                break candidate;
            }
        };
        entity.set_external_id(Some(external));
        self.external_ids.insert(external, id);
        Ok(external)
    }

    pub fn entity_by_external_id(&self, external: ExternalId) -> Option<EntityId> {
        self.external_ids.get(&external).copied()
    }
}

impl Default for EntityManager {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    struct A(u32);
    impl Component for A {
        const KIND: ComponentKind = ComponentKind::new("A");
    }

    #[derive(Debug, Clone, PartialEq)]
    struct B;
    impl Component for B {
        const KIND: ComponentKind = ComponentKind::new("B");
    }

    #[derive(Debug, Clone, PartialEq)]
    struct C;
    impl Component for C {
        const KIND: ComponentKind = ComponentKind::new("C");
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Unregistered;
    impl Component for Unregistered {
        const KIND: ComponentKind = ComponentKind::new("Unregistered");
    }

    /// Records lifecycle hook calls into a shared log resource.
    type HookLog = Rc<RefCell<Vec<String>>>;

    #[derive(Debug)]
    struct Hooked(&'static str);
    impl Component for Hooked {
        const KIND: ComponentKind = ComponentKind::new("Hooked");

        fn init(&mut self, owner: EntityId, resources: &mut Resources) {
            if let Some(log) = resources.get::<HookLog>() {
                log.borrow_mut().push(format!("init {} {owner}", self.0));
            }
        }

        fn uninitialize(&mut self, owner: EntityId, resources: &mut Resources) {
            if let Some(log) = resources.get::<HookLog>() {
                log.borrow_mut().push(format!("uninit {} {owner}", self.0));
            }
        }
    }

    fn setup() -> EntityManager {
        let mut m = EntityManager::new();
        m.register_component::<A>().unwrap();
        m.register_component::<B>().unwrap();
        m.register_component::<C>().unwrap();
        m.register_component::<Hooked>().unwrap();
        m
    }

    #[test]
    fn create_entity_assigns_monotonic_ids() {
        let mut m = setup();
        let a = m.create_entity("a");
        let b = m.create_entity("b");
        assert!(a < b);
        assert_eq!(m.entity(a).unwrap().id(), Some(a));
        assert_eq!(m.entity(b).unwrap().name(), "b");
        assert_eq!(m.entity_count(), 2);
    }

    #[test]
    fn add_entity_rejects_unregistered_kind() {
        let mut m = setup();
        let e = Entity::new("bad").with_component(Unregistered);
        let err = m.add_entity(e).unwrap_err();
        assert!(matches!(err, EcsError::UnregisteredComponent { .. }));
        assert_eq!(m.entity_count(), 0);
        assert!(m.events().is_empty());
    }

    #[test]
    fn add_component_to_unknown_entity_is_stale() {
        let mut m = setup();
        let e = m.create_entity("x");
        m.remove_entity(e);
        assert!(matches!(
            m.add_component(e, A(1)),
            Err(EcsError::StaleEntity { .. })
        ));
    }

    #[test]
    fn filter_registration_scans_existing_entities() {
        let mut m = setup();
        let e1 = m.add_entity(Entity::new("e1").with_component(A(0))).unwrap();
        let _e2 = m.add_entity(Entity::new("e2").with_component(B)).unwrap();

        let name = m.acquire_filter(&[A::KIND]);
        assert_eq!(m.get_all_using_filter_name(&name), vec![e1]);
    }

    #[test]
    fn add_entity_updates_existing_filters() {
        let mut m = setup();
        let name = m.acquire_filter(&[A::KIND, B::KIND]);
        let e = m
            .add_entity(Entity::new("e").with_component(A(0)).with_component(B))
            .unwrap();
        assert_eq!(m.get_all_using_filter_name(&name), vec![e]);
    }

    #[test]
    fn component_changes_update_filters() {
        let mut m = setup();
        let name = m.acquire_filter(&[A::KIND, B::KIND]);
        let e = m.create_entity("e");

        m.add_component(e, A(1)).unwrap();
        assert!(m.get_all_using_filter_name(&name).is_empty());
        m.add_component(e, B).unwrap();
        assert_eq!(m.get_all_using_filter_name(&name), vec![e]);
        assert!(m.remove_component(e, A::KIND).is_some());
        assert!(m.get_all_using_filter_name(&name).is_empty());
    }

    #[test]
    fn readding_a_filter_keeps_the_first_predicate() {
        let mut m = setup();
        let named = m.add_entity(Entity::new("button.ok")).unwrap();
        let _other = m.create_entity("label");

        m.add_filter("buttons", Box::new(|e: &Entity| e.name().starts_with("button")));
        let filter = m.add_filter("buttons", Box::new(|_: &Entity| true));
        assert_eq!(filter.users(), 2);
        assert_eq!(m.get_all_using_filter_name("buttons"), vec![named]);
    }

    #[test]
    fn rename_reevaluates_custom_filters() {
        let mut m = setup();
        m.add_filter("buttons", Box::new(|e: &Entity| e.name().starts_with("button")));
        let e = m.create_entity("label");
        assert!(m.get_all_using_filter_name("buttons").is_empty());
        m.set_name(e, "button.cancel").unwrap();
        assert_eq!(m.get_all_using_filter_name("buttons"), vec![e]);
    }

    #[test]
    fn tagging_reevaluates_custom_filters() {
        let mut m = setup();
        m.add_filter(
            "has_background",
            Box::new(|e: &Entity| e.get_with_tag("background").is_some()),
        );
        let panel = m.create_entity("panel");
        let background = m.create_entity("background");
        m.add_child(panel, background).unwrap();
        assert!(m.get_all_using_filter_name("has_background").is_empty());

        m.tag_entity(panel, background).unwrap();
        assert_eq!(m.get_all_using_filter_name("has_background"), vec![panel]);

        m.remove_entity(background);
        assert!(m.get_all_using_filter_name("has_background").is_empty());
    }

    #[test]
    fn dirty_changes_reevaluate_custom_filters() {
        let mut m = setup();
        m.add_filter(
            "pending_a",
            Box::new(|e: &Entity| e.component_state(A::KIND).is_some_and(|s| s.is_dirty())),
        );
        let e = m.add_entity(Entity::new("e").with_component(A(0))).unwrap();
        assert_eq!(m.get_all_using_filter_name("pending_a"), vec![e]);

        m.set_dirty(e, A::KIND, false);
        assert!(m.get_all_using_filter_name("pending_a").is_empty());
        m.set_dirty(e, A::KIND, true);
        assert_eq!(m.get_all_using_filter_name("pending_a"), vec![e]);
    }

    #[test]
    fn release_filter_destroys_at_zero_users() {
        let mut m = setup();
        let first = m.acquire_filter(&[A::KIND]);
        let second = m.acquire_filter(&[A::KIND]);
        assert_eq!(first, second);
        assert_eq!(m.filter(&first).unwrap().users(), 2);

        assert!(!m.release_filter(&first));
        assert!(m.filter(&first).is_some());
        assert!(m.release_filter(&first));
        assert!(m.filter(&first).is_none());
        assert!(!m.release_filter(&first), "unknown filter");
    }

    #[test]
    fn implicit_filters_can_be_pruned() {
        let mut m = setup();
        m.get_all_using_components(&[B::KIND]);
        let kept = m.acquire_filter(&[A::KIND]);
        assert_eq!(m.filter_count(), 2);
        assert_eq!(m.prune_unused_filters(), 1);
        assert_eq!(m.filter_names(), vec![kept.as_str()]);
    }

    #[test]
    fn unknown_filter_and_group_are_empty() {
        let m = setup();
        assert!(m.get_all_using_filter_name("nope").is_empty());
        assert!(m.get_all_using_group_name("nope").is_empty());
        assert!(m.group("nope").is_none());
    }

    #[test]
    fn replacing_component_tears_down_previous() {
        let mut m = setup();
        let log: HookLog = Rc::new(RefCell::new(Vec::new()));
        m.resources_mut().insert(log.clone());

        let e = m.create_entity("e");
        m.drain_events();
        m.add_component(e, Hooked("first")).unwrap();
        m.add_component(e, Hooked("second")).unwrap();

        assert_eq!(
            log.borrow().as_slice(),
            &[
                format!("init first {e}"),
                format!("uninit first {e}"),
                format!("init second {e}"),
            ]
        );
        assert_eq!(
            m.drain_events(),
            vec![
                EntityEvent::ComponentAdded { entity: e, kind: Hooked::KIND },
                EntityEvent::ComponentRemoved { entity: e, kind: Hooked::KIND },
                EntityEvent::ComponentAdded { entity: e, kind: Hooked::KIND },
            ]
        );
        assert_eq!(m.entity(e).unwrap().component_count(), 1);
    }

    #[test]
    fn replacement_resets_dirty_flag() {
        let mut m = setup();
        let e = m.create_entity("e");
        m.add_component(e, A(1)).unwrap();
        m.set_dirty(e, A::KIND, false);
        m.add_component(e, A(2)).unwrap();
        assert_eq!(m.is_dirty(e, A::KIND), Some(true));
        assert_eq!(m.component::<A>(e), Some(&A(2)));
    }

    #[test]
    fn remove_absent_component_emits_nothing() {
        let mut m = setup();
        let e = m.create_entity("e");
        m.drain_events();
        assert!(m.remove_component(e, A::KIND).is_none());
        assert!(m.events().is_empty());
        assert!(m.take_component::<A>(EntityId::from_raw(99)).is_none());
    }

    #[test]
    fn take_component_returns_typed_value() {
        let mut m = setup();
        let e = m.create_entity("e");
        m.add_component(e, A(7)).unwrap();
        assert_eq!(m.take_component::<A>(e), Some(A(7)));
        assert!(!m.has_component(e, A::KIND));
    }

    #[test]
    fn registration_and_removal_run_hooks() {
        let mut m = setup();
        let log: HookLog = Rc::new(RefCell::new(Vec::new()));
        m.resources_mut().insert(log.clone());

        let e = m
            .add_entity(Entity::new("e").with_component(Hooked("h")))
            .unwrap();
        let detached = m.remove_entity(e).unwrap();

        assert_eq!(
            log.borrow().as_slice(),
            &[format!("init h {e}"), format!("uninit h {e}")]
        );
        assert_eq!(detached.id(), None);
        assert_eq!(detached.component_state(Hooked::KIND).unwrap().owner(), None);
    }

    #[test]
    fn component_owner_tracks_entity() {
        let mut m = setup();
        let e = m.create_entity("e");
        m.add_component(e, B).unwrap();
        assert_eq!(m.component_state(e, B::KIND).unwrap().owner(), Some(e));
    }

    #[test]
    fn dirty_notification_fires_once_per_transition() {
        let mut m = setup();
        let e = m.create_entity("e");
        m.add_component(e, A(0)).unwrap();
        m.drain_events();

        assert_eq!(m.is_dirty(e, A::KIND), Some(true));
        assert_eq!(m.set_dirty(e, A::KIND, false), Some(true));
        assert_eq!(m.is_dirty(e, A::KIND), Some(false));
        assert_eq!(m.set_dirty(e, A::KIND, false), Some(false));
        assert_eq!(
            m.drain_events(),
            vec![EntityEvent::ComponentUpdated { entity: e, kind: A::KIND }]
        );

        assert_eq!(m.set_dirty(e, B::KIND, false), None);
    }

    #[test]
    fn set_enabled_returns_previous() {
        let mut m = setup();
        let e = m.create_entity("e");
        m.add_component(e, A(0)).unwrap();
        assert_eq!(m.set_enabled(e, A::KIND, false), Some(true));
        assert!(!m.component_state(e, A::KIND).unwrap().is_enabled());
        assert_eq!(m.set_enabled(e, A::KIND, true), Some(false));
    }

    #[test]
    fn remove_entity_is_idempotent() {
        let mut m = setup();
        let e = m.create_entity("e");
        assert!(m.remove_entity(e).is_some());
        assert!(m.remove_entity(e).is_none());
    }

    #[test]
    fn removed_entity_can_be_readded_with_new_id() {
        let mut m = setup();
        let e = m.add_entity(Entity::new("e").with_component(A(3))).unwrap();
        let detached = m.remove_entity(e).unwrap();
        let again = m.add_entity(detached).unwrap();
        assert_ne!(e, again);
        assert_eq!(m.component::<A>(again), Some(&A(3)));
    }

    #[test]
    fn groups_are_explicit() {
        let mut m = setup();
        let e = m.add_entity(Entity::new("e").with_component(A(0))).unwrap();
        let filter = m.acquire_filter(&[A::KIND]);

        assert_eq!(m.add_entity_to_group(e, "G1"), Ok(true));
        assert_eq!(m.add_entity_to_group(e, "G1"), Ok(false));
        assert_eq!(m.get_all_using_group_name("G1"), vec![e]);
        assert!(m.get_all_using_group_name("G2").is_empty());
        assert_eq!(m.get_all_using_filter_name(&filter), vec![e]);
        assert_eq!(m.groups_of(e), vec!["G1"]);

        assert!(m.remove_entity_from_group(e, "G1"));
        assert!(!m.remove_entity_from_group(e, "G1"));
        assert!(!m.remove_entity_from_group(e, "missing"));
        assert_eq!(m.get_all_using_filter_name(&filter), vec![e]);
    }

    #[test]
    fn grouping_unknown_entity_fails() {
        let mut m = setup();
        let ghost = EntityId::from_raw(42);
        assert!(matches!(
            m.add_entity_to_group(ghost, "G"),
            Err(EcsError::StaleEntity { .. })
        ));
        assert!(m.group("G").is_none());
    }

    #[test]
    fn remove_group_keeps_entities() {
        let mut m = setup();
        let e = m.create_entity("e");
        m.add_entity_to_group(e, "G").unwrap();
        let group = m.remove_group("G").unwrap();
        assert!(group.contains(e));
        assert!(m.contains(e));
        assert!(m.group_names().is_empty());
    }

    #[test]
    fn removing_parent_cascades_to_descendants() {
        let mut m = setup();
        let panel = m.create_entity("panel");
        let label = m.create_entity("label");
        let glyph = m.create_entity("glyph");
        m.add_child(panel, label).unwrap();
        m.add_child(label, glyph).unwrap();
        m.add_component(glyph, A(0)).unwrap();
        m.add_entity_to_group(glyph, "text").unwrap();
        let filter = m.acquire_filter(&[A::KIND]);
        m.drain_events();

        let root = m.remove_entity(panel).unwrap();
        assert_eq!(root.name(), "panel");
        assert!(root.children().is_empty());
        assert_eq!(m.entity_count(), 0);
        assert!(m.get_all_using_filter_name(&filter).is_empty());
        assert!(m.get_all_using_group_name("text").is_empty());

        let removed: Vec<EntityId> = m
            .drain_events()
            .into_iter()
            .filter_map(|ev| match ev {
                EntityEvent::EntityRemoved { entity } => Some(entity),
                _ => None,
            })
            .collect();
        assert_eq!(removed, vec![glyph, label, panel]);
    }

    #[test]
    fn removing_child_detaches_from_parent() {
        let mut m = setup();
        let panel = m.create_entity("panel");
        let bg = m.create_entity("background");
        m.add_child(panel, bg).unwrap();
        m.tag_entity(panel, bg).unwrap();

        m.remove_entity(bg);
        assert!(m.children(panel).is_empty());
        assert_eq!(m.get_with_tag(panel, "background"), None);
    }

    #[test]
    fn reparenting_moves_child() {
        let mut m = setup();
        let a = m.create_entity("a");
        let b = m.create_entity("b");
        let child = m.create_entity("child");
        m.add_child(a, child).unwrap();
        m.tag_entity(a, child).unwrap();
        m.add_child(b, child).unwrap();

        assert!(m.children(a).is_empty());
        assert_eq!(m.get_with_tag(a, "child"), None);
        assert_eq!(m.children(b), &[child]);
        assert_eq!(m.entity(child).unwrap().parent(), Some(b));
    }

    #[test]
    fn hierarchy_cycles_rejected() {
        let mut m = setup();
        let a = m.create_entity("a");
        let b = m.create_entity("b");
        m.add_child(a, b).unwrap();
        assert!(matches!(
            m.add_child(b, a),
            Err(EcsError::HierarchyCycle { .. })
        ));
        assert!(matches!(
            m.add_child(a, a),
            Err(EcsError::HierarchyCycle { .. })
        ));
    }

    #[test]
    fn remove_child_keeps_entity_alive() {
        let mut m = setup();
        let a = m.create_entity("a");
        let b = m.create_entity("b");
        m.add_child(a, b).unwrap();
        assert!(m.remove_child(a, b));
        assert!(!m.remove_child(a, b));
        assert!(m.contains(b));
        assert_eq!(m.entity(b).unwrap().parent(), None);
        m.remove_entity(a);
        assert!(m.contains(b));
    }

    #[test]
    fn tagging_requires_child() {
        let mut m = setup();
        let a = m.create_entity("a");
        let b = m.create_entity("b");
        assert!(matches!(
            m.tag_entity(a, b),
            Err(EcsError::NotAChild { .. })
        ));
    }

    #[test]
    fn external_ids_are_stable_and_resolvable() {
        let mut m = setup();
        let e = m.create_entity("e");
        let ext = m.assign_external_id(e).unwrap();
        assert_eq!(m.assign_external_id(e).unwrap(), ext);
        assert_eq!(m.entity_by_external_id(ext), Some(e));
        assert_eq!(m.entity(e).unwrap().external_id(), Some(ext));

        m.remove_entity(e);
        assert_eq!(m.entity_by_external_id(ext), None);
    }

    #[test]
    fn external_ids_are_deterministic_per_seed() {
        let mut m1 = EntityManager::with_seed(11);
        let mut m2 = EntityManager::with_seed(11);
        let e1 = m1.create_entity("e");
        let e2 = m2.create_entity("e");
        assert_eq!(
            m1.assign_external_id(e1).unwrap(),
            m2.assign_external_id(e2).unwrap()
        );
    }

    #[test]
    fn registration_events_in_order() {
        let mut m = setup();
        let e = m
            .add_entity(Entity::new("e").with_component(B).with_component(A(0)))
            .unwrap();
        assert_eq!(
            m.drain_events(),
            vec![
                EntityEvent::EntityAdded { entity: e },
                EntityEvent::ComponentAdded { entity: e, kind: A::KIND },
                EntityEvent::ComponentAdded { entity: e, kind: B::KIND },
            ]
        );
    }

    #[test]
    fn events_accumulate_until_drained() {
        let mut m = setup();
        for i in 0..3 {
            let e = m.add_entity(Entity::new(format!("e{i}")).with_component(A(i))).unwrap();
            m.set_dirty(e, A::KIND, false);
            m.remove_entity(e);
        }
        // Added, ComponentAdded, Updated, ComponentRemoved, Removed per entity.
        assert_eq!(m.events().len(), 15);
        assert_eq!(m.drain_events().len(), 15);
        assert!(m.events().is_empty());

        m.create_entity("after");
        assert_eq!(m.events().len(), 1);
    }

    #[test]
    fn entities_iterate_in_creation_order() {
        let mut m = setup();
        let ids: Vec<EntityId> = (0..5).map(|i| m.create_entity(format!("e{i}"))).collect();
        m.remove_entity(ids[2]);
        let seen: Vec<EntityId> = m.entities().map(|(id, _)| id).collect();
        assert_eq!(seen, vec![ids[0], ids[1], ids[3], ids[4]]);
        assert_eq!(m.entity_ids(), seen);
    }

    #[test]
    fn c_is_independent_of_ab_filter() {
        let mut m = setup();
        let ab = m.acquire_filter(&[A::KIND, B::KIND]);
        let e = m
            .add_entity(
                Entity::new("e")
                    .with_component(A(0))
                    .with_component(B)
                    .with_component(C),
            )
            .unwrap();
        m.remove_component(e, C::KIND);
        assert_eq!(m.get_all_using_filter_name(&ab), vec![e]);
    }
}
