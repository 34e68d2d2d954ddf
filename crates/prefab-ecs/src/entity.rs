//! Entity identifiers, allocation, and the [`Entity`] container.
//!
//! An [`EntityId`] is a monotonic 64-bit counter handed out by the owning
//! manager; ids are never reused within one manager, so id order is creation
//! order. Entities that need to be referenced from outside the process can
//! additionally carry an [`ExternalId`] (a random UUID).

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize, Serializer};

use crate::component::{AnyComponent, Component, ComponentKind, ComponentSlot, ComponentState};

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Process-unique (per manager) entity identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ExternalId
// ---------------------------------------------------------------------------

/// A version-4 style UUID used to reference an entity from outside the
/// manager (saved scenes, editor selections).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExternalId(u128);

impl ExternalId {
    /// Draw a random id, stamping the UUID version and variant bits.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let raw: u128 = rng.gen();
        let raw = (raw & !(0xFu128 << 76)) | (0x4u128 << 76);
        let raw = (raw & !(0x3u128 << 62)) | (0x2u128 << 62);
        Self(raw)
    }

    pub fn as_u128(self) -> u128 {
        self.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xFFFF_FFFF_FFFF
        )
    }
}

impl fmt::Debug for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExternalId({self})")
    }
}

impl Serialize for ExternalId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

/// Hands out monotonically increasing [`EntityId`]s. Ids are never recycled.
#[derive(Debug, Default)]
pub(crate) struct EntityAllocator {
    next: u64,
}

impl EntityAllocator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next += 1;
        id
    }

    /// Number of ids handed out so far.
    #[cfg(test)]
    pub(crate) fn allocated(&self) -> u64 {
        self.next
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// An identity plus a bag of at most one component per kind.
///
/// An `Entity` is either *detached* (built with [`Entity::new`], no id) or
/// owned by an [`EntityManager`](crate::manager::EntityManager). Structural
/// changes to a registered entity go through the manager so that filters
/// stay consistent; the manager only hands out shared references.
#[derive(Debug)]
pub struct Entity {
    id: Option<EntityId>,
    name: String,
    external_id: Option<ExternalId>,
    components: BTreeMap<ComponentKind, ComponentSlot>,
    parent: Option<EntityId>,
    children: Vec<EntityId>,
    tags: HashMap<String, EntityId>,
}

impl Entity {
    /// Create a detached entity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            external_id: None,
            components: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
            tags: HashMap::new(),
        }
    }

    /// Builder form of [`add_component`](Self::add_component).
    pub fn with_component<T: Component>(mut self, component: T) -> Self {
        self.add_component(component);
        self
    }

    /// `None` while detached.
    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn external_id(&self) -> Option<ExternalId> {
        self.external_id
    }

    // -- components ---------------------------------------------------------

    /// Attach a component, replacing (and returning) any component of the
    /// same kind.
    ///
    /// On a detached entity nothing else happens. Registered entities are
    /// mutated through
    /// [`EntityManager::add_component`](crate::manager::EntityManager::add_component),
    /// which also runs lifecycle hooks, emits events and updates filters.
    pub fn add_component<T: Component>(&mut self, component: T) -> Option<Box<dyn AnyComponent>> {
        self.insert_boxed(Box::new(component))
    }

    /// Detach the component of `kind`. `None` if absent.
    pub fn remove_component(&mut self, kind: ComponentKind) -> Option<Box<dyn AnyComponent>> {
        self.take_slot(kind).map(ComponentSlot::into_value)
    }

    /// Whether a component of `kind` is attached.
    #[inline]
    pub fn has_component(&self, kind: ComponentKind) -> bool {
        self.components.contains_key(&kind)
    }

    /// Typed form of [`has_component`](Self::has_component).
    pub fn has<T: Component>(&self) -> bool {
        self.has_component(T::KIND)
    }

    /// The slot for `kind`, holding the value and its state.
    pub fn get_component(&self, kind: ComponentKind) -> Option<&ComponentSlot> {
        self.components.get(&kind)
    }

    pub fn component<T: Component>(&self) -> Option<&T> {
        self.components.get(&T::KIND).and_then(|slot| slot.get::<T>())
    }

    /// Mutable typed access to component data.
    ///
    /// Only data is exposed; the set of attached kinds cannot change through
    /// this reference.
    pub fn component_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.components
            .get_mut(&T::KIND)
            .and_then(|slot| slot.get_mut::<T>())
    }

    pub fn component_state(&self, kind: ComponentKind) -> Option<ComponentState> {
        self.components.get(&kind).map(|slot| *slot.state())
    }

    /// Attached kinds in name order.
    pub fn component_kinds(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        self.components.keys().copied()
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    // -- hierarchy ----------------------------------------------------------

    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    /// Children in the order they were added.
    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    /// The child tagged with `name`, if any.
    pub fn get_with_tag(&self, name: &str) -> Option<EntityId> {
        self.tags.get(name).copied()
    }

    /// All tags, sorted by name.
    pub fn tags(&self) -> Vec<(&str, EntityId)> {
        let mut tags: Vec<(&str, EntityId)> =
            self.tags.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        tags.sort_unstable();
        tags
    }

    // -- crate-internal mutation -------------------------------------------

    pub(crate) fn insert_boxed(
        &mut self,
        component: Box<dyn AnyComponent>,
    ) -> Option<Box<dyn AnyComponent>> {
        self.insert_slot(component).map(ComponentSlot::into_value)
    }

    pub(crate) fn insert_slot(&mut self, component: Box<dyn AnyComponent>) -> Option<ComponentSlot> {
        let kind = component.kind();
        self.components
            .insert(kind, ComponentSlot::new(component, self.id))
    }

    pub(crate) fn take_slot(&mut self, kind: ComponentKind) -> Option<ComponentSlot> {
        let mut slot = self.components.remove(&kind)?;
        slot.state_mut().set_owner(None);
        Some(slot)
    }

    pub(crate) fn slot_mut(&mut self, kind: ComponentKind) -> Option<&mut ComponentSlot> {
        self.components.get_mut(&kind)
    }

    pub(crate) fn slots_mut(&mut self) -> impl Iterator<Item = &mut ComponentSlot> + '_ {
        self.components.values_mut()
    }

    /// Bind to (or, with `None`, release from) a manager id. Owner links of
    /// every attached component follow.
    pub(crate) fn set_id(&mut self, id: Option<EntityId>) {
        self.id = id;
        for slot in self.components.values_mut() {
            slot.state_mut().set_owner(id);
        }
    }

    pub(crate) fn set_external_id(&mut self, external: Option<ExternalId>) {
        self.external_id = external;
    }

    pub(crate) fn set_parent(&mut self, parent: Option<EntityId>) {
        self.parent = parent;
    }

    pub(crate) fn push_child(&mut self, child: EntityId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    /// Drop `child` from the child list and from every tag pointing at it.
    pub(crate) fn forget_child(&mut self, child: EntityId) -> bool {
        let before = self.children.len();
        self.children.retain(|c| *c != child);
        self.tags.retain(|_, tagged| *tagged != child);
        before != self.children.len()
    }

    pub(crate) fn insert_tag(&mut self, name: String, child: EntityId) -> Option<EntityId> {
        self.tags.insert(name, child)
    }

    /// Clear hierarchy links; used when the entity leaves its manager.
    pub(crate) fn clear_links(&mut self) {
        self.parent = None;
        self.children.clear();
        self.tags.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
