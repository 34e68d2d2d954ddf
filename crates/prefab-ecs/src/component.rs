//! Component kinds, the component contract, and the kind registry.
//!
//! Every component type carries a [`ComponentKind`] fixed at compile time via
//! [`Component::KIND`]. Kinds must be registered in a [`ComponentRegistry`]
//! (owned by the [`EntityManager`](crate::manager::EntityManager)) before a
//! component of that kind can be attached to a registered entity. The kind's
//! name is the key used by filters, so the registry rejects names that would
//! break filter-name canonicalization.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::entity::EntityId;
use crate::resources::Resources;
use crate::EcsError;

// ---------------------------------------------------------------------------
// ComponentKind
// ---------------------------------------------------------------------------

/// Stable identifier of a component type.
///
/// Ordering is lexicographic on the name, which is what filter-name
/// canonicalization relies on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ComponentKind(&'static str);

impl ComponentKind {
    /// Create a kind from its name.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The kind's name.
    #[inline]
    pub fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Debug for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentKind({})", self.0)
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

// ---------------------------------------------------------------------------
// Component contract
// ---------------------------------------------------------------------------

/// A typed data record attachable to an entity.
///
/// The lifecycle hooks run when the component moves onto or off an entity
/// that is registered with an [`EntityManager`](crate::manager::EntityManager).
/// They default to doing nothing.
pub trait Component: Any + fmt::Debug {
    /// The kind this type is stored under. At most one component per kind
    /// lives on an entity.
    const KIND: ComponentKind;

    /// Called after the component is attached to a registered entity.
    fn init(&mut self, _owner: EntityId, _resources: &mut Resources) {}

    /// Called before the component is detached from a registered entity.
    fn uninitialize(&mut self, _owner: EntityId, _resources: &mut Resources) {}
}

/// Object-safe view of a [`Component`], used for type-erased storage.
///
/// Implemented for every `T: Component`; there is no need to implement it by
/// hand.
pub trait AnyComponent: fmt::Debug {
    /// Kind of the underlying component.
    fn kind(&self) -> ComponentKind;
    /// Rust type name, for diagnostics.
    fn type_name(&self) -> &'static str;
    /// Upcast for downcasting by reference.
    fn as_any(&self) -> &dyn Any;
    /// Upcast for downcasting by mutable reference.
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Upcast for downcasting by value.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    /// Forwards to [`Component::init`].
    fn init(&mut self, owner: EntityId, resources: &mut Resources);
    /// Forwards to [`Component::uninitialize`].
    fn uninitialize(&mut self, owner: EntityId, resources: &mut Resources);
}

impl<T: Component> AnyComponent for T {
    fn kind(&self) -> ComponentKind {
        T::KIND
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn init(&mut self, owner: EntityId, resources: &mut Resources) {
        Component::init(self, owner, resources);
    }

    fn uninitialize(&mut self, owner: EntityId, resources: &mut Resources) {
        Component::uninitialize(self, owner, resources);
    }
}

impl dyn AnyComponent {
    /// Downcast to a concrete component type.
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Downcast to a concrete component type, mutably.
    pub fn downcast_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

/// Recover a concrete component from a boxed one.
///
/// Returns the box unchanged when the type does not match.
pub fn downcast_box<T: Component>(
    component: Box<dyn AnyComponent>,
) -> Result<T, Box<dyn AnyComponent>> {
    if component.as_any().is::<T>() {
        match component.into_any().downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(_) => unreachable!("type checked above"),
        }
    } else {
        Err(component)
    }
}

// ---------------------------------------------------------------------------
// ComponentState
// ---------------------------------------------------------------------------

/// Per-instance bookkeeping shared by every component: dirty flag, enabled
/// flag and owner back-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentState {
    dirty: bool,
    enabled: bool,
    owner: Option<EntityId>,
}

impl ComponentState {
    /// Fresh state: dirty, enabled, unowned.
    pub fn new() -> Self {
        Self {
            dirty: true,
            enabled: true,
            owner: None,
        }
    }

    /// Whether derived state must be recomputed before it is trusted.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The entity this component is attached to, if any.
    #[inline]
    pub fn owner(&self) -> Option<EntityId> {
        self.owner
    }

    /// Set the dirty flag.
    ///
    /// Returns `true` only on a dirty -> clean transition, which is when an
    /// "updated" notification is due. Cleaning an already clean component
    /// returns `false`.
    pub fn set_dirty(&mut self, dirty: bool) -> bool {
        let finished = self.dirty && !dirty;
        self.dirty = dirty;
        finished
    }

    /// Set the enabled flag, returning the previous value.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        std::mem::replace(&mut self.enabled, enabled)
    }

    pub(crate) fn set_owner(&mut self, owner: Option<EntityId>) {
        self.owner = owner;
    }
}

impl Default for ComponentState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// ComponentSlot
// ---------------------------------------------------------------------------

/// A component instance together with its [`ComponentState`].
#[derive(Debug)]
pub struct ComponentSlot {
    state: ComponentState,
    value: Box<dyn AnyComponent>,
}

impl ComponentSlot {
    pub(crate) fn new(value: Box<dyn AnyComponent>, owner: Option<EntityId>) -> Self {
        let mut state = ComponentState::new();
        state.set_owner(owner);
        Self { state, value }
    }

    pub fn kind(&self) -> ComponentKind {
        self.value.kind()
    }

    pub fn state(&self) -> &ComponentState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut ComponentState {
        &mut self.state
    }

    /// The type-erased component value.
    pub fn value(&self) -> &dyn AnyComponent {
        self.value.as_ref()
    }

    pub(crate) fn value_mut(&mut self) -> &mut dyn AnyComponent {
        self.value.as_mut()
    }

    /// Downcast the value to `T`.
    pub fn get<T: Component>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub(crate) fn get_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.value.downcast_mut::<T>()
    }

    /// Detach the value, discarding its state.
    pub(crate) fn into_value(self) -> Box<dyn AnyComponent> {
        self.value
    }
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Metadata about a registered component kind.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    pub kind: ComponentKind,
    /// Rust `TypeId` of the type registered under `kind`.
    pub type_id: TypeId,
    /// `std::any::type_name::<T>()`
    pub type_name: &'static str,
}

/// Registry of component kinds known to a manager.
///
/// A kind name maps to exactly one Rust type. Registering the same type twice
/// is idempotent; registering a different type under a taken name fails.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    by_name: HashMap<&'static str, ComponentInfo>,
    by_type: HashMap<TypeId, ComponentKind>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `T::KIND`.
    pub fn register<T: Component>(&mut self) -> Result<ComponentKind, EcsError> {
        let kind = T::KIND;
        validate_kind_name(kind)?;

        let type_id = TypeId::of::<T>();
        if let Some(existing) = self.by_name.get(kind.name()) {
            if existing.type_id == type_id {
                return Ok(kind);
            }
            return Err(EcsError::DuplicateComponentKind {
                kind: kind.name().to_owned(),
                existing: existing.type_name.to_owned(),
                rejected: std::any::type_name::<T>().to_owned(),
            });
        }

        self.by_name.insert(
            kind.name(),
            ComponentInfo {
                kind,
                type_id,
                type_name: std::any::type_name::<T>(),
            },
        );
        self.by_type.insert(type_id, kind);
        Ok(kind)
    }

    /// Check that a type-erased component may be stored under its kind.
    pub fn check(&self, component: &dyn AnyComponent) -> Result<(), EcsError> {
        let kind = component.kind();
        validate_kind_name(kind)?;
        match self.by_name.get(kind.name()) {
            Some(info) if info.type_id == component.as_any().type_id() => Ok(()),
            Some(info) => Err(EcsError::DuplicateComponentKind {
                kind: kind.name().to_owned(),
                existing: info.type_name.to_owned(),
                rejected: component.type_name().to_owned(),
            }),
            None => Err(EcsError::UnregisteredComponent {
                kind: kind.name().to_owned(),
                registered: self.registered_names().join(", "),
            }),
        }
    }

    /// Look up the kind registered for `T`.
    pub fn lookup<T: Component>(&self) -> Option<ComponentKind> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Look up a kind by its name, e.g. when a selector comes from data.
    pub fn lookup_by_name(&self, name: &str) -> Option<ComponentKind> {
        self.by_name.get(name).map(|info| info.kind)
    }

    pub fn get_info(&self, kind: ComponentKind) -> Option<&ComponentInfo> {
        self.by_name.get(kind.name())
    }

    pub fn contains(&self, kind: ComponentKind) -> bool {
        self.by_name.contains_key(kind.name())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Names of all registered kinds, sorted.
    pub fn registered_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.by_name.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Kind names are filter-name fragments: they must be non-empty and free of
/// whitespace and the filter separator.
fn validate_kind_name(kind: ComponentKind) -> Result<(), EcsError> {
    let name = kind.name();
    let bad_char = name
        .chars()
        .any(|c| c.is_whitespace() || c == crate::filter::FILTER_NAME_SEPARATOR);
    if name.is_empty() || bad_char {
        return Err(EcsError::InvalidComponent {
            kind: name.to_owned(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
