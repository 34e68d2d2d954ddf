//! The controller contract and the helpers controllers use to reach their
//! entities.
//!
//! A controller is one stage of per-frame logic (camera update, UI layout,
//! hit testing). It binds to the manager through a [`ControllerBinding`],
//! which registers (or shares) the filter for its required component set, and
//! is driven once per frame through [`Controller::update`].
//!
//! Iteration helpers visit a *snapshot* of the selected ids, so a controller
//! may add or remove entities while iterating. Entities removed during the
//! visit are skipped; entities added during the visit are not visited.

use tracing::debug;

use crate::command::CommandBuffer;
use crate::component::ComponentKind;
use crate::entity::EntityId;
use crate::event::EntityEvent;
use crate::manager::EntityManager;
use crate::EcsError;

// ---------------------------------------------------------------------------
// ControllerError
// ---------------------------------------------------------------------------

/// Errors a controller's `update` can return.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Ecs(#[from] EcsError),

    #[error("controller '{controller}' failed: {message}")]
    Failed { controller: String, message: String },

    /// Any other error source, e.g. a converted `anyhow::Error`.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ControllerError {
    pub fn failed(controller: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            controller: controller.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// FrameContext / Controller
// ---------------------------------------------------------------------------

/// Everything a controller sees during one frame.
pub struct FrameContext<'a> {
    pub manager: &'a mut EntityManager,
    /// Deferred structural changes, applied after every controller has run.
    pub commands: &'a mut CommandBuffer,
    /// Events raised since the previous frame started, oldest first.
    pub events: &'a [EntityEvent],
    /// Seconds since the previous frame (already clamped by the driver).
    pub elapsed: f64,
    /// Zero-based index of the frame being run.
    pub frame: u64,
}

/// A per-frame update unit.
///
/// `update` has no default body: every controller must provide one.
pub trait Controller {
    /// Unique name within a frame driver; used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Run one frame of this controller's logic.
    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), ControllerError>;

    /// Called when the controller is removed from its driver. Controllers
    /// holding a [`ControllerBinding`] release it here.
    fn detach(&mut self, _manager: &mut EntityManager) {}
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// What a controller iterates: the entities carrying a component set, the
/// members of a named filter, or the members of a named group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Components(Vec<ComponentKind>),
    Filter(String),
    Group(String),
}

impl Selector {
    pub fn components(kinds: &[ComponentKind]) -> Self {
        Self::Components(kinds.to_vec())
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::Group(name.into())
    }

    /// Snapshot of the selected ids, ascending.
    ///
    /// A component selector registers its filter on first use. A missing
    /// group selects nothing; a missing named filter is an error since it
    /// can only come from a typo or a released binding.
    pub fn resolve(&self, manager: &mut EntityManager) -> Result<Vec<EntityId>, EcsError> {
        match self {
            Selector::Components(kinds) => Ok(manager.get_all_using_components(kinds)),
            Selector::Filter(name) => match manager.filter(name) {
                Some(filter) => Ok(filter.members().collect()),
                None => Err(EcsError::UnknownFilter { name: name.clone() }),
            },
            Selector::Group(name) => Ok(manager.get_all_using_group_name(name)),
        }
    }
}

impl From<&[ComponentKind]> for Selector {
    fn from(kinds: &[ComponentKind]) -> Self {
        Self::components(kinds)
    }
}

/// A bare string selects a group, a component list selects a filter.
impl From<&str> for Selector {
    fn from(name: &str) -> Self {
        Self::group(name)
    }
}

/// Call `f` once per selected entity, ascending by id.
///
/// Ids are snapshotted before the first call; entities no longer registered
/// when their turn comes are skipped. Returns the number of entities
/// visited. The first error from `f` stops the iteration.
pub fn for_each_selected<F, E>(
    manager: &mut EntityManager,
    selector: &Selector,
    mut f: F,
) -> Result<usize, E>
where
    F: FnMut(&mut EntityManager, EntityId) -> Result<(), E>,
    E: From<EcsError>,
{
    let ids = selector.resolve(manager)?;
    let mut visited = 0;
    for id in ids {
        if !manager.contains(id) {
            continue;
        }
        f(manager, id)?;
        visited += 1;
    }
    Ok(visited)
}

// ---------------------------------------------------------------------------
// ControllerBinding
// ---------------------------------------------------------------------------

/// A controller's claim on the filter for its required component set.
///
/// Creating a binding acquires the filter (registering it on first use);
/// [`release`](Self::release) gives it back. Two bindings over the same set,
/// in any order, share one filter.
///
/// Each binding is exactly one filter user and is not `Clone`. Controllers that release in [`Controller::detach`] keep it in an
/// `Option` and `take()` it there.
#[derive(Debug, PartialEq, Eq)]
pub struct ControllerBinding {
    filter: String,
    kinds: Vec<ComponentKind>,
}

impl ControllerBinding {
    pub fn new(manager: &mut EntityManager, kinds: &[ComponentKind]) -> Self {
        let filter = manager.acquire_filter(kinds);
        debug!(filter = %filter, "controller bound");
        let mut kinds = kinds.to_vec();
        kinds.sort_unstable();
        kinds.dedup();
        Self { filter, kinds }
    }

    /// Canonical name of the bound filter.
    pub fn filter_name(&self) -> &str {
        &self.filter
    }

    /// Required kinds, sorted.
    pub fn required_kinds(&self) -> &[ComponentKind] {
        &self.kinds
    }

    pub fn selector(&self) -> Selector {
        Selector::Filter(self.filter.clone())
    }

    /// Current members of the bound filter, ascending.
    pub fn entities(&self, manager: &EntityManager) -> Vec<EntityId> {
        manager.get_all_using_filter_name(&self.filter)
    }

    /// [`for_each_selected`] over the bound filter.
    pub fn for_each<F, E>(&self, manager: &mut EntityManager, f: F) -> Result<usize, E>
    where
        F: FnMut(&mut EntityManager, EntityId) -> Result<(), E>,
        E: From<EcsError>,
    {
        for_each_selected(manager, &self.selector(), f)
    }

    /// Give the filter back. Returns `true` if this was its last user and
    /// the filter was destroyed.
    pub fn release(self, manager: &mut EntityManager) -> bool {
        manager.release_filter(&self.filter)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
