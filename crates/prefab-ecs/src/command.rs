//! Command buffer for deferred structural changes.
//!
//! Controllers iterate filter members while the frame is running. Adding or
//! removing entities and components in the middle of that iteration would
//! invalidate the very membership being walked, so structural changes are
//! queued in a [`CommandBuffer`] and applied in FIFO order once every
//! controller has run.
//!
//! # Example
//!
//! ```
//! use prefab_ecs::prelude::*;
//!
//! #[derive(Debug)]
//! struct Highlight;
//! impl Component for Highlight {
//!     const KIND: ComponentKind = ComponentKind::new("Highlight");
//! }
//!
//! let mut manager = EntityManager::new();
//! manager.register_component::<Highlight>().unwrap();
//! let button = manager.create_entity("button");
//!
//! let mut cmds = CommandBuffer::new();
//! cmds.add_component(button, Highlight);
//! cmds.add_to_group(button, "hovered");
//!
//! let report = cmds.apply(&mut manager);
//! assert_eq!(report.success_count, 2);
//! assert!(manager.has_component(button, Highlight::KIND));
//! assert_eq!(manager.get_all_using_group_name("hovered"), vec![button]);
//! ```

use std::collections::HashMap;

use tracing::warn;

use crate::component::{AnyComponent, Component, ComponentKind};
use crate::entity::{Entity, EntityId};
use crate::manager::EntityManager;
use crate::EcsError;

// ---------------------------------------------------------------------------
// CommandKind
// ---------------------------------------------------------------------------

/// The mutation a command performs.
#[derive(Debug)]
pub enum CommandKind {
    /// Register a detached entity.
    Spawn { entity: Entity },
    /// Remove the target and its descendants.
    Despawn,
    /// Attach (or replace) a component on the target.
    AddComponent { component: Box<dyn AnyComponent> },
    /// Detach a component from the target.
    RemoveComponent { kind: ComponentKind },
    /// Set a component's dirty flag.
    SetDirty { kind: ComponentKind, dirty: bool },
    /// Add the target to a group.
    AddToGroup { group: String },
    /// Remove the target from a group.
    RemoveFromGroup { group: String },
    /// Make `child` a child of the target.
    AddChild { child: EntityId },
}

impl CommandKind {
    /// The component kind a command writes, for conflict detection.
    fn component_kind(&self) -> Option<ComponentKind> {
        match self {
            CommandKind::AddComponent { component } => Some(component.kind()),
            CommandKind::RemoveComponent { kind } | CommandKind::SetDirty { kind, .. } => {
                Some(*kind)
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A single deferred mutation.
#[derive(Debug)]
pub struct Command {
    /// Which entity this command targets. `None` for spawns.
    pub target: Option<EntityId>,
    pub kind: CommandKind,
    /// Sequential index within the buffer (set on insertion).
    pub command_index: u32,
}

// ---------------------------------------------------------------------------
// ApplyReport
// ---------------------------------------------------------------------------

/// Summary of one [`CommandBuffer::apply`] call.
///
/// `conflict_count` counts (entity, component kind) pairs written by more
/// than one command. The last command wins; conflicts are warnings, not
/// errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub conflict_count: usize,
    pub failed_count: usize,
    pub success_count: usize,
    /// Ids assigned to spawned entities, in command order.
    pub spawned: Vec<EntityId>,
}

// ---------------------------------------------------------------------------
// CommandBuffer
// ---------------------------------------------------------------------------

/// Collects commands during a frame and applies them in insertion order.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
    next_index: u32,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, target: Option<EntityId>, kind: CommandKind) {
        let command_index = self.next_index;
        self.next_index += 1;
        self.commands.push(Command {
            target,
            kind,
            command_index,
        });
    }

    /// Queue registration of a detached entity. Its id is reported in
    /// [`ApplyReport::spawned`].
    pub fn spawn(&mut self, entity: Entity) {
        self.push(None, CommandKind::Spawn { entity });
    }

    pub fn despawn(&mut self, target: EntityId) {
        self.push(Some(target), CommandKind::Despawn);
    }

    pub fn add_component<T: Component>(&mut self, target: EntityId, component: T) {
        self.push(
            Some(target),
            CommandKind::AddComponent {
                component: Box::new(component),
            },
        );
    }

    pub fn remove_component(&mut self, target: EntityId, kind: ComponentKind) {
        self.push(Some(target), CommandKind::RemoveComponent { kind });
    }

    pub fn set_dirty(&mut self, target: EntityId, kind: ComponentKind, dirty: bool) {
        self.push(Some(target), CommandKind::SetDirty { kind, dirty });
    }

    pub fn add_to_group(&mut self, target: EntityId, group: &str) {
        self.push(
            Some(target),
            CommandKind::AddToGroup {
                group: group.to_owned(),
            },
        );
    }

    pub fn remove_from_group(&mut self, target: EntityId, group: &str) {
        self.push(
            Some(target),
            CommandKind::RemoveFromGroup {
                group: group.to_owned(),
            },
        );
    }

    pub fn add_child(&mut self, parent: EntityId, child: EntityId) {
        self.push(Some(parent), CommandKind::AddChild { child });
    }

    /// Queued commands in insertion order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drop every queued command without applying it.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.next_index = 0;
    }

    /// Apply all commands to the manager in insertion order and empty the
    /// buffer.
    ///
    /// Commands that target entities removed earlier (in this batch or
    /// before) fail with a warning and are counted in the report; they never
    /// abort the batch.
    pub fn apply(&mut self, manager: &mut EntityManager) -> ApplyReport {
        let commands = std::mem::take(&mut self.commands);
        self.next_index = 0;

        let mut report = ApplyReport {
            conflict_count: count_conflicts(&commands),
            ..ApplyReport::default()
        };

        for cmd in commands {
            let index = cmd.command_index;
            let target = cmd.target;
            match apply_one(manager, cmd) {
                Ok(spawned) => {
                    report.success_count += 1;
                    report.spawned.extend(spawned);
                }
                Err(e) => {
                    report.failed_count += 1;
                    warn!(
                        command_index = index,
                        target = ?target,
                        error = %e,
                        "command application failed"
                    );
                }
            }
        }
        report
    }
}

fn count_conflicts(commands: &[Command]) -> usize {
    let mut seen: HashMap<(EntityId, ComponentKind), Vec<u32>> = HashMap::new();
    for cmd in commands {
        if let (Some(target), Some(kind)) = (cmd.target, cmd.kind.component_kind()) {
            seen.entry((target, kind))
                .or_default()
                .push(cmd.command_index);
        }
    }

    let mut conflicts = 0;
    for ((entity, kind), indices) in &seen {
        if indices.len() > 1 {
            conflicts += 1;
            warn!(
                entity = %entity,
                kind = %kind,
                command_indices = ?indices,
                "conflict: {} commands target the same entity+kind (last-write-wins)",
                indices.len()
            );
        }
    }
    conflicts
}

/// Apply one command. Returns the spawned id for spawns.
fn apply_one(manager: &mut EntityManager, cmd: Command) -> Result<Option<EntityId>, EcsError> {
    let (target, kind) = match (cmd.target, cmd.kind) {
        (_, CommandKind::Spawn { entity }) => return manager.add_entity(entity).map(Some),
        (Some(target), kind) => {
            if !manager.contains(target) {
                return Err(EcsError::StaleEntity { entity: target });
            }
            (target, kind)
        }
        // Only spawns are queued without a target.
        (None, kind) => unreachable!("targetless command {kind:?}"),
    };

    match kind {
        CommandKind::Despawn => {
            manager.remove_entity(target);
        }
        CommandKind::AddComponent { component } => {
            manager.add_boxed_component(target, component)?;
        }
        CommandKind::RemoveComponent { kind } => {
            // Removing an absent component is a no-op, not a failure.
            manager.remove_component(target, kind);
        }
        CommandKind::SetDirty { kind, dirty } => {
            manager.set_dirty(target, kind, dirty);
        }
        CommandKind::AddToGroup { group } => {
            manager.add_entity_to_group(target, &group)?;
        }
        CommandKind::RemoveFromGroup { group } => {
            manager.remove_entity_from_group(target, &group);
        }
        CommandKind::AddChild { child } => {
            manager.add_child(target, child)?;
        }
        CommandKind::Spawn { .. } => unreachable!("spawns return above"),
    }
    Ok(None)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
