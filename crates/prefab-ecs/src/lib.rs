//! Prefab ECS -- entity/component indexing core with incremental filters.
//!
//! Entities are generic containers holding at most one component per kind.
//! Controllers ask the [`EntityManager`](manager::EntityManager) "which
//! entities carry components X, Y, Z" and get an answer from a cached,
//! incrementally maintained [`EntityFilter`](filter::EntityFilter) instead of
//! a scan. Groups are the explicit counterpart: named sets whose membership
//! callers manage by hand.
//!
//! # Quick Start
//!
//! ```
//! use prefab_ecs::prelude::*;
//!
//! #[derive(Debug)]
//! struct Transform { x: f32, y: f32 }
//! impl Component for Transform {
//!     const KIND: ComponentKind = ComponentKind::new("Transform");
//! }
//!
//! #[derive(Debug)]
//! struct Label(String);
//! impl Component for Label {
//!     const KIND: ComponentKind = ComponentKind::new("Label");
//! }
//!
//! let mut manager = EntityManager::new();
//! manager.register_component::<Transform>().unwrap();
//! manager.register_component::<Label>().unwrap();
//!
//! let title = manager.create_entity("title");
//! manager.add_component(title, Transform { x: 0.0, y: 0.0 }).unwrap();
//! manager.add_component(title, Label("Prefab".into())).unwrap();
//!
//! let labelled = manager.get_all_using_components(&[Label::KIND, Transform::KIND]);
//! assert_eq!(labelled, vec![title]);
//! ```

#![deny(unsafe_code)]

pub mod command;
pub mod component;
pub mod controller;
pub mod entity;
pub mod event;
pub mod filter;
pub mod group;
pub mod manager;
pub mod resources;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    /// The entity is not registered with this manager (removed, or never
    /// added).
    #[error("entity {entity} is not registered with this manager")]
    StaleEntity { entity: entity::EntityId },

    /// The component's kind name is empty or contains whitespace or the
    /// filter separator.
    #[error("component kind '{kind}' is not a valid kind name")]
    InvalidComponent { kind: String },

    /// A component kind was used before being registered.
    #[error("component kind '{kind}' not registered. Registered kinds: [{registered}]")]
    UnregisteredComponent { kind: String, registered: String },

    /// Two different Rust types claim the same kind name.
    #[error("component kind '{kind}' is registered to {existing}, cannot use it for {rejected}")]
    DuplicateComponentKind {
        kind: String,
        existing: String,
        rejected: String,
    },

    /// Attaching `child` under `parent` would make an entity its own
    /// ancestor.
    #[error("cannot attach {child} under {parent}: it would create a cycle")]
    HierarchyCycle {
        parent: entity::EntityId,
        child: entity::EntityId,
    },

    /// Tagging requires a direct child.
    #[error("{child} is not a child of {parent}")]
    NotAChild {
        parent: entity::EntityId,
        child: entity::EntityId,
    },

    /// A selector referenced a filter that is not registered.
    #[error("no filter named '{name}'")]
    UnknownFilter { name: String },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::command::{ApplyReport, Command, CommandBuffer, CommandKind};
    pub use crate::component::{
        AnyComponent, Component, ComponentInfo, ComponentKind, ComponentRegistry, ComponentState,
    };
    pub use crate::controller::{
        Controller, ControllerBinding, ControllerError, FrameContext, Selector,
    };
    pub use crate::entity::{Entity, EntityId, ExternalId};
    pub use crate::event::{EntityEvent, EventQueue};
    pub use crate::filter::{canonical_filter_name, EntityFilter, FilterPredicate};
    pub use crate::group::EntityGroup;
    pub use crate::manager::EntityManager;
    pub use crate::resources::Resources;
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
