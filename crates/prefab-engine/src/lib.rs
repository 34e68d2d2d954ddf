//! Prefab Engine -- frame driver for the Prefab ECS core.
//!
//! This crate builds on [`prefab_ecs`] to provide the per-frame driver: it
//! owns an [`EntityManager`](prefab_ecs::manager::EntityManager), runs the
//! registered controllers in a fixed order, applies deferred commands via the
//! [`CommandBuffer`](prefab_ecs::command::CommandBuffer), and decides what a
//! failing controller does to the rest of the frame.
//!
//! # Quick Start
//!
//! ```
//! use prefab_engine::prelude::*;
//!
//! #[derive(Debug)]
//! struct Label(&'static str);
//! impl Component for Label {
//!     const KIND: ComponentKind = ComponentKind::new("Label");
//! }
//!
//! struct LabelCounter {
//!     binding: ControllerBinding,
//!     seen: usize,
//! }
//!
//! impl Controller for LabelCounter {
//!     fn name(&self) -> &str {
//!         "label_counter"
//!     }
//!
//!     fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), ControllerError> {
//!         self.seen = self.binding.entities(ctx.manager).len();
//!         Ok(())
//!     }
//! }
//!
//! let mut driver = FrameDriver::from_config(FrameConfig::default()).unwrap();
//! driver.manager_mut().register_component::<Label>().unwrap();
//! let title = driver.manager_mut().create_entity("title");
//! driver.manager_mut().add_component(title, Label("Prefab")).unwrap();
//!
//! driver.add_controller_with(|manager| LabelCounter {
//!     binding: ControllerBinding::new(manager, &[Label::KIND]),
//!     seen: 0,
//! });
//! driver.run_frames(100, 1.0 / 60.0).unwrap();
//! assert_eq!(driver.frame_count(), 100);
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod driver;
pub mod logging;
pub mod snapshot;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the ECS crate for convenience.
pub use prefab_ecs;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    // Re-export everything from the ECS prelude.
    pub use prefab_ecs::prelude::*;

    // Engine-specific exports.
    pub use crate::config::{ConfigError, FailurePolicy, FrameConfig};
    pub use crate::driver::{ControllerFailure, FrameDiagnostics, FrameDriver, FrameError};
    pub use crate::logging::init_tracing;
    pub use crate::snapshot::{EntityRecord, IndexSnapshot};
}
