//! The per-frame controller driver.
//!
//! The [`FrameDriver`] owns an [`EntityManager`] and a list of controllers.
//! Each call to [`frame`](FrameDriver::frame):
//!
//! 1. Clamps the elapsed time and drains the manager's event queue.
//! 2. Runs every controller in registration order, handing each the same
//!    drained events.
//! 3. Applies the deferred command buffer (FIFO).
//! 4. Advances the frame counter and accumulated time.
//!
//! Controller order is exactly registration order; there is no dependency
//! resolution. A camera controller that must run before the controller that
//! consumes its matrices is simply registered first.
//!
//! # Example
//!
//! ```
//! use prefab_engine::prelude::*;
//!
//! struct Counter(u32);
//!
//! impl Controller for Counter {
//!     fn name(&self) -> &str {
//!         "counter"
//!     }
//!
//!     fn update(&mut self, _ctx: &mut FrameContext<'_>) -> Result<(), ControllerError> {
//!         self.0 += 1;
//!         Ok(())
//!     }
//! }
//!
//! let mut driver = FrameDriver::new(EntityManager::new(), FrameConfig::default()).unwrap();
//! driver.add_controller(Counter(0));
//! driver.run_frames(10, 1.0 / 60.0).unwrap();
//! assert_eq!(driver.frame_count(), 10);
//! ```

use std::time::{Duration, Instant};

use prefab_ecs::command::{ApplyReport, CommandBuffer};
use prefab_ecs::controller::{Controller, ControllerError, FrameContext};
use prefab_ecs::manager::EntityManager;
use tracing::{debug, error};

use crate::config::{ConfigError, FailurePolicy, FrameConfig};

// ---------------------------------------------------------------------------
// FrameError
// ---------------------------------------------------------------------------

/// A frame that could not complete.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A controller failed under [`FailurePolicy::Abort`].
    #[error("controller '{controller}' failed in frame {frame}")]
    Controller {
        controller: String,
        frame: u64,
        #[source]
        source: ControllerError,
    },
}

// ---------------------------------------------------------------------------
// FrameDiagnostics
// ---------------------------------------------------------------------------

/// A controller failure that was isolated (logged, frame continued), or the
/// failure that aborted the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerFailure {
    pub controller: String,
    pub message: String,
}

/// Timing and outcome of the last frame.
#[derive(Debug, Clone, Default)]
pub struct FrameDiagnostics {
    /// Wall-clock time per controller, in execution order. Controllers that
    /// did not run (after an abort) are absent.
    pub controller_times: Vec<(String, Duration)>,
    pub failures: Vec<ControllerFailure>,
    /// Number of events handed to controllers this frame.
    pub events_delivered: usize,
    pub command_report: ApplyReport,
    pub command_apply_time: Duration,
    /// Total time for the frame (controllers + command apply).
    pub total_time: Duration,
    /// Elapsed seconds after clamping.
    pub elapsed: f64,
}

// ---------------------------------------------------------------------------
// FrameDriver
// ---------------------------------------------------------------------------

pub struct FrameDriver {
    manager: EntityManager,
    commands: CommandBuffer,
    controllers: Vec<Box<dyn Controller>>,
    frame_counter: u64,
    /// Sum of clamped elapsed times of completed frames.
    total_elapsed: f64,
    config: FrameConfig,
    last_diagnostics: FrameDiagnostics,
}

impl FrameDriver {
    /// Create a driver around an existing manager.
    pub fn new(manager: EntityManager, config: FrameConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            manager,
            commands: CommandBuffer::new(),
            controllers: Vec::new(),
            frame_counter: 0,
            total_elapsed: 0.0,
            config,
            last_diagnostics: FrameDiagnostics::default(),
        })
    }

    /// Create a driver with a fresh manager seeded from `config.id_seed`.
    pub fn from_config(config: FrameConfig) -> Result<Self, ConfigError> {
        let manager = EntityManager::with_seed(config.id_seed);
        Self::new(manager, config)
    }

    /// Append a controller; it runs after every controller registered
    /// before it.
    ///
    /// # Panics
    ///
    /// Panics if a controller with the same name is already registered.
    pub fn add_controller<C: Controller + 'static>(&mut self, controller: C) {
        self.add_boxed_controller(Box::new(controller));
    }

    /// Build a controller against the driver's manager (typically to create
    /// its binding) and append it.
    pub fn add_controller_with<C, F>(&mut self, build: F)
    where
        C: Controller + 'static,
        F: FnOnce(&mut EntityManager) -> C,
    {
        let controller = build(&mut self.manager);
        self.add_controller(controller);
    }

    pub fn add_boxed_controller(&mut self, controller: Box<dyn Controller>) {
        let name = controller.name().to_owned();
        assert!(
            !self.controllers.iter().any(|c| c.name() == name),
            "duplicate controller name: {name:?}"
        );
        debug!(controller = %name, position = self.controllers.len(), "controller registered");
        self.controllers.push(controller);
    }

    /// Remove a controller by name, letting it release what it holds in the
    /// manager first.
    pub fn remove_controller(&mut self, name: &str) -> Option<Box<dyn Controller>> {
        let index = self.controllers.iter().position(|c| c.name() == name)?;
        let mut controller = self.controllers.remove(index);
        controller.detach(&mut self.manager);
        debug!(controller = %name, "controller removed");
        Some(controller)
    }

    /// Run one frame.
    ///
    /// Under [`FailurePolicy::Isolate`] a failing controller is logged and
    /// recorded in the diagnostics, and the frame continues. Under
    /// [`FailurePolicy::Abort`] the frame stops at the failing controller,
    /// queued commands are discarded, the frame counter does not advance,
    /// and the frame's event batch goes back to the front of the queue so
    /// the retried frame delivers it again.
    pub fn frame(&mut self, elapsed: f64) -> Result<&FrameDiagnostics, FrameError> {
        let frame_start = Instant::now();
        let elapsed = self.config.clamp_elapsed(elapsed);
        let events = self.manager.drain_events();
        let frame = self.frame_counter;

        let mut diagnostics = FrameDiagnostics {
            controller_times: Vec::with_capacity(self.controllers.len()),
            events_delivered: events.len(),
            elapsed,
            ..FrameDiagnostics::default()
        };

        // Phase 1: run controllers in registration order.
        for controller in &mut self.controllers {
            let started = Instant::now();
            let mut ctx = FrameContext {
                manager: &mut self.manager,
                commands: &mut self.commands,
                events: &events,
                elapsed,
                frame,
            };
            let result = controller.update(&mut ctx);
            let name = controller.name().to_owned();
            diagnostics
                .controller_times
                .push((name.clone(), started.elapsed()));

            let Err(source) = result else {
                continue;
            };
            diagnostics.failures.push(ControllerFailure {
                controller: name.clone(),
                message: source.to_string(),
            });
            match self.config.failure_policy {
                FailurePolicy::Isolate => {
                    error!(controller = %name, frame, error = %source, "controller failed; continuing frame");
                }
                FailurePolicy::Abort => {
                    error!(controller = %name, frame, error = %source, "controller failed; aborting frame");
                    self.commands.clear();
                    self.manager.requeue_events(events);
                    diagnostics.total_time = frame_start.elapsed();
                    self.last_diagnostics = diagnostics;
                    return Err(FrameError::Controller {
                        controller: name,
                        frame,
                        source,
                    });
                }
            }
        }

        // Phase 2: apply deferred commands.
        let apply_start = Instant::now();
        diagnostics.command_report = self.commands.apply(&mut self.manager);
        diagnostics.command_apply_time = apply_start.elapsed();

        // Phase 3: advance.
        self.frame_counter += 1;
        self.total_elapsed += elapsed;

        diagnostics.total_time = frame_start.elapsed();
        self.last_diagnostics = diagnostics;
        Ok(&self.last_diagnostics)
    }

    /// Run `count` frames with the same elapsed time. Returns the total
    /// number of deferred commands applied successfully.
    pub fn run_frames(&mut self, count: u64, elapsed: f64) -> Result<u64, FrameError> {
        let mut applied = 0u64;
        for _ in 0..count {
            let diagnostics = self.frame(elapsed)?;
            applied += diagnostics.command_report.success_count as u64;
        }
        Ok(applied)
    }

    // -- accessors ----------------------------------------------------------

    /// Number of completed frames.
    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    /// Sum of the clamped elapsed times of completed frames, in seconds.
    pub fn total_elapsed(&self) -> f64 {
        self.total_elapsed
    }

    pub fn manager(&self) -> &EntityManager {
        &self.manager
    }

    /// Direct manager access for setup and tests. During a frame,
    /// controllers reach the manager through their [`FrameContext`].
    pub fn manager_mut(&mut self) -> &mut EntityManager {
        &mut self.manager
    }

    /// Queue commands from outside a frame; they apply at the end of the
    /// next frame.
    pub fn commands_mut(&mut self) -> &mut CommandBuffer {
        &mut self.commands
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }

    /// Controller names in execution order.
    pub fn controller_names(&self) -> Vec<&str> {
        self.controllers.iter().map(|c| c.name()).collect()
    }

    pub fn last_diagnostics(&self) -> &FrameDiagnostics {
        &self.last_diagnostics
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
