//! Headless UI panel demo -- a dialog with tagged buttons, a layout pass and a
//! scripted pointer, printing the final index snapshot.
//!
//! Run with:
//!   cargo run --example ui_panel -p prefab-engine [-- path/to/frame_config.json]
//!
//! Set `RUST_LOG=debug` to watch filters being bound and commands applied.

use prefab_engine::prelude::*;
use tracing::info;

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Rect {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
}

impl Component for Rect {
    const KIND: ComponentKind = ComponentKind::new("Rect");
}

#[derive(Debug, Clone)]
struct Text(String);

impl Component for Text {
    const KIND: ComponentKind = ComponentKind::new("Text");
}

#[derive(Debug, Clone, Default)]
struct Button {
    hovered: bool,
    clicks: u32,
}

impl Component for Button {
    const KIND: ComponentKind = ComponentKind::new("Button");
}

/// Scripted pointer position, one sample per frame.
struct PointerScript(Vec<(f32, f32, bool)>);

// ---------------------------------------------------------------------------
// Controllers
// ---------------------------------------------------------------------------

/// Sizes dirty text rects from their string length.
struct TextLayout {
    binding: Option<ControllerBinding>,
}

impl Controller for TextLayout {
    fn name(&self) -> &str {
        "text_layout"
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), ControllerError> {
        let Some(binding) = &self.binding else {
            return Ok(());
        };
        binding.for_each(ctx.manager, |m, id| -> Result<(), ControllerError> {
            if m.is_dirty(id, Text::KIND) != Some(true) {
                return Ok(());
            }
            let width = m.component::<Text>(id).map_or(0.0, |t| t.0.len() as f32 * 7.0);
            if let Some(rect) = m.component_mut::<Rect>(id) {
                rect.w = width + 12.0;
            }
            m.set_dirty(id, Text::KIND, false);
            Ok(())
        })?;
        Ok(())
    }

    fn detach(&mut self, manager: &mut EntityManager) {
        if let Some(binding) = self.binding.take() {
            binding.release(manager);
        }
    }
}

/// Hover and click detection; a click on "close" despawns the dialog.
struct ButtonInput {
    binding: ControllerBinding,
    dialog: EntityId,
    was_down: bool,
}

impl Controller for ButtonInput {
    fn name(&self) -> &str {
        "button_input"
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), ControllerError> {
        let frame = ctx.frame as usize;
        let (px, py, down) = ctx
            .manager
            .resources()
            .get::<PointerScript>()
            .and_then(|script| script.0.get(frame).copied())
            .unwrap_or((0.0, 0.0, false));
        let clicked = self.was_down && !down;
        self.was_down = down;

        let close = ctx.manager.get_with_tag(self.dialog, "close");
        let commands = &mut *ctx.commands;
        self.binding.for_each(ctx.manager, |m, id| -> Result<(), ControllerError> {
            let inside = m
                .component::<Rect>(id)
                .is_some_and(|r| px >= r.x && px < r.x + r.w && py >= r.y && py < r.y + r.h);
            if let Some(button) = m.component_mut::<Button>(id) {
                button.hovered = inside;
                if inside && clicked {
                    button.clicks += 1;
                    info!(button = %id, "clicked");
                    if Some(id) == close {
                        commands.despawn(self.dialog);
                    }
                }
            }
            if inside {
                m.add_entity_to_group(id, "hovered")?;
            } else {
                m.remove_entity_from_group(id, "hovered");
            }
            Ok(())
        })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scene setup
// ---------------------------------------------------------------------------

fn spawn_button(
    manager: &mut EntityManager,
    dialog: EntityId,
    name: &str,
    label: &str,
    x: f32,
) -> anyhow::Result<EntityId> {
    let id = manager.add_entity(
        Entity::new(name)
            .with_component(Rect { x, y: 80.0, w: 0.0, h: 24.0 })
            .with_component(Text(label.to_owned()))
            .with_component(Button::default()),
    )?;
    manager.add_child(dialog, id)?;
    manager.tag_entity(dialog, id)?;
    manager.assign_external_id(id)?;
    Ok(id)
}

fn main() -> Result<(), anyhow::Error> {
    let config = match std::env::args().nth(1) {
        Some(path) => FrameConfig::load(&path)?,
        None => FrameConfig::default(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .init();

    let mut driver = FrameDriver::from_config(config)?;
    let dialog = {
        let m = driver.manager_mut();
        m.register_component::<Rect>()?;
        m.register_component::<Text>()?;
        m.register_component::<Button>()?;

        let dialog = m.add_entity(
            Entity::new("dialog").with_component(Rect { x: 0.0, y: 0.0, w: 240.0, h: 120.0 }),
        )?;
        m.assign_external_id(dialog)?;
        let title = m.add_entity(
            Entity::new("title")
                .with_component(Rect { x: 8.0, y: 8.0, w: 0.0, h: 16.0 })
                .with_component(Text("Save changes?".to_owned())),
        )?;
        m.add_child(dialog, title)?;
        m.tag_entity(dialog, title)?;

        spawn_button(m, dialog, "ok", "OK", 20.0)?;
        spawn_button(m, dialog, "close", "Close", 140.0)?;

        // Hover "OK", then press and release over "Close".
        let mut script = vec![(30.0, 90.0, false); 10];
        script.extend([(150.0, 90.0, false), (150.0, 90.0, true), (150.0, 90.0, false)]);
        m.resources_mut().insert(PointerScript(script));
        dialog
    };

    driver.add_controller_with(|m| TextLayout {
        binding: Some(ControllerBinding::new(m, &[Rect::KIND, Text::KIND])),
    });
    driver.add_controller_with(|m| ButtonInput {
        binding: ControllerBinding::new(m, &[Button::KIND, Rect::KIND]),
        dialog,
        was_down: false,
    });

    for _ in 0..10 {
        driver.frame(1.0 / 60.0)?;
    }
    println!(
        "after 10 frames: hovered = {:?}, filters = {:?}",
        driver.manager().get_all_using_group_name("hovered"),
        driver.manager().filter_names()
    );

    let applied = driver.run_frames(5, 1.0 / 60.0)?;
    println!(
        "after 15 frames: {} entities, {} commands applied, dialog alive = {}",
        driver.manager().entity_count(),
        applied,
        driver.manager().contains(dialog)
    );

    let snapshot = driver.capture_snapshot()?;
    println!("{}", snapshot.to_json()?);
    println!("state hash: {}", snapshot.hash);
    Ok(())
}
