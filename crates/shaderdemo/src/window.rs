use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use presets::PresetCatalog;
use renderer::{Effect, LoadStrategy, Point2, SurfaceError, WgpuBackend};
use tracing::error;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use crate::app::App;

#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    pub size: (u32, u32),
    pub texture_loading: LoadStrategy,
}

fn title(preset: &str) -> String {
    format!("shaderdemo: {preset}")
}

/// Opens the demo window and drives it until it is closed.
pub fn run(config: WindowConfig, catalog: PresetCatalog, start: usize) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let (width, height) = config.size;
    let start_name = catalog
        .get(start)
        .map(|preset| preset.name.clone())
        .unwrap_or_default();
    let window = WindowBuilder::new()
        .with_title(title(&start_name))
        .with_inner_size(PhysicalSize::new(width, height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create demo window: {err}"))?;
    let window = Arc::new(window);

    let backend = WgpuBackend::new(window.clone()).context("failed to initialise renderer")?;
    let size = backend.surface_size();
    let effect = Effect::new(backend, size.width, size.height, config.texture_loading)
        .context("failed to build default effect")?;
    let mut app = App::new(effect, catalog, start);
    window.request_redraw();

    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    elwt.exit();
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if event.state == ElementState::Released
                        && matches!(event.logical_key, Key::Named(NamedKey::Space))
                    {
                        let name = app.cycle_preset().to_string();
                        window.set_title(&title(&name));
                    }
                }
                WindowEvent::CursorMoved { position, .. } => {
                    app.input_mut()
                        .pointer_move(Point2::new(position.x as f32, position.y as f32));
                }
                WindowEvent::MouseInput {
                    state,
                    button: MouseButton::Left,
                    ..
                } => match state {
                    ElementState::Pressed => app.input_mut().pointer_down(),
                    ElementState::Released => app.input_mut().pointer_up(),
                },
                WindowEvent::Resized(new_size) => {
                    if new_size.width > 0 && new_size.height > 0 {
                        app.resize(new_size.width, new_size.height);
                    }
                }
                WindowEvent::RedrawRequested => match app.render() {
                    Ok(()) => {}
                    Err(SurfaceError::Lost | SurfaceError::Outdated) => {
                        let (width, height) = app.effect().resolution();
                        tracing::debug!(width, height, "surface lost; reconfiguring");
                        app.effect_mut().backend_mut().reconfigure();
                    }
                    Err(SurfaceError::OutOfMemory) => {
                        error!("surface out of memory; exiting");
                        elwt.exit();
                    }
                    Err(SurfaceError::Timeout) => {
                        tracing::warn!("surface timeout; retrying next frame");
                    }
                    Err(other) => {
                        tracing::warn!("surface error: {other:?}; retrying next frame");
                    }
                },
                _ => {}
            },
            Event::AboutToWait => {
                window.request_redraw();
                elwt.set_control_flow(ControlFlow::Wait);
            }
            _ => {}
        })
        .map_err(|err| anyhow!("window event loop error: {err}"))
}
