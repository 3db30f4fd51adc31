use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use shadertoy::{AssetSource, ShaderDescription};
use tracing::{error, info, warn};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

use crate::backend::{BackendError, GpuBackend};
use crate::gpu::WgpuBackend;
use crate::renderer::ShaderRenderer;
use crate::types::RendererConfig;
use crate::uniforms::MouseState;

/// Window host: owns the renderer and feeds it resize and mouse events.
struct WindowState {
    // Dropped before `window`; the surface borrows its handles.
    renderer: ShaderRenderer<WgpuBackend>,
    window: Arc<Window>,
    cursor: Option<PhysicalPosition<f64>>,
    mouse: MouseState,
}

impl WindowState {
    fn new(window: Arc<Window>, assets: Arc<dyn AssetSource>) -> Result<Self> {
        let size = window.inner_size();
        let backend = WgpuBackend::new(window.as_ref(), (size.width, size.height))
            .context("failed to initialise GPU")?;
        Ok(Self {
            renderer: ShaderRenderer::new(backend, assets),
            window,
            cursor: None,
            mouse: MouseState::default(),
        })
    }

    /// Cursor position with ShaderToy's bottom-left origin.
    fn shader_position(&self, position: PhysicalPosition<f64>) -> [f32; 2] {
        let height = self.renderer.backend().surface_size().1 as f32;
        [position.x as f32, height - position.y as f32]
    }

    fn handle_cursor_moved(&mut self, position: PhysicalPosition<f64>) {
        self.cursor = Some(position);
        let position = self.shader_position(position);
        self.mouse.move_to(position);
        self.renderer.set_mouse(self.mouse.as_uniform());
    }

    fn handle_mouse_button(&mut self, state: ElementState) {
        match state {
            ElementState::Pressed => {
                if let Some(cursor) = self.cursor {
                    let position = self.shader_position(cursor);
                    self.mouse.press(position);
                }
            }
            ElementState::Released => self.mouse.release(),
        }
        self.renderer.set_mouse(self.mouse.as_uniform());
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        if let Err(err) = self.renderer.resize(size.width, size.height) {
            error!(error = %err, "failed to resize feedback buffers");
        }
    }
}

/// Opens a window, loads `description` and renders it until the window
/// closes.
pub fn run_window(
    config: RendererConfig,
    assets: Arc<dyn AssetSource>,
    description: &ShaderDescription,
) -> Result<()> {
    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = WindowBuilder::new()
        .with_title(config.window_title.as_str())
        .with_inner_size(PhysicalSize::new(config.surface_size.0, config.surface_size.1))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
    let window = Arc::new(window);

    let mut state = WindowState::new(window, assets)?;
    if let Err(err) = state.renderer.load(description) {
        if let Some(assembled) = err.assembled_source() {
            tracing::debug!(source = %assembled, "assembled fragment source");
        }
        return Err(anyhow::Error::new(err)
            .context(format!("failed to load shader {}", description.info.id)));
    }
    info!(
        shader = %description.info.id,
        name = %description.info.name,
        "rendering in window"
    );

    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { window_id, event } if window_id == state.window.id() => {
                match event {
                    WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                    WindowEvent::CursorMoved { position, .. } => {
                        state.handle_cursor_moved(position);
                    }
                    WindowEvent::MouseInput {
                        state: button_state,
                        button: MouseButton::Left,
                        ..
                    } => state.handle_mouse_button(button_state),
                    WindowEvent::Resized(size) => state.resize(size),
                    WindowEvent::RedrawRequested => match state.renderer.render() {
                        Ok(()) => {}
                        Err(BackendError::SurfaceLost) => {
                            state.renderer.backend_mut().reconfigure_surface();
                        }
                        Err(BackendError::Timeout) => {
                            warn!("surface timeout; retrying next frame");
                        }
                        Err(err) => {
                            error!(error = %err, "rendering failed; closing window");
                            elwt.exit();
                        }
                    },
                    _ => {}
                }
            }
            Event::AboutToWait => {
                state.window.request_redraw();
                elwt.set_control_flow(ControlFlow::Wait);
            }
            _ => {}
        })
        .map_err(|err| anyhow!("window event loop error: {err}"))
}
