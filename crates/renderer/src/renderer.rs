use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use shadertoy::{AssetSource, ShaderDescription};
use tracing::{debug, info};

use crate::backend::{BackendError, GpuBackend};
use crate::error::LoadError;
use crate::graph::Pipeline;
use crate::scheduler::{execute_frame, FrameClock};
use crate::uniforms::{date_uniform, FrameInputs};

/// Plays one loaded shader on a [`GpuBackend`].
///
/// `load` builds a complete pipeline before touching the active one, so a
/// failed load leaves the previous shader running. `render` is a no-op until
/// the first successful load.
pub struct ShaderRenderer<B: GpuBackend> {
    backend: B,
    assets: Arc<dyn AssetSource>,
    pipeline: Option<Pipeline>,
    clock: FrameClock,
    mouse: [f32; 4],
    stats: RenderStats,
}

#[derive(Debug)]
struct RenderStats {
    frames_since_update: u32,
    last_update: Instant,
}

impl RenderStats {
    fn record(&mut self, now: Instant, frame: u32, time: f32) {
        self.frames_since_update += 1;
        let elapsed = now.saturating_duration_since(self.last_update);
        if elapsed >= Duration::from_secs(1) {
            let fps = self.frames_since_update as f32 / elapsed.as_secs_f32();
            debug!(fps = fps.round(), frame, time, "render stats");
            self.frames_since_update = 0;
            self.last_update = now;
        }
    }
}

impl<B: GpuBackend> ShaderRenderer<B> {
    pub fn new(backend: B, assets: Arc<dyn AssetSource>) -> Self {
        let now = Instant::now();
        Self {
            backend,
            assets,
            pipeline: None,
            clock: FrameClock::new(now),
            mouse: [0.0; 4],
            stats: RenderStats {
                frames_since_update: 0,
                last_update: now,
            },
        }
    }

    /// Compiles and resources every pass of `description`. On success the
    /// previous pipeline is released and the frame counter restarts at 0.
    pub fn load(&mut self, description: &ShaderDescription) -> Result<(), LoadError> {
        let pipeline = Pipeline::build(&mut self.backend, self.assets.as_ref(), description)?;
        if let Some(mut previous) = self.pipeline.replace(pipeline) {
            previous.release(&mut self.backend);
        }
        self.clock.reset_frames();
        info!(
            shader = %description.info.id,
            name = %description.info.name,
            passes = self.pipeline.as_ref().map_or(0, |p| p.passes.len()),
            "shader loaded"
        );
        Ok(())
    }

    pub fn render(&mut self) -> Result<(), BackendError> {
        self.render_at(Instant::now())
    }

    pub(crate) fn render_at(&mut self, now: Instant) -> Result<(), BackendError> {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Ok(());
        };
        let resolution = self.backend.surface_size();
        if resolution.0 == 0 || resolution.1 == 0 {
            return Ok(());
        }
        let timing = self.clock.tick(now);
        let inputs = FrameInputs {
            resolution,
            timing,
            mouse: self.mouse,
            date: date_uniform(&Local::now()),
        };
        execute_frame(&mut self.backend, pipeline, &inputs)?;
        self.clock.advance();
        self.stats.record(now, timing.frame, timing.time);
        Ok(())
    }

    /// Resizes the surface and every feedback slot. Repeating the same size
    /// is a no-op and keeps buffer contents.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), BackendError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.backend.resize_surface(width, height);
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.slots.resize_all(&mut self.backend, width, height)?;
        }
        Ok(())
    }

    /// ShaderToy `iMouse` value for the following frames.
    pub fn set_mouse(&mut self, mouse: [f32; 4]) {
        self.mouse = mouse;
    }

    /// Index of the next frame to render.
    pub fn frame(&self) -> u32 {
        self.clock.frame()
    }

    pub fn is_loaded(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: GpuBackend> Drop for ShaderRenderer<B> {
    fn drop(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.release(&mut self.backend);
        }
    }
}
