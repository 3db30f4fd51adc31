//! `wgpu` implementation of [`GpuBackend`].
//!
//! - `context` owns the instance, device and surface configuration.
//! - `channels` creates sampled textures, feedback targets and the black
//!   stand-ins bound to empty channels.
//! - `pipeline` compiles the assembled GLSL through naga into render
//!   pipelines with one uniform group and one channel group.
//! - `uniforms` mirrors the std140 `ShaderParams` block.
//! - `bind_groups` caches channel bind groups across frames.
//!
//! A frame records every pass into one command encoder. Each pass owns its
//! program, so uniforms are written straight to the program's buffer and
//! land before the frame's commands execute.
mod bind_groups;
mod channels;
mod context;
mod pipeline;
mod uniforms;

use std::collections::HashMap;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, warn};

use crate::backend::{
    BackendError, DrawTarget, GpuBackend, ProgramError, ProgramId, ProgramSource,
    TextureDescriptor, TextureId, UniformValue,
};
use crate::error::CapabilityError;
use crate::types::CHANNEL_COUNT;

use bind_groups::BindGroupCache;
use channels::{ChannelTexture, UnboundTextures};
use context::GpuContext;
use pipeline::{PipelineLayouts, Program};

struct FrameState {
    surface: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
}

pub struct WgpuBackend {
    context: GpuContext,
    layouts: PipelineLayouts,
    unbound: UnboundTextures,
    nearest_sampler: wgpu::Sampler,
    bind_groups: BindGroupCache<wgpu::BindGroup>,
    programs: HashMap<ProgramId, Program>,
    textures: HashMap<TextureId, ChannelTexture>,
    next_id: u32,
    frame: Option<FrameState>,
    target: DrawTarget,
    program: Option<ProgramId>,
    channels: [Option<TextureId>; CHANNEL_COUNT],
}

impl WgpuBackend {
    /// Opens a device presenting to `target` at `size` pixels.
    pub fn new<T>(target: &T, size: (u32, u32)) -> Result<Self, CapabilityError>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, size)?;
        let layouts = PipelineLayouts::new(&context.device);
        let unbound = UnboundTextures::new(&context.device, &context.queue);
        let nearest_sampler = channels::create_nearest_sampler(&context.device);
        Ok(Self {
            context,
            layouts,
            unbound,
            nearest_sampler,
            bind_groups: BindGroupCache::default(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            next_id: 1,
            frame: None,
            target: DrawTarget::Surface,
            program: None,
            channels: [None; CHANNEL_COUNT],
        })
    }

    /// Reapplies the surface configuration after the surface was lost.
    pub fn reconfigure_surface(&self) {
        self.context.reconfigure();
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }
}

impl GpuBackend for WgpuBackend {
    fn surface_size(&self) -> (u32, u32) {
        self.context.size()
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.context.resize(width, height);
    }

    fn compile_program(
        &mut self,
        label: &str,
        source: &ProgramSource,
    ) -> Result<ProgramId, ProgramError> {
        let program = pipeline::build_program(
            &self.context.device,
            &self.layouts,
            self.context.surface_format,
            self.context.float32_filterable,
            label,
            source,
        )?;
        let id = ProgramId(self.allocate_id());
        self.programs.insert(id, program);
        debug!(program = label, ?id, "linked program");
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if let Some(program) = self.programs.remove(&program) {
            program.destroy();
        }
        self.bind_groups.remove_program(program);
        if self.program == Some(program) {
            self.program = None;
        }
    }

    fn create_texture(
        &mut self,
        desc: &TextureDescriptor<'_>,
        layers: &[&[u8]],
    ) -> Result<TextureId, BackendError> {
        desc.validate(layers, self.context.device.limits().max_texture_dimension_2d)?;
        let texture = channels::create_static(&self.context.device, &self.context.queue, desc, layers)
            .ok_or_else(|| BackendError::InvalidTexture(desc.label.to_string()))?;
        let id = TextureId(self.allocate_id());
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn create_render_target(&mut self, label: &str, width: u32, height: u32) -> TextureId {
        let texture = channels::create_render_target(&self.context.device, label, width, height);
        let id = TextureId(self.allocate_id());
        self.textures.insert(id, texture);
        id
    }

    fn resize_render_target(
        &mut self,
        target: TextureId,
        width: u32,
        height: u32,
    ) -> Result<(), BackendError> {
        let entry = self
            .textures
            .get_mut(&target)
            .filter(|texture| texture.render_target)
            .ok_or(BackendError::UnknownTexture(target))?;
        let label = format!("feedback target {}", target.0);
        let replacement = channels::create_render_target(&self.context.device, &label, width, height);
        entry.destroy();
        *entry = replacement;
        self.bind_groups.invalidate_texture(target);
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if let Some(entry) = self.textures.remove(&texture) {
            entry.destroy();
        }
        self.bind_groups.invalidate_texture(texture);
        for channel in self.channels.iter_mut() {
            if *channel == Some(texture) {
                *channel = None;
            }
        }
    }

    fn begin_frame(&mut self) -> Result<(), BackendError> {
        let surface = self
            .context
            .surface
            .get_current_texture()
            .map_err(|err| match err {
                wgpu::SurfaceError::Timeout => BackendError::Timeout,
                wgpu::SurfaceError::OutOfMemory => BackendError::OutOfMemory,
                other => {
                    debug!(error = %other, "surface unavailable");
                    BackendError::SurfaceLost
                }
            })?;
        let view = surface
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });
        self.frame = Some(FrameState {
            surface,
            view,
            encoder,
        });
        Ok(())
    }

    fn bind_target(&mut self, target: DrawTarget) {
        self.target = target;
    }

    fn bind_program(&mut self, program: ProgramId) {
        self.program = Some(program);
    }

    fn set_uniform(&mut self, value: UniformValue) {
        if let Some(program) = self.program.and_then(|id| self.programs.get_mut(&id)) {
            program.params.apply(value);
        }
    }

    fn bind_channel(&mut self, channel: usize, texture: Option<TextureId>) {
        if let Some(slot) = self.channels.get_mut(channel) {
            *slot = texture;
        }
    }

    fn draw_fullscreen(&mut self) -> Result<(), BackendError> {
        let frame = self
            .frame
            .as_mut()
            .ok_or(BackendError::NoFrame("draw_fullscreen"))?;
        let program_id = self
            .program
            .ok_or(BackendError::NoFrame("draw_fullscreen"))?;
        let program = self
            .programs
            .get(&program_id)
            .ok_or(BackendError::UnknownProgram(program_id))?;
        let device = &self.context.device;
        let textures = &self.textures;
        let unbound = &self.unbound;
        let nearest_sampler = &self.nearest_sampler;

        // Built on first use of this channel set, so a mismatch warns once.
        let channel_group = self.bind_groups.get_or_insert_with(program_id, self.channels, || {
            let mut entries = Vec::with_capacity(CHANNEL_COUNT * 2);
            for (channel, bound) in self.channels.iter().enumerate() {
                let kind = program.channel_kinds[channel];
                let texture = match bound.and_then(|id| textures.get(&id)) {
                    Some(texture) if texture.kind == kind => texture,
                    Some(_) => {
                        warn!(channel, ?kind, "channel texture does not match the sampler type");
                        unbound.get(kind)
                    }
                    None => unbound.get(kind),
                };
                let sampler = if program.nearest_channels[channel] {
                    nearest_sampler
                } else {
                    &texture.sampler
                };
                entries.push(wgpu::BindGroupEntry {
                    binding: (channel as u32) * 2,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                });
                entries.push(wgpu::BindGroupEntry {
                    binding: (channel as u32) * 2 + 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                });
            }
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("channel bind group"),
                layout: &program.channel_layout,
                entries: &entries,
            })
        });

        self.context
            .queue
            .write_buffer(&program.uniform_buffer, 0, program.params.as_bytes());

        let view = match self.target {
            DrawTarget::Surface => &frame.view,
            DrawTarget::Texture(id) => {
                &self
                    .textures
                    .get(&id)
                    .filter(|texture| texture.render_target)
                    .ok_or(BackendError::UnknownTexture(id))?
                    .view
            }
        };
        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("shader pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&program.pipeline);
        pass.set_bind_group(0, &program.uniform_bind_group, &[]);
        pass.set_bind_group(1, channel_group, &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        let frame = self.frame.take().ok_or(BackendError::NoFrame("end_frame"))?;
        self.context.queue.submit(Some(frame.encoder.finish()));
        frame.surface.present();
        Ok(())
    }
}
