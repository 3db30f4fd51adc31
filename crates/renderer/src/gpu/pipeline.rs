use std::borrow::Cow;

use wgpu::naga::ShaderStage as NagaStage;

use crate::backend::{ProgramError, ProgramSource, ShaderStage, TargetKind};
use crate::types::{ChannelTextureKind, CHANNEL_COUNT};

use super::channels::FEEDBACK_FORMAT;
use super::uniforms::{ShaderParams, SHADER_PARAMS_SIZE};

/// Defined for programs that draw to the visible surface.
const SURFACE_PASS_DEFINE: &str = "#define WALLTOY_SURFACE_PASS\n";

pub(crate) struct PipelineLayouts {
    pub uniform_layout: wgpu::BindGroupLayout,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(SHADER_PARAMS_SIZE),
                },
                count: None,
            }],
        });
        Self { uniform_layout }
    }
}

/// One linked program: its pipeline, channel layout and uniform state.
pub(crate) struct Program {
    pub pipeline: wgpu::RenderPipeline,
    pub channel_layout: wgpu::BindGroupLayout,
    pub channel_kinds: [ChannelTextureKind; CHANNEL_COUNT],
    /// Channels laid out as non-filtering; they bind the nearest sampler.
    pub nearest_channels: [bool; CHANNEL_COUNT],
    pub uniform_buffer: wgpu::Buffer,
    pub uniform_bind_group: wgpu::BindGroup,
    pub params: ShaderParams,
}

impl Program {
    pub fn destroy(&self) {
        self.uniform_buffer.destroy();
    }
}

/// Compiles both stages through naga and builds the render pipeline.
/// Validation errors are captured with error scopes and reported per stage.
pub(crate) fn build_program(
    device: &wgpu::Device,
    layouts: &PipelineLayouts,
    surface_format: wgpu::TextureFormat,
    float32_filterable: bool,
    label: &str,
    source: &ProgramSource,
) -> Result<Program, ProgramError> {
    let vertex = compile_stage(device, label, &source.vertex, ShaderStage::Vertex)?;
    let fragment_source = match source.target {
        TargetKind::Surface => insert_after_version(&source.fragment, SURFACE_PASS_DEFINE),
        TargetKind::Feedback => source.fragment.clone(),
    };
    let fragment = compile_stage(device, label, &fragment_source, ShaderStage::Fragment)?;

    let nearest_channels = nearest_channels(&source.feedback_channels, float32_filterable);
    let channel_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("channel layout"),
        entries: &build_channel_layout_entries(&source.channel_kinds, &nearest_channels),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[&layouts.uniform_layout, &channel_layout],
        push_constant_ranges: &[],
    });
    let format = match source.target {
        TargetKind::Surface => surface_format,
        TargetKind::Feedback => FEEDBACK_FORMAT,
    };

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &vertex,
            entry_point: Some("main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &fragment,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(ProgramError::Link {
            log: err.to_string(),
        });
    }

    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("shader params"),
        size: SHADER_PARAMS_SIZE,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("shader params"),
        layout: &layouts.uniform_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: uniform_buffer.as_entire_binding(),
        }],
    });

    Ok(Program {
        pipeline,
        channel_layout,
        channel_kinds: source.channel_kinds,
        nearest_channels,
        uniform_buffer,
        uniform_bind_group,
        params: bytemuck::Zeroable::zeroed(),
    })
}

fn compile_stage(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    stage: ShaderStage,
) -> Result<wgpu::ShaderModule, ProgramError> {
    let naga_stage = match stage {
        ShaderStage::Vertex => NagaStage::Vertex,
        ShaderStage::Fragment => NagaStage::Fragment,
    };
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(source.to_string()),
            stage: naga_stage,
            defines: &[],
        },
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(ProgramError::Compile {
            stage,
            log: err.to_string(),
        }),
        None => Ok(module),
    }
}

/// Inserts `line` directly after the leading `#version` directive.
fn insert_after_version(source: &str, line: &str) -> String {
    match source.split_once('\n') {
        Some((first, rest)) if first.trim_start().starts_with("#version") => {
            format!("{first}\n{line}{rest}")
        }
        _ => format!("{line}{source}"),
    }
}

/// Feedback channels fall back to unfiltered sampling when the device cannot
/// filter `Rgba32Float`.
fn nearest_channels(
    feedback: &[bool; CHANNEL_COUNT],
    float32_filterable: bool,
) -> [bool; CHANNEL_COUNT] {
    std::array::from_fn(|channel| feedback[channel] && !float32_filterable)
}

pub(crate) fn build_channel_layout_entries(
    kinds: &[ChannelTextureKind; CHANNEL_COUNT],
    nearest: &[bool; CHANNEL_COUNT],
) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(CHANNEL_COUNT * 2);
    for (index, (kind, &nearest)) in kinds.iter().zip(nearest).enumerate() {
        let view_dimension = match kind {
            ChannelTextureKind::Texture2d => wgpu::TextureViewDimension::D2,
            ChannelTextureKind::Cubemap => wgpu::TextureViewDimension::Cube,
            ChannelTextureKind::Volume => wgpu::TextureViewDimension::D3,
        };
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: (index as u32) * 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float {
                    filterable: !nearest,
                },
                view_dimension,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: (index as u32) * 2 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(if nearest {
                wgpu::SamplerBindingType::NonFiltering
            } else {
                wgpu::SamplerBindingType::Filtering
            }),
            count: None,
        });
    }
    entries
}
