//! Multi-pass ShaderToy execution engine.
//!
//! ```text
//!   ShaderDescription
//!          │ ShaderRenderer::load
//!          ▼
//!   graph::Pipeline::build ──▶ loader (static textures, placeholders)
//!          │                └─▶ compile (assembled GLSL per pass)
//!          ▼
//!   ShaderRenderer::render ──▶ scheduler::execute_frame
//!                                 │ per pass: target, program, uniforms,
//!                                 │ channels, draw, swap
//!                                 ▼
//!                             GpuBackend (wgpu or the test mock)
//! ```
//!
//! Buffer passes run in declaration order before the image pass. Each
//! feedback slot is double buffered; other passes only ever sample the front
//! side, so a buffer's contents lag one frame behind any earlier pass that
//! reads it.

mod backend;
mod compile;
mod error;
mod gpu;
mod graph;
mod loader;
mod renderer;
mod scheduler;
mod types;
mod uniforms;
mod window;

pub use backend::{
    BackendError, DrawTarget, GpuBackend, ProgramError, ProgramId, ProgramSource, ShaderStage,
    TargetKind, TextureDescriptor, TextureDimension, TextureId, UniformValue,
};
pub use compile::{build_program_source, VERTEX_SHADER_GLSL};
pub use error::{AssetError, CapabilityError, LoadError};
pub use gpu::WgpuBackend;
pub use loader::{cubemap_face_paths, PLACEHOLDER_RGBA};
pub use renderer::ShaderRenderer;
pub use types::{channel_kinds, ChannelTextureKind, RendererConfig, CHANNEL_COUNT};
pub use uniforms::{
    date_uniform, FrameInputs, FrameTiming, MouseState, StandardUniform, UniformUsage,
    SAMPLE_RATE,
};
pub use window::run_window;
