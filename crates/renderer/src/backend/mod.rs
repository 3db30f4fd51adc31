//! The seam between the pass scheduler and a concrete GPU API.
//!
//! Everything above this module speaks in opaque handles (`ProgramId`,
//! `TextureId`) and a small command vocabulary: bind a target, bind a
//! program, set uniforms, bind channel textures, draw a full-screen triangle.
//! `crate::gpu` implements it on `wgpu`; tests use an in-crate mock that
//! shades pixels on the CPU.
use shadertoy::{FilterMode, WrapMode};
use thiserror::Error;

use crate::types::{ChannelTextureKind, CHANNEL_COUNT};

#[cfg(test)]
pub(crate) mod mock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub(crate) u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u32);

/// Where a draw lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawTarget {
    /// The visible drawable at the current viewport size.
    Surface,
    /// An offscreen render target created with [`GpuBackend::create_render_target`].
    Texture(TextureId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Surface,
    Feedback,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// A fully assembled program pair ready for the backend compiler.
#[derive(Clone, Debug)]
pub struct ProgramSource {
    pub vertex: String,
    pub fragment: String,
    pub channel_kinds: [ChannelTextureKind; CHANNEL_COUNT],
    /// Channels sampling another pass's float render target.
    pub feedback_channels: [bool; CHANNEL_COUNT],
    pub target: TargetKind,
}

impl ProgramSource {
    pub fn with_feedback_channels(mut self, channels: [bool; CHANNEL_COUNT]) -> Self {
        self.feedback_channels = channels;
        self
    }
}

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("{stage} shader failed to compile: {log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("program failed to link: {log}")]
    Link { log: String },
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("surface lost or outdated")]
    SurfaceLost,
    #[error("timed out acquiring the next surface texture")]
    Timeout,
    #[error("graphics device is out of memory")]
    OutOfMemory,
    #[error("unknown texture handle {0:?}")]
    UnknownTexture(TextureId),
    #[error("unknown program handle {0:?}")]
    UnknownProgram(ProgramId),
    #[error("invalid texture data: {0}")]
    InvalidTexture(String),
    #[error("texture {label} is {width}x{height}, beyond the device limit of {limit}")]
    TextureTooLarge {
        label: String,
        width: u32,
        height: u32,
        limit: u32,
    },
    #[error("{0} called outside of a frame")]
    NoFrame(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D2,
    Cube,
}

impl TextureDimension {
    pub fn layers(self) -> usize {
        match self {
            TextureDimension::D2 => 1,
            TextureDimension::Cube => 6,
        }
    }
}

/// Description of a static RGBA8 texture. Layer data is tightly packed
/// `width * height * 4` bytes per layer, one layer per cube face.
#[derive(Clone, Copy, Debug)]
pub struct TextureDescriptor<'a> {
    pub label: &'a str,
    pub dimension: TextureDimension,
    pub width: u32,
    pub height: u32,
    pub filter: FilterMode,
    pub wrap: WrapMode,
}

impl TextureDescriptor<'_> {
    pub fn layer_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Checks `layers` against this descriptor and `max_dimension`, the
    /// device's largest 2D texture extent.
    pub fn validate(&self, layers: &[&[u8]], max_dimension: u32) -> Result<(), BackendError> {
        if self.width == 0
            || self.height == 0
            || layers.len() != self.dimension.layers()
            || layers.iter().any(|layer| layer.len() != self.layer_len())
        {
            return Err(BackendError::InvalidTexture(self.label.to_string()));
        }
        if self.width > max_dimension || self.height > max_dimension {
            return Err(BackendError::TextureTooLarge {
                label: self.label.to_string(),
                width: self.width,
                height: self.height,
                limit: max_dimension,
            });
        }
        Ok(())
    }

    /// Mip levels are only generated for `FilterMode::Mipmap`.
    pub fn mip_level_count(&self) -> u32 {
        if self.filter == FilterMode::Mipmap {
            32 - self.width.max(self.height).max(1).leading_zeros()
        } else {
            1
        }
    }
}

/// One of the standard per-frame uniforms.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Resolution([f32; 3]),
    Time(f32),
    TimeDelta(f32),
    FrameRate(f32),
    Frame(i32),
    Mouse([f32; 4]),
    Date([f32; 4]),
    SampleRate(f32),
    ChannelTime([f32; CHANNEL_COUNT]),
    ChannelResolution([[f32; 3]; CHANNEL_COUNT]),
}

pub trait GpuBackend {
    /// Current drawable size in pixels.
    fn surface_size(&self) -> (u32, u32);

    /// Reconfigures the drawable; a no-op when the size is unchanged.
    fn resize_surface(&mut self, width: u32, height: u32);

    /// Compiles both stages and links them. Stage objects never outlive
    /// this call; the returned program lives until [`Self::delete_program`].
    fn compile_program(&mut self, label: &str, source: &ProgramSource)
        -> Result<ProgramId, ProgramError>;

    fn delete_program(&mut self, program: ProgramId);

    /// Creates a sampled texture from tightly packed RGBA8 layers.
    fn create_texture(
        &mut self,
        desc: &TextureDescriptor<'_>,
        layers: &[&[u8]],
    ) -> Result<TextureId, BackendError>;

    /// Creates a floating-point texture that can be drawn into and sampled.
    fn create_render_target(&mut self, label: &str, width: u32, height: u32) -> TextureId;

    /// Reallocates a render target; previous contents are discarded.
    fn resize_render_target(
        &mut self,
        target: TextureId,
        width: u32,
        height: u32,
    ) -> Result<(), BackendError>;

    fn delete_texture(&mut self, texture: TextureId);

    fn begin_frame(&mut self) -> Result<(), BackendError>;

    fn bind_target(&mut self, target: DrawTarget);

    fn bind_program(&mut self, program: ProgramId);

    /// Updates one uniform of the bound program.
    fn set_uniform(&mut self, value: UniformValue);

    /// Binds `texture` to `channel`, or leaves the channel unbound (black).
    fn bind_channel(&mut self, channel: usize, texture: Option<TextureId>);

    fn draw_fullscreen(&mut self) -> Result<(), BackendError>;

    /// Submits the frame and presents the surface.
    fn end_frame(&mut self) -> Result<(), BackendError>;
}
