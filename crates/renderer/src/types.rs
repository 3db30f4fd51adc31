use shadertoy::{ChannelInput, RenderPass};

pub use shadertoy::CHANNEL_COUNT;

/// Enumerates the texture dimensionality requirements for a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ChannelTextureKind {
    #[default]
    Texture2d,
    Cubemap,
    Volume,
}

impl ChannelTextureKind {
    /// GLSL texture type used for the separate texture binding.
    pub fn glsl_texture(self) -> &'static str {
        match self {
            ChannelTextureKind::Texture2d => "texture2D",
            ChannelTextureKind::Cubemap => "textureCube",
            ChannelTextureKind::Volume => "texture3D",
        }
    }

    /// GLSL combined sampler constructor exposed as `iChannelN`.
    pub fn glsl_sampler(self) -> &'static str {
        match self {
            ChannelTextureKind::Texture2d => "sampler2D",
            ChannelTextureKind::Cubemap => "samplerCube",
            ChannelTextureKind::Volume => "sampler3D",
        }
    }
}

/// Resolves the sampler kind of each channel a pass declares.
///
/// Channels default to 2D; cubemap inputs become cube samplers and procedural
/// volumes become 3D samplers.
pub fn channel_kinds(pass: &RenderPass) -> [ChannelTextureKind; CHANNEL_COUNT] {
    let mut kinds = [ChannelTextureKind::Texture2d; CHANNEL_COUNT];
    for binding in &pass.inputs {
        let Some(kind) = kinds.get_mut(binding.channel) else {
            continue;
        };
        match binding.input {
            ChannelInput::Cubemap { .. } => *kind = ChannelTextureKind::Cubemap,
            ChannelInput::Volume { .. } => *kind = ChannelTextureKind::Volume,
            _ => {}
        }
    }
    kinds
}

/// Window host configuration.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub surface_size: (u32, u32),
    pub window_title: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            surface_size: (1280, 720),
            window_title: "walltoy".to_string(),
        }
    }
}
