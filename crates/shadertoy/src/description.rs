//! Normalized shader description shared by the store and the renderer.
//!
//! Types:
//!
//! - `ShaderDescription` holds the shader metadata, the optional common source
//!   prepended to every pass, and the ordered list of render passes.
//! - `RenderPass` is one unit of work: role, source, channel inputs and the
//!   output identifiers other passes use to sample it.
//! - `ChannelInput` is the tagged union of everything a channel can be bound to.
//! - `OutputId` is the canonical string form of a buffer identifier, whether
//!   the source document spelled it as a number or a string.
//!
//! Functions:
//!
//! - `ShaderDescription::validate` lists structural problems without failing,
//!   so callers decide which of them are fatal.
use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of texture channels exposed to every pass.
pub const CHANNEL_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassRole {
    Image,
    Buffer,
    /// Recognized so documents round-trip, never executed.
    Sound,
}

impl PassRole {
    pub fn label(self) -> &'static str {
        match self {
            PassRole::Image => "image",
            PassRole::Buffer => "buffer",
            PassRole::Sound => "sound",
        }
    }
}

/// Buffer identifier coerced to one canonical representation.
///
/// Numeric ids (`257`) and their string spelling (`"257"`) compare equal, so
/// lookups never need to try both forms.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputId(String);

impl OutputId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        match trimmed.parse::<i64>() {
            Ok(number) => Self(number.to_string()),
            Err(_) => Self(trimmed.to_string()),
        }
    }

    pub fn from_number(number: i64) -> Self {
        Self(number.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
    Mipmap,
}

impl FilterMode {
    /// Unknown spellings fall back to linear filtering.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "mipmap" => FilterMode::Mipmap,
            "nearest" => FilterMode::Nearest,
            _ => FilterMode::Linear,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WrapMode {
    #[default]
    Clamp,
    Repeat,
}

impl WrapMode {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "repeat" => WrapMode::Repeat,
            _ => WrapMode::Clamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SamplerState {
    pub filter: FilterMode,
    pub wrap: WrapMode,
    pub vflip: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChannelInput {
    Texture { src: String, sampler: SamplerState },
    Cubemap { src: String, sampler: SamplerState },
    Buffer { id: OutputId },
    /// Procedural 3D noise volume; declared as a 3D sampler but left unbound.
    Volume { src: String },
    /// Rendered as an unbound (black) channel.
    Keyboard,
}

impl ChannelInput {
    pub fn kind_label(&self) -> &'static str {
        match self {
            ChannelInput::Texture { .. } => "texture",
            ChannelInput::Cubemap { .. } => "cubemap",
            ChannelInput::Buffer { .. } => "buffer",
            ChannelInput::Volume { .. } => "volume",
            ChannelInput::Keyboard => "keyboard",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelBinding {
    pub channel: usize,
    pub input: ChannelInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderPass {
    pub name: String,
    pub role: PassRole,
    pub code: String,
    #[serde(default)]
    pub inputs: Vec<ChannelBinding>,
    #[serde(default)]
    pub outputs: Vec<OutputId>,
}

impl RenderPass {
    pub fn input(&self, channel: usize) -> Option<&ChannelInput> {
        self.inputs
            .iter()
            .find(|binding| binding.channel == channel)
            .map(|binding| &binding.input)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderInfo {
    pub id: String,
    pub name: String,
    pub author: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderDescription {
    pub info: ShaderInfo,
    pub common: Option<String>,
    pub passes: Vec<RenderPass>,
}

impl ShaderDescription {
    pub fn image_pass(&self) -> Option<&RenderPass> {
        self.passes.iter().find(|pass| pass.role == PassRole::Image)
    }

    /// Buffer passes in declaration order.
    pub fn buffer_passes(&self) -> impl Iterator<Item = &RenderPass> {
        self.passes
            .iter()
            .filter(|pass| pass.role == PassRole::Buffer)
    }

    pub fn is_multipass(&self) -> bool {
        self.buffer_passes().next().is_some()
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let image_count = self
            .passes
            .iter()
            .filter(|pass| pass.role == PassRole::Image)
            .count();
        match image_count {
            0 => issues.push("shader has no image pass".to_string()),
            1 => {}
            n => issues.push(format!("shader has {n} image passes, expected exactly one")),
        }

        for pass in &self.passes {
            let mut seen = [false; CHANNEL_COUNT];
            for binding in &pass.inputs {
                if binding.channel >= CHANNEL_COUNT {
                    issues.push(format!(
                        "pass '{}' binds channel {} (max {})",
                        pass.name,
                        binding.channel,
                        CHANNEL_COUNT - 1
                    ));
                    continue;
                }
                if std::mem::replace(&mut seen[binding.channel], true) {
                    issues.push(format!(
                        "pass '{}' binds channel {} more than once",
                        pass.name, binding.channel
                    ));
                }
            }
            if pass.role == PassRole::Buffer && pass.outputs.is_empty() {
                issues.push(format!("buffer pass '{}' declares no outputs", pass.name));
            }
        }
        issues
    }
}
