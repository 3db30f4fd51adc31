//! Ingestion of ShaderToy JSON documents.
//!
//! Two shapes reach us: the API response (`{ "Shader": { info, renderpass } }`)
//! and the bare export (`{ ver, info, renderpass }`). Both are reduced to the
//! inner shader object here, then lowered into a [`ShaderDescription`] with
//! every identifier coerced to its canonical [`OutputId`] form.
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::description::{
    ChannelBinding, ChannelInput, FilterMode, OutputId, PassRole, RenderPass, SamplerState,
    ShaderDescription, ShaderInfo, WrapMode, CHANNEL_COUNT,
};
use crate::error::DocumentError;

/// A shader document reduced to its inner `{ ver, info, renderpass }` object.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderDocument {
    shader: Value,
}

impl ShaderDocument {
    pub fn id(&self) -> Option<&str> {
        self.shader
            .get("info")
            .and_then(|info| info.get("id"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn shader(&self) -> &Value {
        &self.shader
    }

    pub fn shader_mut(&mut self) -> &mut Value {
        &mut self.shader
    }

    /// The API-style wrapped form, which is what the store persists.
    pub fn into_wrapped(self) -> Value {
        json!({ "Shader": self.shader })
    }

    pub fn description(&self) -> Result<ShaderDescription, DocumentError> {
        let raw = RawShader::deserialize(&self.shader)?;
        Ok(lower(raw))
    }
}

pub fn normalize(raw: Value) -> Result<ShaderDocument, DocumentError> {
    let mut raw = raw;
    if let Some(inner) = raw.get_mut("Shader") {
        if is_shader_object(inner) {
            return Ok(ShaderDocument {
                shader: inner.take(),
            });
        }
    }
    if is_shader_object(&raw) {
        return Ok(ShaderDocument { shader: raw });
    }
    Err(DocumentError::UnrecognizedShape)
}

pub fn parse_document(json: &str) -> Result<ShaderDocument, DocumentError> {
    normalize(serde_json::from_str(json)?)
}

/// Parses either document shape straight into a description.
pub fn parse_description(json: &str) -> Result<ShaderDescription, DocumentError> {
    parse_document(json)?.description()
}

fn is_shader_object(value: &Value) -> bool {
    value.get("info").is_some_and(Value::is_object)
        && value.get("renderpass").is_some_and(Value::is_array)
}

#[derive(Debug, Deserialize)]
struct RawShader {
    #[serde(default)]
    info: RawInfo,
    #[serde(default)]
    renderpass: Vec<RawPass>,
}

#[derive(Debug, Default, Deserialize)]
struct RawInfo {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default, alias = "author")]
    username: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPass {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    pass_type: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    inputs: Vec<RawInput>,
    #[serde(default)]
    outputs: Vec<RawOutput>,
}

#[derive(Debug, Deserialize)]
struct RawInput {
    #[serde(default)]
    id: Option<RawId>,
    #[serde(default)]
    channel: i64,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    ctype: Option<String>,
    #[serde(default)]
    src: Option<String>,
    #[serde(default)]
    filepath: Option<String>,
    #[serde(default)]
    sampler: Option<RawSampler>,
    #[serde(default)]
    filter: Option<String>,
    #[serde(default)]
    wrap: Option<String>,
    #[serde(default)]
    vflip: Option<RawFlag>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSampler {
    #[serde(default)]
    filter: Option<String>,
    #[serde(default)]
    wrap: Option<String>,
    #[serde(default)]
    vflip: Option<RawFlag>,
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    id: RawId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

impl RawId {
    fn canonical(&self) -> OutputId {
        match self {
            RawId::Number(number) => OutputId::from_number(*number),
            RawId::Text(text) => OutputId::new(text),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawFlag {
    Bool(bool),
    Text(String),
}

impl RawFlag {
    fn as_bool(&self) -> bool {
        match self {
            RawFlag::Bool(value) => *value,
            RawFlag::Text(text) => text.trim().eq_ignore_ascii_case("true"),
        }
    }
}

fn lower(raw: RawShader) -> ShaderDescription {
    let info = ShaderInfo {
        id: raw.info.id.trim().to_string(),
        name: raw.info.name,
        author: raw.info.username.filter(|name| !name.is_empty()),
        description: raw.info.description.filter(|text| !text.is_empty()),
    };

    let mut common_parts = Vec::new();
    let mut passes = Vec::new();
    for pass in raw.renderpass {
        let role = match pass.pass_type.trim().to_ascii_lowercase().as_str() {
            "image" => PassRole::Image,
            "buffer" => PassRole::Buffer,
            "sound" => PassRole::Sound,
            "common" => {
                common_parts.push(pass.code);
                continue;
            }
            other => {
                warn!(pass = %pass.name, kind = other, "skipping unsupported render pass type");
                continue;
            }
        };
        let name = if pass.name.trim().is_empty() {
            role.label().to_string()
        } else {
            pass.name
        };
        let inputs = lower_inputs(&name, pass.inputs);
        let outputs = pass.outputs.iter().map(|out| out.id.canonical()).collect();
        passes.push(RenderPass {
            name,
            role,
            code: pass.code,
            inputs,
            outputs,
        });
    }

    let common = if common_parts.is_empty() {
        None
    } else {
        Some(common_parts.join("\n"))
    };

    ShaderDescription {
        info,
        common,
        passes,
    }
}

fn lower_inputs(pass: &str, raw: Vec<RawInput>) -> Vec<ChannelBinding> {
    let mut bindings: Vec<ChannelBinding> = Vec::new();
    for input in raw {
        let kind = input
            .kind
            .as_deref()
            .or(input.ctype.as_deref())
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let channel = match usize::try_from(input.channel) {
            Ok(channel) if channel < CHANNEL_COUNT => channel,
            _ => {
                warn!(pass, channel = input.channel, "dropping input on out-of-range channel");
                continue;
            }
        };
        if bindings.iter().any(|binding| binding.channel == channel) {
            warn!(pass, channel, "dropping duplicate input for channel");
            continue;
        }

        let src = input
            .src
            .as_deref()
            .or(input.filepath.as_deref())
            .unwrap_or_default()
            .to_string();
        let lowered = match kind.as_str() {
            "texture" => ChannelInput::Texture {
                src,
                sampler: sampler_state(&input),
            },
            "cubemap" => ChannelInput::Cubemap {
                src,
                sampler: sampler_state(&input),
            },
            "volume" => ChannelInput::Volume { src },
            "keyboard" => ChannelInput::Keyboard,
            "buffer" => match &input.id {
                Some(id) => ChannelInput::Buffer { id: id.canonical() },
                None => {
                    warn!(pass, channel, "buffer input without id left unbound");
                    continue;
                }
            },
            other => {
                warn!(pass, channel, kind = other, "unsupported channel input left unbound");
                continue;
            }
        };
        if matches!(
            &lowered,
            ChannelInput::Texture { src, .. } | ChannelInput::Cubemap { src, .. } if src.is_empty()
        ) {
            warn!(pass, channel, "texture input without a source left unbound");
            continue;
        }
        bindings.push(ChannelBinding {
            channel,
            input: lowered,
        });
    }
    bindings
}

fn sampler_state(input: &RawInput) -> SamplerState {
    let nested = input.sampler.as_ref();
    let filter = nested
        .and_then(|sampler| sampler.filter.as_deref())
        .or(input.filter.as_deref())
        .map(FilterMode::parse)
        .unwrap_or_default();
    let wrap = nested
        .and_then(|sampler| sampler.wrap.as_deref())
        .or(input.wrap.as_deref())
        .map(WrapMode::parse)
        .unwrap_or_default();
    let vflip = nested
        .and_then(|sampler| sampler.vflip.as_ref())
        .or(input.vflip.as_ref())
        .map(RawFlag::as_bool)
        .unwrap_or(false);
    SamplerState {
        filter,
        wrap,
        vflip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const API_DOC: &str = r#"{
        "Shader": {
            "ver": "0.1",
            "info": { "id": "XsXXDn", "name": "Feedback", "username": "iq", "description": "" },
            "renderpass": [
                {
                    "name": "Buffer A",
                    "type": "buffer",
                    "code": "void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }",
                    "inputs": [
                        { "id": 257, "ctype": "buffer", "channel": 0 },
                        { "id": 30, "src": "/media/a/noise.png", "ctype": "texture", "channel": 1,
                          "sampler": { "filter": "mipmap", "wrap": "repeat", "vflip": "true" } }
                    ],
                    "outputs": [ { "id": 257, "channel": 0 } ]
                },
                { "name": "Common", "type": "common", "code": "float helper() { return 1.0; }",
                  "inputs": [], "outputs": [] },
                {
                    "name": "Image",
                    "type": "image",
                    "code": "void mainImage(out vec4 c, in vec2 p) { c = texture(iChannel0, p); }",
                    "inputs": [ { "id": "257", "ctype": "buffer", "channel": 0 } ],
                    "outputs": [ { "id": 37, "channel": 0 } ]
                }
            ]
        }
    }"#;

    const EXPORT_DOC: &str = r#"{
        "ver": "0.1",
        "info": { "id": "4dXGR8", "name": "Export" },
        "renderpass": [
            {
                "name": "Image",
                "type": "image",
                "code": "void mainImage(out vec4 c, in vec2 p) { c = vec4(0.0); }",
                "inputs": [
                    { "id": "XsX3Rn", "filepath": "/media/a/cube00_0.jpg", "type": "cubemap",
                      "channel": 2, "filter": "nearest", "wrap": "clamp", "vflip": false },
                    { "id": "4dXGRr", "type": "keyboard", "channel": 3 },
                    { "id": "4sXGR8", "type": "musicstream", "channel": 1 }
                ],
                "outputs": [ { "id": "4dfGRr", "channel": 0 } ]
            }
        ]
    }"#;

    #[test]
    fn normalizes_wrapped_api_document() {
        let description = parse_description(API_DOC).unwrap();
        assert_eq!(description.info.id, "XsXXDn");
        assert_eq!(description.info.author.as_deref(), Some("iq"));
        assert_eq!(description.info.description, None);
        assert_eq!(description.passes.len(), 2);
        assert_eq!(
            description.common.as_deref(),
            Some("float helper() { return 1.0; }")
        );

        let buffer = &description.passes[0];
        assert_eq!(buffer.role, PassRole::Buffer);
        assert_eq!(buffer.outputs, vec![OutputId::new("257")]);
        assert_eq!(
            buffer.input(1),
            Some(&ChannelInput::Texture {
                src: "/media/a/noise.png".into(),
                sampler: SamplerState {
                    filter: FilterMode::Mipmap,
                    wrap: WrapMode::Repeat,
                    vflip: true,
                },
            })
        );

        let image = description.image_pass().unwrap();
        assert_eq!(
            image.input(0),
            Some(&ChannelInput::Buffer {
                id: OutputId::from_number(257)
            })
        );
    }

    #[test]
    fn normalizes_bare_export_document() {
        let document = parse_document(EXPORT_DOC).unwrap();
        assert_eq!(document.id(), Some("4dXGR8"));
        let description = document.description().unwrap();
        let image = description.image_pass().unwrap();
        assert_eq!(image.inputs.len(), 2);
        assert_eq!(
            image.input(2),
            Some(&ChannelInput::Cubemap {
                src: "/media/a/cube00_0.jpg".into(),
                sampler: SamplerState {
                    filter: FilterMode::Nearest,
                    wrap: WrapMode::Clamp,
                    vflip: false,
                },
            })
        );
        assert_eq!(image.input(3), Some(&ChannelInput::Keyboard));
        assert_eq!(image.input(1), None);
    }

    #[test]
    fn wrapped_form_round_trips_through_normalize() {
        let document = parse_document(EXPORT_DOC).unwrap();
        let wrapped = document.clone().into_wrapped();
        assert!(wrapped.get("Shader").is_some());
        assert_eq!(normalize(wrapped).unwrap(), document);
    }

    #[test]
    fn rejects_unrecognized_shapes() {
        let err = parse_document(r#"{ "Shader": { "info": {} } }"#).unwrap_err();
        assert!(matches!(err, DocumentError::UnrecognizedShape));
        let err = parse_document("not json").unwrap_err();
        assert!(matches!(err, DocumentError::Json(_)));
    }

    #[test]
    fn drops_out_of_range_and_duplicate_channels() {
        let json = r#"{
            "info": { "id": "abc" },
            "renderpass": [ {
                "type": "image",
                "code": "",
                "inputs": [
                    { "type": "keyboard", "channel": 4 },
                    { "type": "keyboard", "channel": 1 },
                    { "type": "texture", "src": "/media/a/x.png", "channel": 1 },
                    { "type": "buffer", "channel": 2 }
                ]
            } ]
        }"#;
        let description = parse_description(json).unwrap();
        let image = description.image_pass().unwrap();
        assert_eq!(image.name, "image");
        assert_eq!(image.inputs.len(), 1);
        assert_eq!(image.input(1), Some(&ChannelInput::Keyboard));
        assert!(description.validate().is_empty());
    }
}
