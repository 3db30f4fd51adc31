mod assets;
mod description;
mod document;
mod error;
mod slots;
mod store;

pub use assets::{relative_media_path, AssetSource, DirectoryAssets, ProxyClient};
pub use description::{
    ChannelBinding, ChannelInput, FilterMode, OutputId, PassRole, RenderPass, SamplerState,
    ShaderDescription, ShaderInfo, WrapMode, CHANNEL_COUNT,
};
pub use document::{normalize, parse_description, parse_document, ShaderDocument};
pub use error::{AssetError, DocumentError, StoreError};
pub use slots::{conventional_slot, OutputSlotMap, MAX_SLOTS};
pub use store::{ShaderStore, ShaderSummary};

pub use reqwest::Url;

/// Accepts a bare shader id, `shadertoy://<id>`, or a
/// `https://www.shadertoy.com/view/<id>` page URL.
pub fn shader_id_from_input(input: &str) -> Option<String> {
    let input = input.trim();
    let id = if let Some(id) = input.strip_prefix("shadertoy://") {
        id
    } else if let Some((_, rest)) = input.split_once("/view/") {
        rest.split(['/', '?', '#']).next().unwrap_or_default()
    } else {
        input
    };
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(id.to_string())
    } else {
        None
    }
}
