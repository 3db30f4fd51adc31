use image::imageops::{self, FilterType};
use image::RgbaImage;
use shadertoy::{FilterMode, WrapMode};
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::backend::{TextureDescriptor, TextureDimension};
use crate::types::ChannelTextureKind;

/// Format of feedback render targets. Buffers routinely carry positions,
/// velocities and accumulators, so they keep full single precision.
pub(crate) const FEEDBACK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

const STATIC_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// A texture plus the view and sampler a channel binds.
pub(crate) struct ChannelTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub kind: ChannelTextureKind,
    pub render_target: bool,
}

impl ChannelTexture {
    pub fn destroy(&self) {
        self.texture.destroy();
    }
}

/// Uploads tightly packed RGBA8 layers, generating the mip chain on the CPU
/// when the descriptor asks for mipmapped filtering.
pub(crate) fn create_static(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    desc: &TextureDescriptor<'_>,
    layers: &[&[u8]],
) -> Option<ChannelTexture> {
    let mip_level_count = desc.mip_level_count();
    let mut data = Vec::with_capacity(desc.layer_len() * layers.len() * 2);
    for layer in layers {
        let image = RgbaImage::from_raw(desc.width, desc.height, layer.to_vec())?;
        append_mip_chain(&mut data, image, mip_level_count);
    }

    let layer_count = desc.dimension.layers() as u32;
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: layer_count,
            },
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: STATIC_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &data,
    );
    let (kind, view) = match desc.dimension {
        TextureDimension::D2 => (
            ChannelTextureKind::Texture2d,
            texture.create_view(&wgpu::TextureViewDescriptor::default()),
        ),
        TextureDimension::Cube => (
            ChannelTextureKind::Cubemap,
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some(desc.label),
                dimension: Some(wgpu::TextureViewDimension::Cube),
                array_layer_count: Some(layer_count),
                ..Default::default()
            }),
        ),
    };
    let sampler = create_sampler(device, desc.filter, desc.wrap);
    Some(ChannelTexture {
        texture,
        view,
        sampler,
        kind,
        render_target: false,
    })
}

pub(crate) fn create_render_target(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
) -> ChannelTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FEEDBACK_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = create_sampler(device, FilterMode::Linear, WrapMode::Clamp);
    ChannelTexture {
        texture,
        view,
        sampler,
        kind: ChannelTextureKind::Texture2d,
        render_target: true,
    }
}

/// Black textures bound to channels with nothing attached, one per sampler
/// dimension a program may declare.
pub(crate) struct UnboundTextures {
    texture_2d: ChannelTexture,
    cubemap: ChannelTexture,
    volume: ChannelTexture,
}

impl UnboundTextures {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self {
            texture_2d: create_unbound(device, queue, ChannelTextureKind::Texture2d),
            cubemap: create_unbound(device, queue, ChannelTextureKind::Cubemap),
            volume: create_unbound(device, queue, ChannelTextureKind::Volume),
        }
    }

    pub fn get(&self, kind: ChannelTextureKind) -> &ChannelTexture {
        match kind {
            ChannelTextureKind::Texture2d => &self.texture_2d,
            ChannelTextureKind::Cubemap => &self.cubemap,
            ChannelTextureKind::Volume => &self.volume,
        }
    }
}

fn create_unbound(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    kind: ChannelTextureKind,
) -> ChannelTexture {
    let (dimension, view_dimension, layers) = match kind {
        ChannelTextureKind::Texture2d => {
            (wgpu::TextureDimension::D2, wgpu::TextureViewDimension::D2, 1)
        }
        ChannelTextureKind::Cubemap => {
            (wgpu::TextureDimension::D2, wgpu::TextureViewDimension::Cube, 6)
        }
        ChannelTextureKind::Volume => {
            (wgpu::TextureDimension::D3, wgpu::TextureViewDimension::D3, 1)
        }
    };
    let data = vec![0u8; 4 * layers as usize];
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("unbound channel"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension,
            format: STATIC_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &data,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("unbound channel view"),
        dimension: Some(view_dimension),
        ..Default::default()
    });
    let sampler = create_sampler(device, FilterMode::Linear, WrapMode::Clamp);
    ChannelTexture {
        texture,
        view,
        sampler,
        kind,
        render_target: false,
    }
}

/// Sampler bound to feedback channels whose layout entry is non-filtering.
pub(crate) fn create_nearest_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    create_sampler(device, FilterMode::Nearest, WrapMode::Clamp)
}

fn create_sampler(device: &wgpu::Device, filter: FilterMode, wrap: WrapMode) -> wgpu::Sampler {
    let address_mode = match wrap {
        WrapMode::Clamp => wgpu::AddressMode::ClampToEdge,
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
    };
    let (filter_mode, mipmap_filter) = match filter {
        FilterMode::Nearest => (wgpu::FilterMode::Nearest, wgpu::FilterMode::Nearest),
        FilterMode::Linear => (wgpu::FilterMode::Linear, wgpu::FilterMode::Nearest),
        FilterMode::Mipmap => (wgpu::FilterMode::Linear, wgpu::FilterMode::Linear),
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("channel sampler"),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: filter_mode,
        min_filter: filter_mode,
        mipmap_filter,
        ..Default::default()
    })
}

/// Appends `levels` mip levels of `image`, largest first.
fn append_mip_chain(data: &mut Vec<u8>, image: RgbaImage, levels: u32) {
    let mut level = image;
    for index in 0..levels {
        data.extend_from_slice(level.as_raw());
        if index + 1 < levels {
            let width = (level.width() / 2).max(1);
            let height = (level.height() / 2).max(1);
            level = imageops::resize(&level, width, height, FilterType::Triangle);
        }
    }
}
