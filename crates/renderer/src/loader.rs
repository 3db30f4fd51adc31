//! Resolves static channel inputs into bindable textures.
//!
//! Every distinct `(kind, src)` gets a 1×1 mid-gray placeholder before any
//! fetch starts. All fetches and decodes then run concurrently on scoped
//! worker threads and report back over one channel; the loader consumes the
//! results on the calling thread and swaps real textures in as they succeed.
//! A failed texture or face is logged and keeps its placeholder content.
use std::collections::HashMap;
use std::thread;

use crossbeam_channel::unbounded;
use image::imageops::flip_vertical_in_place;
use image::RgbaImage;
use shadertoy::{AssetSource, ChannelInput, FilterMode, SamplerState};
use tracing::{debug, warn};

use crate::backend::{GpuBackend, TextureDescriptor, TextureDimension, TextureId};
use crate::error::{AssetError, LoadError};

/// Colour of textures that have not loaded (yet).
pub const PLACEHOLDER_RGBA: [u8; 4] = [128, 128, 128, 255];

const CUBE_FACES: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum StaticKind {
    Texture,
    Cubemap,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    pub kind: StaticKind,
    pub src: String,
}

impl CacheKey {
    /// Cache key for inputs backed by static images.
    pub fn for_input(input: &ChannelInput) -> Option<(Self, SamplerState)> {
        match input {
            ChannelInput::Texture { src, sampler } => Some((
                CacheKey {
                    kind: StaticKind::Texture,
                    src: src.clone(),
                },
                *sampler,
            )),
            ChannelInput::Cubemap { src, sampler } => Some((
                CacheKey {
                    kind: StaticKind::Cubemap,
                    src: src.clone(),
                },
                *sampler,
            )),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CachedTexture {
    pub texture: TextureId,
    /// Decoded image size; `None` while only the placeholder is present.
    pub size: Option<(u32, u32)>,
}

impl CachedTexture {
    pub fn resolution(&self) -> [f32; 3] {
        match self.size {
            Some((width, height)) => [width as f32, height as f32, 1.0],
            None => [0.0; 3],
        }
    }
}

/// Textures of one load generation, keyed by input kind and source.
#[derive(Debug, Default)]
pub(crate) struct TextureCache {
    entries: HashMap<CacheKey, CachedTexture>,
}

impl TextureCache {
    pub fn get(&self, key: &CacheKey) -> Option<&CachedTexture> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Deletes every texture this generation owns.
    pub fn release<B: GpuBackend>(&mut self, backend: &mut B) {
        for (_, entry) in self.entries.drain() {
            backend.delete_texture(entry.texture);
        }
    }
}

/// Six face paths derived from a cubemap's base source: the extension and
/// any trailing `_<digits>` are stripped, then `_0`..`_5` are appended.
pub fn cubemap_face_paths(src: &str) -> [String; CUBE_FACES] {
    let file_start = src.rfind('/').map_or(0, |index| index + 1);
    let (stem, extension) = match src[file_start..].rfind('.') {
        Some(dot) => (&src[..file_start + dot], &src[file_start + dot..]),
        None => (src, ""),
    };
    let stem = match stem.rfind('_') {
        Some(underscore)
            if underscore >= file_start
                && underscore + 1 < stem.len()
                && stem[underscore + 1..].chars().all(|c| c.is_ascii_digit()) =>
        {
            &stem[..underscore]
        }
        _ => stem,
    };
    std::array::from_fn(|face| format!("{stem}_{face}{extension}"))
}

struct Request {
    key: CacheKey,
    sampler: SamplerState,
}

struct FetchJob<'a> {
    request: usize,
    face: usize,
    src: &'a str,
    vflip: bool,
}

struct FetchResult {
    request: usize,
    face: usize,
    outcome: Result<RgbaImage, AssetError>,
}

/// Loads every static input in `inputs`, reusing cache entries for repeated
/// sources. Only failure to create placeholders aborts the load.
pub(crate) fn load_static_inputs<'a, B: GpuBackend>(
    backend: &mut B,
    assets: &dyn AssetSource,
    cache: &mut TextureCache,
    inputs: impl IntoIterator<Item = &'a ChannelInput>,
) -> Result<(), LoadError> {
    let mut requests = Vec::new();
    for input in inputs {
        let Some((key, sampler)) = CacheKey::for_input(input) else {
            continue;
        };
        if cache.get(&key).is_some() {
            continue;
        }
        let texture = create_placeholder(backend, &key, sampler)?;
        cache.entries.insert(key.clone(), CachedTexture { texture, size: None });
        requests.push(Request { key, sampler });
    }
    if requests.is_empty() {
        return Ok(());
    }

    let face_paths: Vec<Vec<String>> = requests
        .iter()
        .map(|request| match request.key.kind {
            StaticKind::Texture => vec![request.key.src.clone()],
            StaticKind::Cubemap => cubemap_face_paths(&request.key.src).to_vec(),
        })
        .collect();
    let jobs: Vec<FetchJob<'_>> = requests
        .iter()
        .zip(&face_paths)
        .enumerate()
        .flat_map(|(index, (request, paths))| {
            paths.iter().enumerate().map(move |(face, src)| FetchJob {
                request: index,
                face,
                src,
                vflip: request.key.kind == StaticKind::Texture && request.sampler.vflip,
            })
        })
        .collect();
    debug!(textures = requests.len(), fetches = jobs.len(), "fetching channel textures");

    let mut faces: Vec<Vec<Option<RgbaImage>>> = face_paths
        .iter()
        .map(|paths| vec![None; paths.len()])
        .collect();
    let mut pending: Vec<usize> = face_paths.iter().map(Vec::len).collect();

    thread::scope(|scope| {
        let (sender, receiver) = unbounded();
        for job in &jobs {
            let sender = sender.clone();
            scope.spawn(move || {
                let outcome = fetch_image(assets, job.src, job.vflip);
                let _ = sender.send(FetchResult {
                    request: job.request,
                    face: job.face,
                    outcome,
                });
            });
        }
        drop(sender);

        for result in receiver {
            let request = &requests[result.request];
            match result.outcome {
                Ok(image) => faces[result.request][result.face] = Some(image),
                Err(err) => warn!(
                    src = %face_paths[result.request][result.face],
                    error = %err,
                    "channel texture unavailable; keeping placeholder"
                ),
            }
            pending[result.request] -= 1;
            if pending[result.request] == 0 {
                let loaded = std::mem::take(&mut faces[result.request]);
                finish_request(backend, cache, request, loaded);
            }
        }
    });
    Ok(())
}

fn fetch_image(assets: &dyn AssetSource, src: &str, vflip: bool) -> Result<RgbaImage, AssetError> {
    let bytes = assets.fetch(src)?;
    let decoded = image::load_from_memory(&bytes).map_err(|source| AssetError::Decode {
        src: src.to_string(),
        source,
    })?;
    let mut rgba = decoded.to_rgba8();
    if vflip {
        flip_vertical_in_place(&mut rgba);
    }
    Ok(rgba)
}

fn finish_request<B: GpuBackend>(
    backend: &mut B,
    cache: &mut TextureCache,
    request: &Request,
    faces: Vec<Option<RgbaImage>>,
) {
    let built = match request.key.kind {
        StaticKind::Texture => faces
            .into_iter()
            .next()
            .flatten()
            .map(|image| upload_texture(backend, request, image)),
        StaticKind::Cubemap => upload_cubemap(backend, request, faces),
    };
    let replacement = match built {
        Some(Ok(entry)) => entry,
        Some(Err(err)) => {
            warn!(src = %request.key.src, error = %err, "channel texture upload failed; keeping placeholder");
            return;
        }
        None => return,
    };
    if let Some(entry) = cache.entries.get_mut(&request.key) {
        backend.delete_texture(entry.texture);
        *entry = replacement;
        debug!(src = %request.key.src, size = ?replacement.size, "channel texture loaded");
    }
}

fn upload_texture<B: GpuBackend>(
    backend: &mut B,
    request: &Request,
    image: RgbaImage,
) -> Result<CachedTexture, AssetError> {
    let (width, height) = image.dimensions();
    let desc = descriptor(&request.key, request.sampler, TextureDimension::D2, width, height);
    let texture = backend
        .create_texture(&desc, &[image.as_raw()])
        .map_err(|source| AssetError::Upload {
            src: request.key.src.clone(),
            source,
        })?;
    Ok(CachedTexture {
        texture,
        size: Some((width, height)),
    })
}

/// Faces that failed, or disagree with the first good face's size, are
/// filled with the placeholder colour. `None` when no face loaded at all.
fn upload_cubemap<B: GpuBackend>(
    backend: &mut B,
    request: &Request,
    faces: Vec<Option<RgbaImage>>,
) -> Option<Result<CachedTexture, AssetError>> {
    let (width, height) = faces.iter().flatten().next()?.dimensions();
    let paths = cubemap_face_paths(&request.key.src);
    let placeholder_face: Vec<u8> = PLACEHOLDER_RGBA
        .iter()
        .copied()
        .cycle()
        .take(width as usize * height as usize * 4)
        .collect();

    let mut layers: Vec<&[u8]> = Vec::with_capacity(CUBE_FACES);
    for (index, face) in faces.iter().enumerate() {
        match face {
            Some(image) if image.dimensions() == (width, height) => layers.push(image.as_raw()),
            Some(image) => {
                let err = AssetError::FaceSize {
                    src: paths[index].clone(),
                    expected: (width, height),
                    actual: image.dimensions(),
                };
                warn!(error = %err, "cubemap face rejected; using placeholder");
                layers.push(&placeholder_face);
            }
            None => layers.push(&placeholder_face),
        }
    }

    let desc = descriptor(&request.key, request.sampler, TextureDimension::Cube, width, height);
    Some(
        backend
            .create_texture(&desc, &layers)
            .map(|texture| CachedTexture {
                texture,
                size: Some((width, height)),
            })
            .map_err(|source| AssetError::Upload {
                src: request.key.src.clone(),
                source,
            }),
    )
}

fn create_placeholder<B: GpuBackend>(
    backend: &mut B,
    key: &CacheKey,
    sampler: SamplerState,
) -> Result<TextureId, LoadError> {
    let dimension = match key.kind {
        StaticKind::Texture => TextureDimension::D2,
        StaticKind::Cubemap => TextureDimension::Cube,
    };
    let desc = TextureDescriptor {
        label: &key.src,
        dimension,
        width: 1,
        height: 1,
        filter: match sampler.filter {
            FilterMode::Mipmap => FilterMode::Linear,
            other => other,
        },
        wrap: sampler.wrap,
    };
    let layers = vec![&PLACEHOLDER_RGBA[..]; dimension.layers()];
    Ok(backend.create_texture(&desc, &layers)?)
}

fn descriptor<'a>(
    key: &'a CacheKey,
    sampler: SamplerState,
    dimension: TextureDimension,
    width: u32,
    height: u32,
) -> TextureDescriptor<'a> {
    TextureDescriptor {
        label: &key.src,
        dimension,
        width,
        height,
        filter: sampler.filter,
        wrap: sampler.wrap,
    }
}
