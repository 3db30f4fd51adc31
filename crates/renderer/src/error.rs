use thiserror::Error;

use crate::backend::{BackendError, ShaderStage};

/// Failure of a whole `load`. The renderer keeps whatever it had loaded before.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("shader has no image pass")]
    MissingImagePass,
    #[error("invalid shader description: {}", issues.join("; "))]
    InvalidDescription { issues: Vec<String> },
    #[error("pass '{pass}' failed to compile ({stage} stage): {log}")]
    Compile {
        pass: String,
        stage: ShaderStage,
        log: String,
        assembled: String,
    },
    #[error("pass '{pass}' failed to link: {log}")]
    Link {
        pass: String,
        log: String,
        assembled: String,
    },
    #[error("failed to allocate GPU resources: {0}")]
    Backend(#[from] BackendError),
}

impl LoadError {
    /// Full assembled fragment source for compile and link failures.
    pub fn assembled_source(&self) -> Option<&str> {
        match self {
            LoadError::Compile { assembled, .. } | LoadError::Link { assembled, .. } => {
                Some(assembled)
            }
            _ => None,
        }
    }
}

/// One texture or cubemap face that could not be fetched or decoded.
/// Always recovered by keeping the placeholder.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error(transparent)]
    Fetch(#[from] shadertoy::AssetError),
    #[error("failed to decode {src}: {source}")]
    Decode {
        src: String,
        #[source]
        source: image::ImageError,
    },
    #[error("cubemap face {src} is {actual:?}, expected {expected:?}")]
    FaceSize {
        src: String,
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("failed to upload {src}: {source}")]
    Upload {
        src: String,
        #[source]
        source: BackendError,
    },
}

/// No usable graphics device or surface.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("failed to acquire window handles: {0}")]
    Handle(#[from] raw_window_handle::HandleError),
    #[error("failed to create rendering surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to open GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("surface reports no supported texture formats")]
    NoSurfaceFormat,
    #[error("requested surface {width}x{height} exceeds GPU limit {limit}")]
    SurfaceTooLarge { width: u32, height: u32, limit: u32 },
}
