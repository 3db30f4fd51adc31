use std::fs;
use std::io;
use std::path::PathBuf;

use reqwest::blocking::Client;
use reqwest::Url;
use tracing::debug;

use crate::error::AssetError;

/// Where texture bytes come from. Every media path a shader declares is
/// resolved through one of these, never against the origin host directly.
pub trait AssetSource: Send + Sync {
    fn fetch(&self, src: &str) -> Result<Vec<u8>, AssetError>;
}

/// Reduces a declared media source (`/media/a/x.png`, or an absolute
/// ShaderToy URL) to a relative path such as `media/a/x.png`.
pub fn relative_media_path(src: &str) -> Result<String, AssetError> {
    let trimmed = src.trim();
    let path = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Url::parse(trimmed)
            .map_err(|_| AssetError::InvalidPath(src.to_string()))?
            .path()
            .to_string()
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        let (_, path) = rest
            .split_once('/')
            .ok_or_else(|| AssetError::InvalidPath(src.to_string()))?;
        path.to_string()
    } else {
        trimmed.to_string()
    };

    let relative = path.trim_start_matches('/');
    if relative.is_empty()
        || relative
            .split('/')
            .any(|segment| segment == ".." || segment == "." || segment.is_empty())
    {
        return Err(AssetError::InvalidPath(src.to_string()));
    }
    Ok(relative.to_string())
}

/// Fetches assets through the local asset proxy over HTTP.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    http: Client,
    base: Url,
}

impl ProxyClient {
    pub fn new(base: Url) -> Result<Self, AssetError> {
        let http = Client::builder()
            .build()
            .map_err(|source| AssetError::Request {
                url: base.to_string(),
                source,
            })?;
        Ok(Self {
            http,
            base: with_trailing_slash(base),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn resolve(&self, src: &str) -> Result<Url, AssetError> {
        let relative = relative_media_path(src)?;
        self.base
            .join(&relative)
            .map_err(|_| AssetError::InvalidPath(src.to_string()))
    }
}

impl AssetSource for ProxyClient {
    fn fetch(&self, src: &str) -> Result<Vec<u8>, AssetError> {
        let url = self.resolve(src)?;
        debug!(%url, "fetching asset through proxy");
        let request_error = |source| AssetError::Request {
            url: url.to_string(),
            source,
        };
        let response = self
            .http
            .get(url.clone())
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(request_error)?;
        let bytes = response.bytes().map_err(request_error)?;
        Ok(bytes.to_vec())
    }
}

/// Serves assets from a local mirror laid out like the media host.
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for DirectoryAssets {
    fn fetch(&self, src: &str) -> Result<Vec<u8>, AssetError> {
        let path = self.root.join(relative_media_path(src)?);
        debug!(path = %path.display(), "reading asset from mirror");
        fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => AssetError::Missing(src.to_string()),
            _ => AssetError::Io { path, source },
        })
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
