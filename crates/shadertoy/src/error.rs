use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("shader document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unrecognized shader document shape: expected `Shader.info` + `Shader.renderpass` or top-level `info` + `renderpass`")]
    UnrecognizedShape,
    #[error("shader document is missing `info.id`")]
    MissingId,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("shader '{0}' not found")]
    NotFound(String),
    #[error("invalid shader id '{0}': only ASCII letters and digits are allowed")]
    InvalidId(String),
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("shader document {path} is invalid: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },
    #[error(transparent)]
    Import(#[from] DocumentError),
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset path '{0}' is not a relative media path")]
    InvalidPath(String),
    #[error("request for {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("asset {path} could not be read: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("asset '{0}' is not available")]
    Missing(String),
}
