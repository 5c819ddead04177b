use std::path::PathBuf;
use thiserror::Error;

/// Failures while acquiring a remote image. Always scoped to one fetch;
/// the worker logs and moves on.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

/// Failures inside a resize backend. Fatal to the one placement that asked,
/// never to the process.
#[derive(Error, Debug)]
pub enum ResizeError {
    /// The native resizer returned a nonzero status code.
    #[error("native resizer returned status {0}")]
    Backend(i32),

    #[error("native resizer library {0} unavailable: {1}")]
    Unavailable(PathBuf, String),
}
