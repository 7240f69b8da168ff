use thiserror::Error;

use crate::engine::EngineState;

/// Library error type for preview engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Fetching or decoding an image failed.
    #[error("failed to load image from {url}: {reason}")]
    Load { url: String, reason: String },

    /// The compositor program failed GPU validation.
    #[error("shader compilation failed: {0}")]
    ShaderCompile(String),

    /// The drawable surface or GPU device could not be used.
    #[error("render surface error: {0}")]
    Surface(String),

    /// The operation needs an initialized engine.
    #[error("engine is not ready (state: {0:?})")]
    NotReady(EngineState),

    /// The compositor has no program yet.
    #[error("compositor program has not been built")]
    NotBuilt,

    /// Export requested before anything exportable was loaded.
    #[error("nothing to export")]
    NothingToExport,

    /// Encoding the rendered frame failed.
    #[error(transparent)]
    Encode(#[from] image::ImageError),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML/serde configuration error.
    #[error(transparent)]
    Config(#[from] serde_yaml::Error),
}

impl Error {
    pub(crate) fn load(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::Load {
            url: crate::fetch::short_url(url).into_owned(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
