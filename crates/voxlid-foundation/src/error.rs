use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxlidError {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Feature extraction error: {0}")]
    Feature(#[from] FeatureError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to decode {path}: {detail}")]
    Decode { path: PathBuf, detail: String },

    #[error("Unsupported format in {path}: {detail}")]
    UnsupportedFormat { path: PathBuf, detail: String },

    #[error("Resampler error: {0}")]
    Resample(String),
}

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("Chunk of {got} samples is shorter than one analysis frame ({need} samples)")]
    ChunkTooShort { got: usize, need: usize },

    #[error("Degenerate input: {0}")]
    Degenerate(String),
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Corrupt cache entry {key}: {detail}")]
    Corrupt { key: String, detail: String },

    #[error("Cache I/O failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl VoxlidError {
    /// Whether this error aborts the whole run, as opposed to skipping
    /// one recording or chunk and continuing with the rest.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VoxlidError::Config(_) | VoxlidError::Cache(CacheError::Io { .. })
        )
    }
}
