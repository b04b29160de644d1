pub mod config;
pub mod error;

pub use config::{
    BatchSettings, CacheSettings, ChunkSettings, NormalizerSettings, PipelineConfig,
    SpectrogramSettings, VadSettings,
};
pub use error::{AudioError, CacheError, ConfigError, FeatureError, VoxlidError};
