pub mod batch;
pub mod extract;
pub mod manifest;

pub use batch::{Batch, BatchPipeline, BatchStream, LabelFn};
pub use extract::{warm_cache, FeatureExtractor, WarmSummary};
pub use manifest::{DataGroup, Dataset, ManifestEntry};
