pub mod mel;
pub mod normalizer;
pub mod spectrogram;
pub mod tensor;

pub use normalizer::SlidingWindowNormalizer;
pub use spectrogram::SpectrogramExtractor;
pub use tensor::FeatureTensor;
