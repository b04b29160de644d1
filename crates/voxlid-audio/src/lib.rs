pub mod chunker;
pub mod resampler;
pub mod source;

pub use chunker::{Chunk, ChunkIter, ChunkSlicer};
pub use resampler::MonoResampler;
pub use source::{AudioSource, Recording, RecordingId};
