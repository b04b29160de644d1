//! Slicing a sample sequence into fixed-length, fixed-step chunks.

use std::sync::Arc;

use voxlid_foundation::config::ChunkSettings;

/// One fixed-duration slice of a recording. Holds a reference into the
/// shared sample buffer rather than a copy.
#[derive(Debug, Clone)]
pub struct Chunk {
    samples: Arc<[i16]>,
    start: usize,
    len: usize,
}

impl Chunk {
    pub fn samples(&self) -> &[i16] {
        &self.samples[self.start..self.start + self.len]
    }

    /// Offset of this chunk's first sample in the source signal.
    pub fn start_sample(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Finite, restartable chunk sequence over one signal.
///
/// Windows start at `0, step, 2*step, …` and a window is emitted only
/// if a full `length_ms` of samples remains from its start; a shorter
/// trailing remainder is dropped, never padded, so every chunk has the
/// exact same duration. With `step_ms == length_ms` the chunks tile
/// the signal without overlap.
pub struct ChunkSlicer {
    samples: Arc<[i16]>,
    length: usize,
    step: usize,
}

impl ChunkSlicer {
    pub fn new(samples: Arc<[i16]>, cfg: &ChunkSettings, sample_rate: u32) -> Self {
        Self {
            samples,
            length: cfg.length_samples(sample_rate),
            step: cfg.step_samples(sample_rate),
        }
    }

    /// Number of chunks the iterator will yield.
    pub fn count(&self) -> usize {
        if self.samples.len() < self.length {
            0
        } else {
            (self.samples.len() - self.length) / self.step + 1
        }
    }

    /// A fresh traversal; calling this again re-yields the identical
    /// sequence.
    pub fn chunks(&self) -> ChunkIter {
        ChunkIter {
            samples: Arc::clone(&self.samples),
            length: self.length,
            step: self.step,
            next_start: 0,
        }
    }
}

pub struct ChunkIter {
    samples: Arc<[i16]>,
    length: usize,
    step: usize,
    next_start: usize,
}

impl Iterator for ChunkIter {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.next_start + self.length > self.samples.len() {
            return None;
        }
        let chunk = Chunk {
            samples: Arc::clone(&self.samples),
            start: self.next_start,
            len: self.length,
        };
        self.next_start += self.step;
        Some(chunk)
    }
}
