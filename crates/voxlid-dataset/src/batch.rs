//! Lazy, restartable batch streaming with bounded-reservoir shuffling.

use std::collections::VecDeque;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use voxlid_cache::FeatureCache;
use voxlid_features::FeatureTensor;
use voxlid_foundation::config::BatchSettings;
use voxlid_foundation::error::VoxlidError;

use crate::extract::FeatureExtractor;
use crate::manifest::DataGroup;

/// One training batch: `batch_size` chunk tensors stacked into a
/// row-major `(batch_size, frames, bins)` buffer plus parallel labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub features: Vec<f32>,
    pub batch_size: usize,
    pub frames: usize,
    pub bins: usize,
    pub labels: Vec<u32>,
}

impl Batch {
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.batch_size, self.frames, self.bins)
    }
}

pub type LabelFn = Arc<dyn Fn(&str) -> Option<u32> + Send + Sync>;

/// Composes cached extraction into a batch stream. `stream` can be
/// called once per epoch; every call is an independent traversal, and
/// with a fixed seed the batch order is identical across calls.
pub struct BatchPipeline<'a> {
    extractor: &'a FeatureExtractor,
    cache: &'a dyn FeatureCache,
    label_index: LabelFn,
    settings: BatchSettings,
}

impl<'a> BatchPipeline<'a> {
    pub fn new(
        extractor: &'a FeatureExtractor,
        cache: &'a dyn FeatureCache,
        label_index: LabelFn,
    ) -> Self {
        Self {
            extractor,
            cache,
            label_index,
            settings: extractor.config().batch.clone(),
        }
    }

    pub fn stream<'g>(&'a self, group: &'g DataGroup) -> BatchStream<'a, 'g> {
        BatchStream {
            pipeline: self,
            entries: group.entries.iter(),
            pending: VecDeque::new(),
            reservoir: Vec::with_capacity(self.settings.shuffle_buffer),
            rng: StdRng::seed_from_u64(self.settings.seed),
            exhausted: false,
            failed: false,
        }
    }
}

type Pair = (FeatureTensor, u32);

/// Pull-based batch iterator. Per-recording failures are skipped with
/// a warning; a fatal error is yielded once and ends the stream.
pub struct BatchStream<'a, 'g> {
    pipeline: &'a BatchPipeline<'a>,
    entries: std::slice::Iter<'g, crate::manifest::ManifestEntry>,
    /// Chunk tensors of the recording currently being drained.
    pending: VecDeque<Pair>,
    reservoir: Vec<Pair>,
    rng: StdRng,
    exhausted: bool,
    failed: bool,
}

impl BatchStream<'_, '_> {
    /// Next (tensor, label) pair in manifest order, refilling from the
    /// next recording as needed.
    fn next_upstream(&mut self) -> Result<Option<Pair>, VoxlidError> {
        loop {
            if let Some(pair) = self.pending.pop_front() {
                return Ok(Some(pair));
            }
            let entry = match self.entries.next() {
                Some(e) => e,
                None => return Ok(None),
            };
            let label = match (self.pipeline.label_index)(&entry.label) {
                Some(l) => l,
                None => {
                    tracing::warn!(
                        path = %entry.path.display(),
                        label = %entry.label,
                        "label not in vocabulary, skipping recording"
                    );
                    continue;
                }
            };
            match self
                .pipeline
                .extractor
                .extract_cached(self.pipeline.cache, &entry.path, &entry.label)
            {
                Ok(tensors) => {
                    self.pending = tensors.into_iter().map(|t| (t, label)).collect();
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(path = %entry.path.display(), error = %e, "skipping recording");
                }
            }
        }
    }

    /// Draw one pair, through the reservoir when shuffling is enabled.
    fn draw(&mut self) -> Result<Option<Pair>, VoxlidError> {
        let capacity = self.pipeline.settings.shuffle_buffer;
        if capacity == 0 {
            return self.next_upstream();
        }
        while !self.exhausted && self.reservoir.len() < capacity {
            match self.next_upstream()? {
                Some(pair) => self.reservoir.push(pair),
                None => self.exhausted = true,
            }
        }
        if self.reservoir.is_empty() {
            return Ok(None);
        }
        let idx = self.rng.gen_range(0..self.reservoir.len());
        Ok(Some(self.reservoir.swap_remove(idx)))
    }
}

impl Iterator for BatchStream<'_, '_> {
    type Item = Result<Batch, VoxlidError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let size = self.pipeline.settings.batch_size;
        let mut tensors = Vec::with_capacity(size);
        let mut labels = Vec::with_capacity(size);
        while tensors.len() < size {
            match self.draw() {
                Ok(Some((tensor, label))) => {
                    tensors.push(tensor);
                    labels.push(label);
                }
                // Trailing items that cannot fill a whole batch are
                // dropped to keep the output shape fixed.
                Ok(None) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }

        let frames = tensors[0].frames();
        let bins = tensors[0].bins();
        debug_assert!(tensors.iter().all(|t| t.frames() == frames && t.bins() == bins));
        let mut features = Vec::with_capacity(size * frames * bins);
        for t in &tensors {
            features.extend_from_slice(t.data());
        }
        Some(Ok(Batch {
            features,
            batch_size: size,
            frames,
            bins,
            labels,
        }))
    }
}
