//! Per-recording feature extraction and the parallel cache warmer.
//!
//! The stages for one recording run strictly in order: decode → VAD
//! segment → trim → chunk → spectrogram → normalize → cache. Distinct
//! recordings are independent, so the warmer fans them out across
//! worker threads; the cache's per-key discipline makes that safe.

use std::path::Path;

use voxlid_audio::{AudioSource, ChunkSlicer, Recording};
use voxlid_cache::{CacheKey, FeatureCache};
use voxlid_features::{FeatureTensor, SlidingWindowNormalizer, SpectrogramExtractor};
use voxlid_foundation::config::PipelineConfig;
use voxlid_foundation::error::VoxlidError;
use voxlid_vad::{keep_speech, VoiceActivitySegmenter};

use crate::manifest::DataGroup;

pub struct FeatureExtractor {
    config: PipelineConfig,
    fingerprint: String,
    source: AudioSource,
    segmenter: VoiceActivitySegmenter,
    spectrogram: SpectrogramExtractor,
    normalizer: SlidingWindowNormalizer,
}

impl FeatureExtractor {
    pub fn new(config: PipelineConfig) -> Self {
        let sr = config.target_sample_rate;
        Self {
            fingerprint: config.fingerprint(),
            source: AudioSource::new(sr),
            segmenter: VoiceActivitySegmenter::new(config.vad.clone(), sr),
            spectrogram: SpectrogramExtractor::new(&config.spectrogram, sr),
            normalizer: SlidingWindowNormalizer::new(&config.normalizer),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full pipeline for one recording through the cache.
    /// A hit skips everything past decoding.
    pub fn extract_cached(
        &self,
        cache: &dyn FeatureCache,
        path: &Path,
        label: &str,
    ) -> Result<Vec<FeatureTensor>, VoxlidError> {
        let recording = self.source.load(path, label)?;
        let key = CacheKey::derive(recording.id.as_str(), &self.fingerprint);
        cache.get_or_compute(&key, &mut || self.compute(&recording))
    }

    fn compute(&self, recording: &Recording) -> Result<Vec<FeatureTensor>, VoxlidError> {
        let spans = self.segmenter.segment(&recording.samples);
        let speech = keep_speech(&recording.samples, &spans);
        tracing::debug!(
            id = %recording.id,
            total = recording.samples.len(),
            speech = speech.len(),
            "voice activity trim"
        );

        let slicer = ChunkSlicer::new(speech.into(), &self.config.chunk, recording.sample_rate);
        let mut tensors = Vec::with_capacity(slicer.count());
        for chunk in slicer.chunks() {
            match self.spectrogram.extract(chunk.samples()) {
                Ok(mut tensor) => {
                    self.normalizer.normalize(&mut tensor);
                    tensors.push(tensor);
                }
                Err(e) => {
                    // Chunk-level failures skip the chunk, not the
                    // recording.
                    tracing::warn!(
                        id = %recording.id,
                        start = chunk.start_sample(),
                        error = %e,
                        "skipping chunk"
                    );
                }
            }
        }
        Ok(tensors)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmSummary {
    pub recordings: usize,
    pub skipped: usize,
    pub chunks: usize,
}

/// Populate the cache for a whole group using `workers` threads.
/// Per-recording failures are logged and counted; fatal errors
/// (configuration, unwritable cache) abort the warm-up.
pub fn warm_cache(
    extractor: &FeatureExtractor,
    cache: &dyn FeatureCache,
    group: &DataGroup,
    workers: usize,
) -> Result<WarmSummary, VoxlidError> {
    let workers = workers.clamp(1, extractor.config.batch.batch_size.max(1));
    let (job_tx, job_rx) = crossbeam_channel::unbounded();
    for entry in &group.entries {
        job_tx.send(entry).expect("receiver outlives the send loop");
    }
    drop(job_tx);

    let (result_tx, result_rx) = crossbeam_channel::unbounded();
    std::thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for entry in job_rx {
                    let outcome = extractor.extract_cached(cache, &entry.path, &entry.label);
                    if result_tx.send((entry, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        let mut summary = WarmSummary::default();
        for (entry, outcome) in result_rx {
            match outcome {
                Ok(tensors) => {
                    summary.recordings += 1;
                    summary.chunks += tensors.len();
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    summary.skipped += 1;
                    tracing::warn!(path = %entry.path.display(), error = %e, "skipping recording");
                }
            }
        }
        tracing::info!(
            group = %group.name,
            recordings = summary.recordings,
            skipped = summary.skipped,
            chunks = summary.chunks,
            "cache warm-up finished"
        );
        Ok(summary)
    })
}
