//! Immutable pipeline configuration.
//!
//! One `PipelineConfig` drives every stage; components receive it (or a
//! sub-struct) at construction time and never mutate it. The
//! `fingerprint()` method renders all extraction-relevant parameters as
//! a deterministic string, which is what the feature cache digests —
//! changing any parameter changes the fingerprint and therefore every
//! cache key.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// All recordings are resampled to this rate before any other stage.
    pub target_sample_rate: u32,
    pub vad: VadSettings,
    pub chunk: ChunkSettings,
    pub spectrogram: SpectrogramSettings,
    pub normalizer: NormalizerSettings,
    pub cache: CacheSettings,
    pub batch: BatchSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16_000,
            vad: VadSettings::default(),
            chunk: ChunkSettings::default(),
            spectrogram: SpectrogramSettings::default(),
            normalizer: NormalizerSettings::default(),
            cache: CacheSettings::default(),
            batch: BatchSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VadSettings {
    /// Analysis frame duration. Must be 10, 20 or 30 ms.
    pub frame_ms: u32,
    /// 0 (keep almost everything) ..= 3 (trim aggressively).
    pub aggressiveness: u8,
    /// Silence runs shorter than this are absorbed into speech.
    pub min_non_speech_ms: u32,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            frame_ms: 30,
            aggressiveness: 2,
            min_non_speech_ms: 300,
        }
    }
}

impl VadSettings {
    pub fn frame_len_samples(&self, sample_rate: u32) -> usize {
        (sample_rate as u64 * self.frame_ms as u64 / 1000) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkSettings {
    pub length_ms: u32,
    /// `step_ms == length_ms` gives non-overlapping chunks.
    pub step_ms: u32,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            length_ms: 980,
            step_ms: 980,
        }
    }
}

impl ChunkSettings {
    pub fn length_samples(&self, sample_rate: u32) -> usize {
        (sample_rate as u64 * self.length_ms as u64 / 1000) as usize
    }

    pub fn step_samples(&self, sample_rate: u32) -> usize {
        (sample_rate as u64 * self.step_ms as u64 / 1000) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramSettings {
    pub frame_length_ms: u32,
    pub frame_step_ms: u32,
    pub num_mel_bins: usize,
    pub fmin_hz: f32,
    pub fmax_hz: f32,
}

impl Default for SpectrogramSettings {
    fn default() -> Self {
        Self {
            frame_length_ms: 25,
            frame_step_ms: 10,
            num_mel_bins: 40,
            fmin_hz: 20.0,
            fmax_hz: 7_800.0,
        }
    }
}

impl SpectrogramSettings {
    pub fn frame_len_samples(&self, sample_rate: u32) -> usize {
        (sample_rate as u64 * self.frame_length_ms as u64 / 1000) as usize
    }

    pub fn frame_step_samples(&self, sample_rate: u32) -> usize {
        (sample_rate as u64 * self.frame_step_ms as u64 / 1000) as usize
    }

    /// Frame count for a full chunk. Pure function of the configuration,
    /// identical for every chunk regardless of content.
    pub fn frames_per_chunk(&self, chunk: &ChunkSettings) -> usize {
        ((chunk.length_ms - self.frame_length_ms) / self.frame_step_ms) as usize + 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerSettings {
    /// Trailing window length in frames.
    pub window_len: usize,
    pub normalize_variance: bool,
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self {
            window_len: 100,
            normalize_variance: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub root: PathBuf,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("cache/features"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub batch_size: usize,
    /// 0 disables shuffling and preserves input order exactly.
    pub shuffle_buffer: usize,
    pub seed: u64,
    /// Worker threads for cache warming. Clamped to `batch_size`.
    pub workers: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 32,
            shuffle_buffer: 1024,
            seed: 42,
            workers: 4,
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file. Values missing from the file fall back to
    /// the defaults above.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// Validate parameter consistency. Called once before any
    /// processing; every failure here is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                field,
                reason: reason.into(),
            })
        }

        if self.target_sample_rate == 0 {
            return invalid("target_sample_rate", "must be positive");
        }
        if !matches!(self.vad.frame_ms, 10 | 20 | 30) {
            return invalid("vad.frame_ms", "must be 10, 20 or 30");
        }
        if self.vad.frame_len_samples(self.target_sample_rate) == 0 {
            return invalid(
                "vad.frame_ms",
                format!(
                    "rounds to zero samples at {} Hz",
                    self.target_sample_rate
                ),
            );
        }
        if self.vad.aggressiveness > 3 {
            return invalid("vad.aggressiveness", "must be in 0..=3");
        }
        if self.chunk.length_ms == 0 {
            return invalid("chunk.length_ms", "must be positive");
        }
        if self.chunk.step_ms == 0 {
            return invalid("chunk.step_ms", "must be positive");
        }
        if self.chunk.length_samples(self.target_sample_rate) == 0 {
            return invalid(
                "chunk.length_ms",
                format!(
                    "rounds to zero samples at {} Hz",
                    self.target_sample_rate
                ),
            );
        }
        if self.chunk.step_samples(self.target_sample_rate) == 0 {
            return invalid(
                "chunk.step_ms",
                format!(
                    "rounds to zero samples at {} Hz",
                    self.target_sample_rate
                ),
            );
        }
        if self.spectrogram.frame_length_ms == 0 || self.spectrogram.frame_step_ms == 0 {
            return invalid("spectrogram", "frame length and step must be positive");
        }
        if self.spectrogram.frame_len_samples(self.target_sample_rate) == 0
            || self.spectrogram.frame_step_samples(self.target_sample_rate) == 0
        {
            return invalid(
                "spectrogram",
                format!(
                    "frame length or step rounds to zero samples at {} Hz",
                    self.target_sample_rate
                ),
            );
        }
        if self.spectrogram.frame_length_ms > self.chunk.length_ms {
            return invalid(
                "spectrogram.frame_length_ms",
                format!(
                    "analysis frame ({} ms) exceeds chunk length ({} ms)",
                    self.spectrogram.frame_length_ms, self.chunk.length_ms
                ),
            );
        }
        if self.spectrogram.num_mel_bins == 0 {
            return invalid("spectrogram.num_mel_bins", "must be positive");
        }
        if self.spectrogram.fmin_hz < 0.0 {
            return invalid("spectrogram.fmin_hz", "must be non-negative");
        }
        if self.spectrogram.fmin_hz >= self.spectrogram.fmax_hz {
            return invalid("spectrogram.fmin_hz", "must be below fmax_hz");
        }
        let nyquist = self.target_sample_rate as f32 / 2.0;
        if self.spectrogram.fmax_hz > nyquist {
            return invalid(
                "spectrogram.fmax_hz",
                format!("exceeds Nyquist frequency {} Hz", nyquist),
            );
        }
        if self.normalizer.window_len == 0 {
            return invalid("normalizer.window_len", "must be positive");
        }
        if self.batch.batch_size == 0 {
            return invalid("batch.batch_size", "must be positive");
        }
        Ok(())
    }

    /// Deterministic rendering of every parameter that affects feature
    /// values. Cache keys digest this string: two configurations that
    /// differ anywhere here can never share a key.
    pub fn fingerprint(&self) -> String {
        let mut s = String::with_capacity(256);
        let _ = write!(
            s,
            "sr={};vad.frame_ms={};vad.aggr={};vad.min_ns={};",
            self.target_sample_rate,
            self.vad.frame_ms,
            self.vad.aggressiveness,
            self.vad.min_non_speech_ms,
        );
        let _ = write!(
            s,
            "chunk.len={};chunk.step={};",
            self.chunk.length_ms, self.chunk.step_ms,
        );
        let _ = write!(
            s,
            "spec.flen={};spec.fstep={};spec.mels={};spec.fmin={};spec.fmax={};",
            self.spectrogram.frame_length_ms,
            self.spectrogram.frame_step_ms,
            self.spectrogram.num_mel_bins,
            self.spectrogram.fmin_hz,
            self.spectrogram.fmax_hz,
        );
        let _ = write!(
            s,
            "norm.win={};norm.var={}",
            self.normalizer.window_len, self.normalizer.normalize_variance,
        );
        s
    }
}
