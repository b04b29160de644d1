//! Decoding recordings into mono PCM at the target sample rate.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use voxlid_foundation::error::AudioError;

use crate::resampler::MonoResampler;

/// Stable identity of a recording, derived from its content: the hex
/// sha256 of the raw file bytes. Survives renames and copies, and two
/// distinct recordings can never alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordingId(String);

impl RecordingId {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(format!("{:x}", digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One decoded recording: mono PCM at the pipeline sample rate plus its
/// language label. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Recording {
    pub id: RecordingId,
    pub samples: Arc<[i16]>,
    pub sample_rate: u32,
    pub label: String,
}

impl Recording {
    pub fn duration_ms(&self) -> u64 {
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Decodes WAV files into [`Recording`]s at a fixed target rate.
pub struct AudioSource {
    target_sample_rate: u32,
}

impl AudioSource {
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    pub fn load(&self, path: &Path, label: &str) -> Result<Recording, AudioError> {
        let bytes = std::fs::read(path).map_err(|e| AudioError::Decode {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let id = RecordingId::from_bytes(&bytes);

        let reader = hound::WavReader::new(Cursor::new(&bytes))
            .map_err(|e| map_hound_error(path, e))?;
        let spec = reader.spec();
        let mono = decode_mono(path, reader, spec)?;

        let samples = if spec.sample_rate == self.target_sample_rate {
            mono
        } else {
            tracing::debug!(
                path = %path.display(),
                from = spec.sample_rate,
                to = self.target_sample_rate,
                "resampling recording"
            );
            MonoResampler::new(spec.sample_rate, self.target_sample_rate)?.process_all(&mono)?
        };

        Ok(Recording {
            id,
            samples: samples.into(),
            sample_rate: self.target_sample_rate,
            label: label.to_string(),
        })
    }
}

fn map_hound_error(path: &Path, err: hound::Error) -> AudioError {
    match err {
        hound::Error::Unsupported => AudioError::UnsupportedFormat {
            path: path.to_path_buf(),
            detail: "unsupported WAV encoding".into(),
        },
        other => AudioError::Decode {
            path: path.to_path_buf(),
            detail: other.to_string(),
        },
    }
}

fn decode_mono(
    path: &Path,
    mut reader: hound::WavReader<Cursor<&Vec<u8>>>,
    spec: hound::WavSpec,
) -> Result<Vec<i16>, AudioError> {
    if spec.channels == 0 {
        return Err(AudioError::Decode {
            path: path.to_path_buf(),
            detail: "zero channels".into(),
        });
    }

    let interleaved: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .collect::<Result<_, _>>()
            .map_err(|e| map_hound_error(path, e))?,
        (hound::SampleFormat::Int, bits @ (24 | 32)) => {
            let shift = bits - 16;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v >> shift) as i16))
                .collect::<Result<_, _>>()
                .map_err(|e| map_hound_error(path, e))?
        }
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * 32767.0).round() as i16))
            .collect::<Result<_, _>>()
            .map_err(|e| map_hound_error(path, e))?,
        (format, bits) => {
            return Err(AudioError::UnsupportedFormat {
                path: path.to_path_buf(),
                detail: format!("{:?} at {} bits per sample", format, bits),
            })
        }
    };

    if spec.channels == 1 {
        return Ok(interleaved);
    }
    // Downmix by averaging across channels.
    let channels = spec.channels as usize;
    Ok(interleaved
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect())
}
