use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use voxlid_foundation::error::AudioError;

/// Offline mono resampler built on Rubato's sinc interpolation.
///
/// Parameters are fixed rather than selectable: extraction must be
/// reproducible, so the same input bytes always produce bit-identical
/// output regardless of where the pipeline runs.
pub struct MonoResampler {
    in_rate: u32,
    out_rate: u32,
    resampler: Option<SincFixedIn<f32>>,
    chunk_size: usize,
}

const CHUNK_SIZE: usize = 512;

impl MonoResampler {
    pub fn new(in_rate: u32, out_rate: u32) -> Result<Self, AudioError> {
        let resampler = if in_rate == out_rate {
            None
        } else {
            let sinc_params = SincInterpolationParameters {
                sinc_len: 128,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Cubic,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            };
            Some(
                SincFixedIn::<f32>::new(
                    out_rate as f64 / in_rate as f64,
                    2.0,
                    sinc_params,
                    CHUNK_SIZE,
                    1,
                )
                .map_err(|e| AudioError::Resample(e.to_string()))?,
            )
        };
        Ok(Self {
            in_rate,
            out_rate,
            resampler,
            chunk_size: CHUNK_SIZE,
        })
    }

    /// Resample a complete mono signal. Consumes `self` because the
    /// resampler's internal filter state is flushed at the end.
    pub fn process_all(mut self, input: &[i16]) -> Result<Vec<i16>, AudioError> {
        let resampler = match self.resampler.as_mut() {
            None => return Ok(input.to_vec()),
            Some(r) => r,
        };

        let mut float_input: Vec<f32> = input.iter().map(|&s| s as f32 / 32768.0).collect();
        // Zero-pad to a chunk multiple so the tail is not silently lost.
        let rem = float_input.len() % self.chunk_size;
        if rem != 0 {
            float_input.resize(float_input.len() + self.chunk_size - rem, 0.0);
        }

        let mut output = Vec::with_capacity(
            (input.len() as u64 * self.out_rate as u64 / self.in_rate as u64) as usize + CHUNK_SIZE,
        );
        for chunk in float_input.chunks(self.chunk_size) {
            let frames = vec![chunk.to_vec()];
            let resampled = resampler
                .process(&frames, None)
                .map_err(|e| AudioError::Resample(e.to_string()))?;
            if let Some(channel) = resampled.first() {
                output.extend(channel.iter().map(|&s| {
                    let clamped = s.clamp(-1.0, 1.0);
                    (clamped * 32767.0).round() as i16
                }));
            }
        }
        Ok(output)
    }
}
