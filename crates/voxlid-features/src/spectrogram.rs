//! Log-mel spectrogram extraction: Hann-windowed short-time frames,
//! FFT magnitude, mel filterbank projection, natural log.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use voxlid_foundation::config::SpectrogramSettings;
use voxlid_foundation::error::FeatureError;

use crate::mel::mel_filterbank;
use crate::tensor::FeatureTensor;

/// Floor applied before the log so that silent frames never hit
/// `ln(0)`.
const LOG_FLOOR: f32 = 1e-10;

pub struct SpectrogramExtractor {
    frame_len: usize,
    frame_step: usize,
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    mel_bank: Vec<Vec<f32>>,
    num_mel_bins: usize,
}

impl SpectrogramExtractor {
    pub fn new(settings: &SpectrogramSettings, sample_rate: u32) -> Self {
        let frame_len = settings.frame_len_samples(sample_rate);
        let frame_step = settings.frame_step_samples(sample_rate);
        let fft_size = frame_len.next_power_of_two();
        let fft = FftPlanner::new().plan_fft_forward(fft_size);

        // Hann window over the analysis frame.
        let window: Vec<f32> = (0..frame_len)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / frame_len as f32;
                0.5 * (1.0 - phase.cos())
            })
            .collect();

        let mel_bank = mel_filterbank(
            settings.num_mel_bins,
            fft_size,
            sample_rate,
            settings.fmin_hz,
            settings.fmax_hz,
        );

        Self {
            frame_len,
            frame_step,
            fft_size,
            fft,
            window,
            mel_bank,
            num_mel_bins: settings.num_mel_bins,
        }
    }

    /// Frame count for an input of `num_samples`; the standard
    /// `(n - frame_len) / step + 1`.
    pub fn num_frames(&self, num_samples: usize) -> Option<usize> {
        num_samples
            .checked_sub(self.frame_len)
            .map(|rest| rest / self.frame_step + 1)
    }

    pub fn extract(&self, samples: &[i16]) -> Result<FeatureTensor, FeatureError> {
        let num_frames = self
            .num_frames(samples.len())
            .ok_or(FeatureError::ChunkTooShort {
                got: samples.len(),
                need: self.frame_len,
            })?;

        let freq_bins = self.fft_size / 2 + 1;
        let mut tensor = FeatureTensor::with_frame_capacity(self.num_mel_bins, num_frames);
        let mut fft_buf = vec![Complex::new(0.0f32, 0.0); self.fft_size];
        let mut scratch = vec![Complex::new(0.0f32, 0.0); self.fft.get_inplace_scratch_len()];
        let mut magnitudes = vec![0.0f32; freq_bins];
        let mut mel_frame = vec![0.0f32; self.num_mel_bins];

        for frame_idx in 0..num_frames {
            let start = frame_idx * self.frame_step;
            let frame = &samples[start..start + self.frame_len];

            for (i, slot) in fft_buf.iter_mut().enumerate() {
                let sample = if i < self.frame_len {
                    frame[i] as f32 / 32768.0 * self.window[i]
                } else {
                    0.0
                };
                *slot = Complex::new(sample, 0.0);
            }
            self.fft.process_with_scratch(&mut fft_buf, &mut scratch);

            for (k, mag) in magnitudes.iter_mut().enumerate() {
                *mag = fft_buf[k].norm();
            }

            for (b, row) in self.mel_bank.iter().enumerate() {
                let energy: f32 = row.iter().zip(&magnitudes).map(|(w, m)| w * m).sum();
                mel_frame[b] = energy.max(LOG_FLOOR).ln();
            }
            tensor.push_frame(&mel_frame);
        }

        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxlid_foundation::config::{ChunkSettings, SpectrogramSettings};

    const SR: u32 = 16_000;

    fn extractor() -> SpectrogramExtractor {
        SpectrogramExtractor::new(&SpectrogramSettings::default(), SR)
    }

    fn sine(freq: f32, n: usize, amplitude: f32) -> Vec<i16> {
        (0..n)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * freq * i as f32 / SR as f32;
                (phase.sin() * amplitude) as i16
            })
            .collect()
    }

    #[test]
    fn frame_count_is_content_independent() {
        let ex = extractor();
        let chunk_samples = ChunkSettings::default().length_samples(SR);

        let silence = vec![0i16; chunk_samples];
        let tone = sine(440.0, chunk_samples, 16384.0);

        let a = ex.extract(&silence).unwrap();
        let b = ex.extract(&tone).unwrap();
        assert_eq!(a.frames(), b.frames());
        // (980 - 25) / 10 + 1
        assert_eq!(a.frames(), 96);
        assert_eq!(a.bins(), 40);
    }

    #[test]
    fn frame_count_matches_formula_for_other_lengths() {
        let ex = extractor();
        // 400 samples = 25 ms: exactly one frame.
        assert_eq!(ex.num_frames(400), Some(1));
        // One sample short of a second frame.
        assert_eq!(ex.num_frames(559), Some(1));
        assert_eq!(ex.num_frames(560), Some(2));
    }

    #[test]
    fn chunk_shorter_than_a_frame_is_an_error() {
        let ex = extractor();
        let too_short = vec![0i16; 399];
        assert!(matches!(
            ex.extract(&too_short),
            Err(FeatureError::ChunkTooShort { got: 399, need: 400 })
        ));
    }

    #[test]
    fn silence_hits_the_log_floor() {
        let ex = extractor();
        let t = ex.extract(&vec![0i16; 800]).unwrap();
        let floor = LOG_FLOOR.ln();
        for frame in t.iter_frames() {
            for &v in frame {
                assert!((v - floor).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn tone_energy_lands_in_the_right_bins() {
        let ex = extractor();
        let t = ex.extract(&sine(1000.0, 8_000, 16384.0)).unwrap();

        // The strongest bin of a mid-chunk frame should be well above
        // the weakest, and identical across frames of a steady tone.
        let frame = t.frame(t.frames() / 2);
        let max = frame.iter().cloned().fold(f32::MIN, f32::max);
        let min = frame.iter().cloned().fold(f32::MAX, f32::min);
        assert!(max - min > 5.0, "tone should concentrate energy");

        let peak_bin = |f: &[f32]| {
            f.iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                .unwrap()
                .0
        };
        let mid = peak_bin(t.frame(t.frames() / 2));
        let later = peak_bin(t.frame(t.frames() - 1));
        assert_eq!(mid, later);
    }

    #[test]
    fn extraction_is_deterministic() {
        let ex = extractor();
        let samples = sine(733.0, 15_680, 12000.0);
        let a = ex.extract(&samples).unwrap();
        let b = ex.extract(&samples).unwrap();
        assert_eq!(a, b);
    }
}
