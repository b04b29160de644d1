//! Sliding-window mean (and optional variance) normalization.
//!
//! The window is **trailing**: frame `i` is normalized with statistics
//! over the `window_len` most recent frames ending at `i`. Frames near
//! the start use a shrinking window of all available frames rather
//! than zero padding, so early statistics are never biased toward
//! artificial silence. Statistics are always computed on the original
//! input values, then applied in one pass.

use voxlid_foundation::config::NormalizerSettings;

use crate::tensor::FeatureTensor;

/// Variances below this floor are treated as flat; avoids dividing by
/// near-zero stddev on constant bins.
const STD_FLOOR: f32 = 1e-6;

pub struct SlidingWindowNormalizer {
    window_len: usize,
    normalize_variance: bool,
}

impl SlidingWindowNormalizer {
    pub fn new(settings: &NormalizerSettings) -> Self {
        Self {
            window_len: settings.window_len.max(1),
            normalize_variance: settings.normalize_variance,
        }
    }

    pub fn normalize(&self, tensor: &mut FeatureTensor) {
        let frames = tensor.frames();
        let bins = tensor.bins();
        if frames == 0 {
            return;
        }

        let mut normalized = FeatureTensor::with_frame_capacity(bins, frames);
        let mut out_frame = vec![0.0f32; bins];

        for i in 0..frames {
            let window_start = (i + 1).saturating_sub(self.window_len);
            let window = i + 1 - window_start;

            for b in 0..bins {
                let mut sum = 0.0f64;
                for f in window_start..=i {
                    sum += tensor.frame(f)[b] as f64;
                }
                let mean = sum / window as f64;

                let centered = tensor.frame(i)[b] as f64 - mean;
                out_frame[b] = if self.normalize_variance {
                    let mut var_sum = 0.0f64;
                    for f in window_start..=i {
                        let d = tensor.frame(f)[b] as f64 - mean;
                        var_sum += d * d;
                    }
                    let std = (var_sum / window as f64).sqrt().max(STD_FLOOR as f64);
                    (centered / std) as f32
                } else {
                    centered as f32
                };
            }
            normalized.push_frame(&out_frame);
        }

        *tensor = normalized;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn tensor_from(rows: &[Vec<f32>]) -> FeatureTensor {
        let mut t = FeatureTensor::new(rows[0].len());
        for r in rows {
            t.push_frame(r);
        }
        t
    }

    fn norm(window_len: usize, variance: bool) -> SlidingWindowNormalizer {
        SlidingWindowNormalizer::new(&NormalizerSettings {
            window_len,
            normalize_variance: variance,
        })
    }

    fn column_mean(t: &FeatureTensor, bin: usize) -> f32 {
        t.iter_frames().map(|f| f[bin]).sum::<f32>() / t.frames() as f32
    }

    #[test]
    fn constant_input_normalizes_to_zero() {
        let mut t = tensor_from(&vec![vec![5.0, -3.0]; 10]);
        norm(100, false).normalize(&mut t);
        for frame in t.iter_frames() {
            assert!(frame.iter().all(|&v| v.abs() < 1e-6));
        }
    }

    #[test]
    fn trailing_window_uses_only_past_frames() {
        // Step change mid-sequence: with a short trailing window the
        // frames right after the step still see pre-step values in
        // their window, so their output is positive.
        let mut rows = vec![vec![0.0f32]; 5];
        rows.extend(vec![vec![10.0f32]; 5]);
        let mut t = tensor_from(&rows);
        norm(4, false).normalize(&mut t);

        // First post-step frame: window [0,0,0,10], mean 2.5.
        assert!((t.frame(5)[0] - 7.5).abs() < 1e-5);
        // Deep into the plateau the window is all 10s again.
        assert!(t.frame(9)[0].abs() < 1e-5);
    }

    #[test]
    fn shrinking_start_window_avoids_zero_bias() {
        // First frame's window is just itself, so it normalizes to 0
        // regardless of magnitude — no phantom silence in the window.
        let mut t = tensor_from(&[vec![100.0], vec![100.0], vec![100.0]]);
        norm(50, false).normalize(&mut t);
        assert!(t.frame(0)[0].abs() < 1e-6);
        assert!(t.frame(1)[0].abs() < 1e-6);
    }

    #[test]
    fn full_window_mean_normalization_is_near_idempotent() {
        let mut rng = StdRng::seed_from_u64(11);
        let rows: Vec<Vec<f32>> = (0..200)
            .map(|_| (0..8).map(|_| 5.0 + rng.gen_range(-1.0f32..1.0)).collect())
            .collect();
        let mut t = tensor_from(&rows);
        let n = norm(200, false);

        n.normalize(&mut t);
        for b in 0..8 {
            assert!(column_mean(&t, b).abs() < 0.3, "first pass mean not ~0");
        }

        n.normalize(&mut t);
        for b in 0..8 {
            assert!(column_mean(&t, b).abs() < 0.3, "second pass mean not ~0");
        }
    }

    #[test]
    fn variance_normalization_scales_spread() {
        let mut rng = StdRng::seed_from_u64(3);
        // Two bins with very different spreads.
        let rows: Vec<Vec<f32>> = (0..300)
            .map(|_| {
                vec![
                    rng.gen_range(-0.1f32..0.1),
                    rng.gen_range(-100.0f32..100.0),
                ]
            })
            .collect();
        let mut t = tensor_from(&rows);
        norm(300, true).normalize(&mut t);

        let spread = |bin: usize| {
            let m = column_mean(&t, bin);
            (t.iter_frames().map(|f| (f[bin] - m).powi(2)).sum::<f32>() / t.frames() as f32).sqrt()
        };
        // After variance normalization both bins land near unit spread.
        assert!((spread(0) - 1.0).abs() < 0.4);
        assert!((spread(1) - 1.0).abs() < 0.4);
    }

    #[test]
    fn constant_bin_survives_variance_normalization() {
        let mut t = tensor_from(&vec![vec![2.0]; 20]);
        norm(20, true).normalize(&mut t);
        for frame in t.iter_frames() {
            assert!(frame[0].is_finite());
            assert!(frame[0].abs() < 1e-3);
        }
    }

    #[test]
    fn empty_tensor_is_a_no_op() {
        let mut t = FeatureTensor::new(4);
        norm(10, true).normalize(&mut t);
        assert_eq!(t.frames(), 0);
    }
}
