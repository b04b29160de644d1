//! Triangular mel filterbank construction (HTK mel scale).

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// Build `num_bins` triangular filters over `[fmin, fmax]` Hz, spaced
/// evenly on the mel scale, against an FFT of `fft_size` points at
/// `sample_rate`. Returned as one weight row per mel bin, each of
/// length `fft_size / 2 + 1`.
pub fn mel_filterbank(
    num_bins: usize,
    fft_size: usize,
    sample_rate: u32,
    fmin: f32,
    fmax: f32,
) -> Vec<Vec<f32>> {
    let freq_bins = fft_size / 2 + 1;

    // Filter edge frequencies: num_bins + 2 points on the mel scale.
    let mel_lo = hz_to_mel(fmin);
    let mel_hi = hz_to_mel(fmax);
    let edges: Vec<f32> = (0..num_bins + 2)
        .map(|i| mel_to_hz(mel_lo + (mel_hi - mel_lo) * i as f32 / (num_bins + 1) as f32))
        .collect();

    let fft_freqs: Vec<f32> = (0..freq_bins)
        .map(|k| k as f32 * sample_rate as f32 / fft_size as f32)
        .collect();

    let mut bank = Vec::with_capacity(num_bins);
    for b in 0..num_bins {
        let (lo, center, hi) = (edges[b], edges[b + 1], edges[b + 2]);
        let row: Vec<f32> = fft_freqs
            .iter()
            .map(|&f| {
                let rising = (f - lo) / (center - lo);
                let falling = (hi - f) / (hi - center);
                rising.min(falling).max(0.0)
            })
            .collect();
        bank.push(row);
    }
    bank
}
