/// Row-major `(frames, bins)` matrix of feature values. One tensor
/// holds the spectrogram of one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTensor {
    bins: usize,
    data: Vec<f32>,
}

impl FeatureTensor {
    pub fn new(bins: usize) -> Self {
        assert!(bins > 0, "a feature tensor needs at least one bin");
        Self {
            bins,
            data: Vec::new(),
        }
    }

    pub fn with_frame_capacity(bins: usize, frames: usize) -> Self {
        assert!(bins > 0, "a feature tensor needs at least one bin");
        Self {
            bins,
            data: Vec::with_capacity(bins * frames),
        }
    }

    /// Rebuild a tensor from raw row-major data, e.g. read back from
    /// the cache. Returns `None` if the length is not a whole number
    /// of frames.
    pub fn from_raw(bins: usize, data: Vec<f32>) -> Option<Self> {
        if bins == 0 || data.len() % bins != 0 {
            return None;
        }
        Some(Self { bins, data })
    }

    pub fn push_frame(&mut self, frame: &[f32]) {
        assert_eq!(frame.len(), self.bins);
        self.data.extend_from_slice(frame);
    }

    pub fn frames(&self) -> usize {
        self.data.len() / self.bins
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn frame(&self, idx: usize) -> &[f32] {
        &self.data[idx * self.bins..(idx + 1) * self.bins]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn iter_frames(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.bins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_read_frames() {
        let mut t = FeatureTensor::new(3);
        t.push_frame(&[1.0, 2.0, 3.0]);
        t.push_frame(&[4.0, 5.0, 6.0]);
        assert_eq!(t.frames(), 2);
        assert_eq!(t.frame(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn from_raw_rejects_ragged_data() {
        assert!(FeatureTensor::from_raw(3, vec![0.0; 7]).is_none());
        assert!(FeatureTensor::from_raw(3, vec![0.0; 9]).is_some());
        assert!(FeatureTensor::from_raw(0, vec![]).is_none());
    }

    #[test]
    #[should_panic]
    fn wrong_width_frame_panics() {
        let mut t = FeatureTensor::new(3);
        t.push_frame(&[1.0, 2.0]);
    }
}
