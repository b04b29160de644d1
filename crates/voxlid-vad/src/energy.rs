//! Frame energy measurement in dBFS.

/// RMS levels at or below this report the floor instead of `log10(0)`.
const RMS_EPSILON: f32 = 1e-10;

/// Level reported for silent or empty frames.
pub const DBFS_FLOOR: f32 = -100.0;

/// Root-mean-square level of a PCM frame, scaled to `[0, 1]` of full
/// scale. Squares are summed in i64 so even pathological frames cannot
/// overflow.
pub fn rms(frame: &[i16]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_squares: i64 = frame
        .iter()
        .map(|&sample| {
            let s = sample as i64;
            s * s
        })
        .sum();
    let mean_square = sum_squares as f64 / frame.len() as f64;
    (mean_square.sqrt() / 32768.0) as f32
}

/// Frame level in dBFS relative to a full-scale square wave.
pub fn dbfs(frame: &[i16]) -> f32 {
    let rms = rms(frame);
    if rms <= RMS_EPSILON {
        return DBFS_FLOOR;
    }
    20.0 * rms.log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: usize = 480; // 30 ms at 16 kHz

    #[test]
    fn silence_reports_the_floor() {
        assert_eq!(dbfs(&vec![0i16; FRAME]), DBFS_FLOOR);
        assert_eq!(dbfs(&[]), DBFS_FLOOR);
    }

    #[test]
    fn full_scale_is_near_zero_dbfs() {
        let db = dbfs(&vec![32767i16; FRAME]);
        assert!(db.abs() < 0.1);
    }

    #[test]
    fn half_scale_sine_rms() {
        let sine: Vec<i16> = (0..FRAME)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / FRAME as f32;
                (phase.sin() * 16384.0) as i16
            })
            .collect();
        // Peak 0.5 of full scale; sine RMS is peak / sqrt(2).
        assert!((rms(&sine) - 0.354).abs() < 0.01);
    }

    #[test]
    fn louder_frames_measure_higher() {
        let quiet = vec![100i16; FRAME];
        let loud = vec![10_000i16; FRAME];
        assert!(dbfs(&loud) > dbfs(&quiet));
    }
}
