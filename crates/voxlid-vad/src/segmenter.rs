//! Whole-recording speech/non-speech segmentation.
//!
//! Fixed-duration frames are classified independently by energy, then
//! merged into spans. Silence runs shorter than `min_non_speech_ms`
//! are reclassified as speech so that brief pauses inside an utterance
//! never become trim points. The segmenter only labels audio; actually
//! discarding non-speech is the caller's policy, see [`keep_speech`].

use voxlid_foundation::config::VadSettings;

use crate::energy;
use crate::types::{Span, SpanKind};

/// Per-frame dBFS threshold for each aggressiveness level. Higher
/// aggressiveness raises the bar, classifying more frames non-speech.
const THRESHOLDS_DBFS: [f32; 4] = [-60.0, -50.0, -40.0, -30.0];

pub struct VoiceActivitySegmenter {
    settings: VadSettings,
    sample_rate: u32,
    threshold_dbfs: f32,
}

impl VoiceActivitySegmenter {
    pub fn new(settings: VadSettings, sample_rate: u32) -> Self {
        let threshold_dbfs = THRESHOLDS_DBFS[settings.aggressiveness.min(3) as usize];
        Self {
            settings,
            sample_rate,
            threshold_dbfs,
        }
    }

    /// Label the whole signal. The result is contiguous, alternating,
    /// and covers exactly `[0, samples.len())`.
    pub fn segment(&self, samples: &[i16]) -> Vec<Span> {
        if samples.is_empty() {
            return Vec::new();
        }

        let frame_len = self.settings.frame_len_samples(self.sample_rate);
        let min_non_speech =
            (self.sample_rate as u64 * self.settings.min_non_speech_ms as u64 / 1000) as usize;

        let mut spans: Vec<Span> = Vec::new();
        let mut offset = 0;
        while offset < samples.len() {
            let end = (offset + frame_len).min(samples.len());
            let kind = if end - offset < frame_len {
                // Partial trailing frame cannot be classified reliably;
                // treat it as speech rather than risk trimming it.
                SpanKind::Speech
            } else {
                self.classify(&samples[offset..end])
            };
            push_merged(&mut spans, offset, end, kind);
            offset = end;
        }

        // Absorb short silences into the surrounding speech.
        let before = spans.len();
        let spans = absorb_short_non_speech(spans, min_non_speech);
        if spans.len() != before {
            tracing::trace!(
                merged = before - spans.len(),
                "short non-speech runs absorbed into speech"
            );
        }
        spans
    }

    fn classify(&self, frame: &[i16]) -> SpanKind {
        if energy::dbfs(frame) >= self.threshold_dbfs {
            SpanKind::Speech
        } else {
            SpanKind::NonSpeech
        }
    }
}

fn push_merged(spans: &mut Vec<Span>, start: usize, end: usize, kind: SpanKind) {
    if let Some(last) = spans.last_mut() {
        if last.kind == kind {
            last.end = end;
            return;
        }
    }
    spans.push(Span { start, end, kind });
}

fn absorb_short_non_speech(spans: Vec<Span>, min_non_speech_samples: usize) -> Vec<Span> {
    let mut out: Vec<Span> = Vec::with_capacity(spans.len());
    for mut span in spans {
        if span.kind == SpanKind::NonSpeech && span.len() < min_non_speech_samples {
            span.kind = SpanKind::Speech;
        }
        push_merged(&mut out, span.start, span.end, span.kind);
    }
    out
}

/// Trim policy: concatenate the speech spans of a labeled signal.
pub fn keep_speech(samples: &[i16], spans: &[Span]) -> Vec<i16> {
    let total: usize = spans
        .iter()
        .filter(|s| s.kind == SpanKind::Speech)
        .map(|s| s.len())
        .sum();
    let mut out = Vec::with_capacity(total);
    for span in spans.iter().filter(|s| s.kind == SpanKind::Speech) {
        out.extend_from_slice(&samples[span.start..span.end]);
    }
    out
}
