#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Speech,
    NonSpeech,
}

/// A half-open sample-index interval `[start, end)` labeled speech or
/// non-speech. Segmenter output covers the whole recording with
/// contiguous, alternating spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub kind: SpanKind,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}
