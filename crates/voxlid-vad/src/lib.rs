pub mod energy;
pub mod segmenter;
pub mod types;

pub use segmenter::{keep_speech, VoiceActivitySegmenter};
pub use types::{Span, SpanKind};
