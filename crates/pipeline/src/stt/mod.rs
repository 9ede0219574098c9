//! Speech-to-Text engines
//!
//! The model is an opaque collaborator: it receives a complete utterance at
//! 16 kHz and returns text with segment timings. Engines are invoked only
//! from dispatcher worker threads and may block for seconds.

#[cfg(feature = "whisper")]
mod whisper;

#[cfg(feature = "whisper")]
pub use whisper::WhisperStt;

use streamscribe_core::{RecognitionResult, Segment, SAMPLE_RATE};

use crate::PipelineError;

/// One transcription request, moved into the worker pool.
#[derive(Debug, Clone)]
pub struct TranscribeRequest {
    /// Utterance samples, 16 kHz mono f32.
    pub samples: Vec<f32>,
    /// Target language (ISO 639-1); `None` lets the model detect it.
    pub language: Option<String>,
    /// Optional priming prompt for the decoder.
    pub prompt: Option<String>,
}

impl TranscribeRequest {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / SAMPLE_RATE as f64
    }
}

/// Speech-to-text backend.
///
/// Implementations must be safe to call from multiple worker threads; each
/// call is independent (no cross-utterance state).
pub trait SttEngine: Send + Sync {
    /// Transcribe one utterance. Blocking; called off the async runtime.
    fn transcribe(&self, request: &TranscribeRequest) -> Result<RecognitionResult, PipelineError>;

    /// Whether a real model is backing this engine.
    fn is_loaded(&self) -> bool {
        true
    }
}

/// Fixed-output engine for wiring the service without a model, and for
/// deterministic tests.
#[derive(Debug, Default)]
pub struct PlaceholderStt {
    /// If set, returned verbatim instead of the descriptive default.
    response: Option<String>,
}

impl PlaceholderStt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
        }
    }
}

impl SttEngine for PlaceholderStt {
    fn transcribe(&self, request: &TranscribeRequest) -> Result<RecognitionResult, PipelineError> {
        let duration = request.duration_secs();
        let text = match &self.response {
            Some(response) => response.clone(),
            None => format!(
                "[placeholder transcription: {} samples, {:.2}s]",
                request.samples.len(),
                duration
            ),
        };

        let mut result = RecognitionResult::new(text.clone())
            .with_segments(vec![Segment::new(0.0, duration, text)]);
        if let Some(language) = &request.language {
            result = result.with_language(language.clone());
        }
        Ok(result)
    }

    fn is_loaded(&self) -> bool {
        false
    }
}
