//! Whisper engine via whisper-rs
//!
//! Loads a ggml model once at startup; each transcription creates its own
//! decoding state, so one context serves all worker threads.

use std::path::Path;

use streamscribe_core::{RecognitionResult, Segment};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::{SttEngine, TranscribeRequest};
use crate::PipelineError;

pub struct WhisperStt {
    context: WhisperContext,
}

impl WhisperStt {
    /// Load a ggml model from disk. Slow; call once during startup.
    pub fn load(model_path: &Path) -> Result<Self, PipelineError> {
        if !model_path.exists() {
            return Err(PipelineError::Stt(format!(
                "whisper model not found at {}",
                model_path.display()
            )));
        }

        tracing::info!(path = %model_path.display(), "loading whisper model");
        let context = WhisperContext::new_with_params(
            &model_path.to_string_lossy(),
            WhisperContextParameters::default(),
        )
        .map_err(|e| PipelineError::Stt(format!("failed to load whisper model: {e}")))?;
        tracing::info!("whisper model loaded");

        Ok(Self { context })
    }
}

impl SttEngine for WhisperStt {
    fn transcribe(&self, request: &TranscribeRequest) -> Result<RecognitionResult, PipelineError> {
        let mut state = self
            .context
            .create_state()
            .map_err(|e| PipelineError::Stt(format!("failed to create decoder state: {e}")))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        // Segments are independent utterances; no cross-utterance context.
        params.set_no_context(true);
        if let Some(language) = request.language.as_deref() {
            params.set_language(Some(language));
        }
        if let Some(prompt) = request.prompt.as_deref() {
            params.set_initial_prompt(prompt);
        }

        state
            .full(params, &request.samples)
            .map_err(|e| PipelineError::Stt(format!("whisper decode failed: {e}")))?;

        let segment_count = state
            .full_n_segments()
            .map_err(|e| PipelineError::Stt(e.to_string()))?;

        let mut text = String::new();
        let mut segments = Vec::with_capacity(segment_count as usize);
        for i in 0..segment_count {
            let segment_text = state
                .full_get_segment_text(i)
                .map_err(|e| PipelineError::Stt(e.to_string()))?;
            let t0 = state
                .full_get_segment_t0(i)
                .map_err(|e| PipelineError::Stt(e.to_string()))?;
            let t1 = state
                .full_get_segment_t1(i)
                .map_err(|e| PipelineError::Stt(e.to_string()))?;

            text.push_str(&segment_text);
            // Whisper timestamps are in centiseconds.
            segments.push(Segment::new(
                t0 as f64 / 100.0,
                t1 as f64 / 100.0,
                segment_text.trim(),
            ));
        }

        let mut result = RecognitionResult::new(text.trim()).with_segments(segments);
        if let Some(language) = &request.language {
            result = result.with_language(language.clone());
        }
        Ok(result)
    }
}
