//! Streaming recognition pipeline
//!
//! This crate turns per-session audio frames into sealed utterances and
//! transcription results:
//! - Voice activity gate with hysteresis, pre-roll, and hangover
//! - Sealed utterance value type
//! - Speech-to-text engine trait with a placeholder backend
//! - Process-wide transcription dispatcher and worker pool

pub mod dispatcher;
pub mod stt;
pub mod utterance;
pub mod vad;

pub use dispatcher::{DispatcherConfig, TranscriptionDispatcher};
pub use stt::{PlaceholderStt, SttEngine, TranscribeRequest};
pub use utterance::Utterance;
pub use vad::{EnergyVad, EnergyVadFactory, GateEvent, VadConfig, VadGate, VadModel, VadModelFactory};

#[cfg(feature = "whisper")]
pub use stt::WhisperStt;

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("VAD error: {0}")]
    Vad(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("audio error: {0}")]
    Audio(String),

    #[error("transcription queue is full")]
    QueueFull,

    #[error("dispatcher is shut down")]
    ChannelClosed,
}

impl From<streamscribe_core::RingError> for PipelineError {
    fn from(err: streamscribe_core::RingError) -> Self {
        PipelineError::Audio(err.to_string())
    }
}
