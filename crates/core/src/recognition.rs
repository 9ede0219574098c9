//! Recognition result and wire error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A time-aligned span of the transcription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start offset in seconds from the beginning of the utterance.
    pub start: f64,
    /// End offset in seconds.
    pub end: f64,
    pub text: String,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// One transcription of a sealed utterance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub text: String,

    #[serde(default)]
    pub segments: Vec<Segment>,

    /// Detected or requested language (ISO 639-1 code).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl RecognitionResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            segments: Vec::new(),
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_segments(mut self, segments: Vec<Segment>) -> Self {
        self.segments = segments;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Error kinds carried on the wire as exact strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    BadHandshake,
    OddByteCount,
    Overloaded,
    Timeout,
    ModelFailure,
    StorageError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::BadHandshake => "BadHandshake",
            ErrorKind::OddByteCount => "OddByteCount",
            ErrorKind::Overloaded => "Overloaded",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::ModelFailure => "ModelFailure",
            ErrorKind::StorageError => "StorageError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-utterance recognition failure reported to the client.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct RecognitionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RecognitionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Outcome of one transcription job.
pub type RecognitionOutcome = Result<RecognitionResult, RecognitionError>;

/// Wire encoding of an outcome: either the result fields or `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecognitionPayload {
    Ok(RecognitionResult),
    Err { error: RecognitionError },
}

impl From<RecognitionOutcome> for RecognitionPayload {
    fn from(outcome: RecognitionOutcome) -> Self {
        match outcome {
            Ok(result) => RecognitionPayload::Ok(result),
            Err(error) => RecognitionPayload::Err { error },
        }
    }
}
