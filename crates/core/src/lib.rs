//! Core types for the streaming recognition service
//!
//! This crate provides the foundational pieces shared by every other crate:
//! - Sample ring buffer with absolute-index marks
//! - Byte-stream to frame assembly for the canonical PCM format
//! - Recognition result and wire error types

pub mod frame;
pub mod recognition;
pub mod ring;

pub use frame::{AudioFrame, FrameAssembler, FrameError};
pub use recognition::{
    ErrorKind, RecognitionError, RecognitionOutcome, RecognitionPayload, RecognitionResult,
    Segment,
};
pub use ring::{Mark, RingBuffer, RingError};

/// Canonical sample rate: everything downstream of the socket is 16 kHz mono.
pub const SAMPLE_RATE: u32 = 16_000;

/// Default samples per analysis frame (32 ms at 16 kHz).
pub const DEFAULT_FRAME_SIZE: usize = 512;
