//! Voice Activity Detection
//!
//! The detector itself is pluggable: anything that maps a fixed-size frame
//! to a speech probability can drive the gate. Detector state is
//! per-session, so each session gets its own model instance from a shared
//! factory.

mod gate;

pub use gate::{GateEvent, VadGate};

use crate::PipelineError;

/// A stateful speech probability model.
///
/// `predict` must be deterministic given the model state and perform no
/// I/O; it is called once per frame on the session task.
pub trait VadModel: Send {
    /// Speech probability in [0, 1] for one frame of samples.
    fn predict(&mut self, frame: &[f32]) -> Result<f32, PipelineError>;

    /// Clear accumulated detector state.
    fn reset(&mut self);
}

/// Creates one detector instance per session.
pub trait VadModelFactory: Send + Sync {
    fn create(&self) -> Box<dyn VadModel>;
}

/// Gate configuration.
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Probability at or above which a frame counts as speech.
    pub threshold_on: f32,
    /// Probability below which a frame counts as silence while speaking.
    /// Kept below `threshold_on` so borderline frames cannot flap the gate.
    pub threshold_off: f32,
    /// Consecutive speech frames required to open an utterance.
    pub min_speech_frames: u32,
    /// Consecutive silence frames kept at the tail before sealing.
    pub hangover_frames: u32,
    /// Audio retained from before the trigger (ms).
    pub pre_roll_ms: u32,
    /// Sealed segments shorter than this are discarded (ms).
    pub min_utterance_ms: u32,
    /// Hard cap on utterance duration (seconds).
    pub max_utterance_sec: f32,
    /// Samples per frame.
    pub frame_size: usize,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold_on: 0.5,
            threshold_off: 0.35,
            min_speech_frames: 2,
            hangover_frames: 16,
            pre_roll_ms: 512,
            min_utterance_ms: 250,
            max_utterance_sec: 30.0,
            frame_size: streamscribe_core::DEFAULT_FRAME_SIZE,
            sample_rate: streamscribe_core::SAMPLE_RATE,
        }
    }
}

impl VadConfig {
    pub fn pre_roll_samples(&self) -> usize {
        (self.sample_rate as u64 * self.pre_roll_ms as u64 / 1000) as usize
    }

    pub fn min_utterance_samples(&self) -> usize {
        (self.sample_rate as u64 * self.min_utterance_ms as u64 / 1000) as usize
    }

    pub fn max_utterance_samples(&self) -> usize {
        (self.max_utterance_sec as f64 * self.sample_rate as f64) as usize
    }

    pub fn hangover_samples(&self) -> usize {
        self.hangover_frames as usize * self.frame_size
    }

    /// Ring capacity: the longest possible utterance plus one frame of slack.
    pub fn ring_capacity(&self) -> usize {
        self.max_utterance_samples()
            + self.pre_roll_samples()
            + self.hangover_samples()
            + self.frame_size
    }
}

/// Energy detector used when no model is configured.
///
/// Reports 1.0 when the frame RMS clears the floor and 0.0 otherwise, the
/// same hard decision a WebRTC-style detector produces. Good enough for
/// wiring and tests; production deployments plug in a real model.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    floor: f32,
}

impl EnergyVad {
    pub fn new(floor: f32) -> Self {
        Self { floor }
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        // Roughly -40 dBFS: quiet rooms stay below, speech clears it.
        Self { floor: 0.01 }
    }
}

impl VadModel for EnergyVad {
    fn predict(&mut self, frame: &[f32]) -> Result<f32, PipelineError> {
        if frame.is_empty() {
            return Err(PipelineError::Vad("empty frame".to_string()));
        }
        let energy = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
        let rms = energy.sqrt();
        Ok(if rms >= self.floor { 1.0 } else { 0.0 })
    }

    fn reset(&mut self) {}
}

/// Factory for [`EnergyVad`] detectors.
#[derive(Debug, Clone, Default)]
pub struct EnergyVadFactory {
    floor: Option<f32>,
}

impl EnergyVadFactory {
    pub fn with_floor(floor: f32) -> Self {
        Self { floor: Some(floor) }
    }
}

impl VadModelFactory for EnergyVadFactory {
    fn create(&self) -> Box<dyn VadModel> {
        Box::new(match self.floor {
            Some(floor) => EnergyVad::new(floor),
            None => EnergyVad::default(),
        })
    }
}
