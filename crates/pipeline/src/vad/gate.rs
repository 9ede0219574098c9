//! VAD gate state machine
//!
//! Drives a speech/silence state per session and demarcates utterance
//! boundaries in the ring buffer. Hysteresis uses two thresholds; pre-roll
//! recovers the consonant that precedes the trigger; hangover covers
//! trailing fricatives.

use streamscribe_core::{AudioFrame, Mark, RingBuffer};
use uuid::Uuid;

use super::{VadConfig, VadModel};
use crate::{PipelineError, Utterance};

/// Events emitted by the gate, in time order.
#[derive(Debug)]
pub enum GateEvent {
    /// Speech opened; the utterance started `pre_roll` earlier.
    SpeechStart { utterance_id: Uuid },
    /// Speech closed. `utterance` is `None` when the segment was shorter
    /// than the configured minimum and was discarded.
    SpeechEnd {
        utterance_id: Uuid,
        utterance: Option<Utterance>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Silence,
    Speech,
}

/// Per-session gate: detector state, ring buffer, and the hysteresis
/// machine that turns frame probabilities into utterances.
pub struct VadGate {
    model: Box<dyn VadModel>,
    config: VadConfig,
    ring: RingBuffer,
    state: GateState,
    /// Consecutive frames at or above `threshold_on` while silent.
    speech_run: u32,
    /// Consecutive frames below `threshold_off` while speaking.
    silence_run: u32,
    start_mark: Option<Mark>,
    utterance_id: Option<Uuid>,
}

impl VadGate {
    pub fn new(model: Box<dyn VadModel>, config: VadConfig) -> Self {
        let ring = RingBuffer::with_capacity(config.ring_capacity());
        Self {
            model,
            config,
            ring,
            state: GateState::Silence,
            speech_run: 0,
            silence_run: 0,
            start_mark: None,
            utterance_id: None,
        }
    }

    /// Feed one frame; returns the events it produced.
    pub fn process(&mut self, frame: &AudioFrame) -> Result<Vec<GateEvent>, PipelineError> {
        self.ring.append(&frame.samples);
        let probability = self.model.predict(&frame.samples)?;
        let mut events = Vec::new();

        match self.state {
            GateState::Silence => {
                if probability >= self.config.threshold_on {
                    self.speech_run += 1;
                } else {
                    self.speech_run = 0;
                }

                if self.speech_run >= self.config.min_speech_frames {
                    events.push(self.open_utterance());
                }
            }
            GateState::Speech => {
                if probability < self.config.threshold_off {
                    self.silence_run += 1;
                } else {
                    self.silence_run = 0;
                }

                if self.silence_run >= self.config.hangover_frames {
                    events.push(self.seal_utterance()?);
                } else if self.utterance_span() >= self.config.max_utterance_samples() {
                    // Hard duration cap: seal mid-speech and return to
                    // silence so the next frames can open a fresh utterance.
                    tracing::debug!(
                        utterance_id = %self.utterance_id.unwrap_or_default(),
                        "utterance reached maximum duration, force sealing"
                    );
                    events.push(self.seal_utterance()?);
                }
            }
        }

        Ok(events)
    }

    /// Current speech state, for telemetry.
    pub fn in_speech(&self) -> bool {
        self.state == GateState::Speech
    }

    fn open_utterance(&mut self) -> GateEvent {
        let id = Uuid::new_v4();
        // Rewind over the trigger frames themselves plus the pre-roll,
        // clamped to what the ring still holds.
        let trigger_samples = self.speech_run as u64 * self.config.frame_size as u64;
        let mark = self
            .ring
            .mark()
            .rewind(trigger_samples + self.config.pre_roll_samples() as u64)
            .max(self.ring.oldest_mark());

        self.state = GateState::Speech;
        self.speech_run = 0;
        self.silence_run = 0;
        self.start_mark = Some(mark);
        self.utterance_id = Some(id);

        GateEvent::SpeechStart { utterance_id: id }
    }

    fn seal_utterance(&mut self) -> Result<GateEvent, PipelineError> {
        let mark = self
            .start_mark
            .take()
            .ok_or_else(|| PipelineError::Vad("sealing without an open utterance".to_string()))?;
        let id = self
            .utterance_id
            .take()
            .ok_or_else(|| PipelineError::Vad("sealing without an utterance id".to_string()))?;

        let samples = self.ring.since(mark)?;
        self.state = GateState::Silence;
        self.speech_run = 0;
        self.silence_run = 0;

        // The transcription contract caps input at max_utterance_sec of
        // audio; a segment that overshot by padding or frame alignment is
        // truncated here.
        let utterance = if samples.len() >= self.config.min_utterance_samples() {
            Some(Utterance::seal(
                id,
                samples,
                self.config.max_utterance_samples(),
            )?)
        } else {
            tracing::debug!(
                utterance_id = %id,
                samples = samples.len(),
                "utterance below minimum length, discarding"
            );
            None
        };

        Ok(GateEvent::SpeechEnd {
            utterance_id: id,
            utterance,
        })
    }

    fn utterance_span(&self) -> usize {
        match self.start_mark {
            Some(mark) => (self.ring.head() - mark.index()) as usize,
            None => 0,
        }
    }
}
