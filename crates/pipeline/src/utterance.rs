//! Sealed utterance
//!
//! A time-contiguous speech segment cut out of the session ring buffer.
//! Once sealed it is immutable and moves by value: session → dispatcher →
//! result writer, with no shared mutation anywhere.

use streamscribe_core::SAMPLE_RATE;
use uuid::Uuid;

use crate::PipelineError;

/// An immutable speech segment between `speech_start` and `speech_end`,
/// including pre-roll and hangover.
#[derive(Debug, Clone)]
pub struct Utterance {
    id: Uuid,
    samples: Vec<f32>,
}

impl Utterance {
    /// Seal a segment, truncating anything beyond `max_samples`.
    pub fn seal(id: Uuid, mut samples: Vec<f32>, max_samples: usize) -> Result<Self, PipelineError> {
        if samples.is_empty() {
            return Err(PipelineError::Audio("cannot seal an empty utterance".to_string()));
        }
        if samples.len() > max_samples {
            samples.truncate(max_samples);
        }
        Ok(Self { id, samples })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / SAMPLE_RATE as f64
    }
}
