//! Audio log configuration
//!
//! Process-wide mutable state with a single mutation point: the admin
//! surface applies updates through [`SharedAudioLogConfig::apply`], every
//! reader takes a snapshot per utterance. A change therefore never strands
//! a half-written pair in the wrong directory.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::AudioLogError;

/// Audio log settings snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioLogConfig {
    pub enabled: bool,
    pub output_dir: PathBuf,
    pub max_files: usize,
}

impl Default for AudioLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: PathBuf::from("audio_logs"),
            max_files: 1000,
        }
    }
}

/// Partial update from the admin surface; unset fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AudioLogConfigUpdate {
    pub enabled: Option<bool>,
    pub output_dir: Option<PathBuf>,
    pub max_files: Option<usize>,
}

/// Shared handle over the current configuration.
#[derive(Clone)]
pub struct SharedAudioLogConfig {
    inner: Arc<RwLock<AudioLogConfig>>,
}

impl SharedAudioLogConfig {
    pub fn new(config: AudioLogConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// A consistent copy of the current configuration.
    pub fn snapshot(&self) -> AudioLogConfig {
        self.inner.read().clone()
    }

    /// Apply an update atomically.
    ///
    /// Validation happens against the candidate before anything is
    /// committed, so an invalid request leaves the configuration untouched.
    /// Returns the new snapshot.
    pub fn apply(&self, update: AudioLogConfigUpdate) -> Result<AudioLogConfig, AudioLogError> {
        let mut candidate = self.snapshot();

        if let Some(enabled) = update.enabled {
            candidate.enabled = enabled;
        }
        if let Some(output_dir) = update.output_dir.clone() {
            candidate.output_dir = output_dir;
        }
        if let Some(max_files) = update.max_files {
            candidate.max_files = max_files;
        }

        if candidate.max_files == 0 {
            return Err(AudioLogError::InvalidConfig(
                "max_files must be at least 1".to_string(),
            ));
        }

        // A new directory (or re-enabling) must be creatable and writable
        // before the change is accepted.
        if update.output_dir.is_some() || (update.enabled == Some(true) && candidate.enabled) {
            ensure_writable(&candidate.output_dir)?;
        }

        let mut guard = self.inner.write();
        *guard = candidate.clone();
        tracing::info!(
            enabled = candidate.enabled,
            output_dir = %candidate.output_dir.display(),
            max_files = candidate.max_files,
            "audio log configuration updated"
        );
        Ok(candidate)
    }
}

fn ensure_writable(dir: &std::path::Path) -> Result<(), AudioLogError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        AudioLogError::InvalidConfig(format!("cannot create {}: {e}", dir.display()))
    })?;
    // Probe with an anonymous temp file; dropped on return.
    tempfile::tempfile_in(dir).map_err(|e| {
        AudioLogError::InvalidConfig(format!("{} is not writable: {e}", dir.display()))
    })?;
    Ok(())
}
