//! Application state
//!
//! Shared by every connection and admin handler. Models live behind the
//! dispatcher and the VAD factory; sessions never touch them directly.

use std::sync::Arc;

use streamscribe_audiolog::{AudioLogConfig, AudioLogger, SharedAudioLogConfig};
use streamscribe_config::Settings;
use streamscribe_pipeline::{VadConfig, VadModelFactory};
use streamscribe_pipeline::TranscriptionDispatcher;

use crate::session::SessionManager;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub sessions: Arc<SessionManager>,
    pub dispatcher: Arc<TranscriptionDispatcher>,
    pub audio_log: AudioLogger,
    pub audio_log_config: SharedAudioLogConfig,
    pub vad_factory: Arc<dyn VadModelFactory>,
}

impl AppState {
    /// Build the shared state; spawns the audio logger task, so this must
    /// run on the tokio runtime.
    pub fn new(
        settings: Settings,
        dispatcher: Arc<TranscriptionDispatcher>,
        vad_factory: Arc<dyn VadModelFactory>,
    ) -> Self {
        let audio_log_config = SharedAudioLogConfig::new(AudioLogConfig {
            enabled: settings.audio_log.enabled,
            output_dir: settings.audio_log.output_dir.clone().into(),
            max_files: settings.audio_log.max_files,
        });
        let audio_log = AudioLogger::spawn(audio_log_config.clone());

        Self {
            sessions: Arc::new(SessionManager::new(settings.server.max_sessions)),
            settings: Arc::new(settings),
            dispatcher,
            audio_log,
            audio_log_config,
            vad_factory,
        }
    }

    /// Gate configuration derived from the settings.
    pub fn vad_config(&self) -> VadConfig {
        let vad = &self.settings.vad;
        VadConfig {
            threshold_on: vad.threshold_on,
            threshold_off: vad.threshold_off,
            min_speech_frames: vad.min_speech_frames,
            hangover_frames: vad.hangover_frames,
            pre_roll_ms: vad.pre_roll_ms,
            min_utterance_ms: vad.min_utterance_ms,
            max_utterance_sec: vad.max_utterance_sec,
            frame_size: vad.frame_size,
            sample_rate: streamscribe_core::SAMPLE_RATE,
        }
    }
}
