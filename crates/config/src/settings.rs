//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Top-level application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// HTTP / WebSocket server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Voice activity detection tuning
    #[serde(default)]
    pub vad: VadSettings,

    /// Transcription dispatcher configuration
    #[serde(default)]
    pub recognition: RecognitionSettings,

    /// Audit audio logging defaults
    #[serde(default)]
    pub audio_log: AudioLogSettings,

    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilitySettings,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings before the server comes up.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recognition.workers == 0 {
            return Err(ConfigError::invalid(
                "recognition.workers",
                "at least one worker is required",
            ));
        }
        if self.recognition.max_queue_depth == 0 {
            return Err(ConfigError::invalid(
                "recognition.max_queue_depth",
                "queue depth must be positive",
            ));
        }
        if self.audio_log.max_files == 0 {
            return Err(ConfigError::invalid(
                "audio_log.max_files",
                "max_files must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.vad.threshold_on)
            || !(0.0..=1.0).contains(&self.vad.threshold_off)
        {
            return Err(ConfigError::invalid(
                "vad.threshold_on",
                "thresholds must lie in [0, 1]",
            ));
        }
        if self.vad.threshold_off >= self.vad.threshold_on {
            return Err(ConfigError::invalid(
                "vad.threshold_off",
                "release threshold must be below the trigger threshold",
            ));
        }
        if self.vad.frame_size == 0 {
            return Err(ConfigError::invalid(
                "vad.frame_size",
                "frame size must be positive",
            ));
        }
        if self.vad.max_utterance_sec <= 0.0 {
            return Err(ConfigError::invalid(
                "vad.max_utterance_sec",
                "maximum utterance duration must be positive",
            ));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket path for the audio socket
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Maximum concurrent audio sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_ws_path() -> String {
    "/ws/audio".to_string()
}
fn default_max_sessions() -> usize {
    100
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// Voice activity detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadSettings {
    /// Speech probability at or above which a frame counts as speech
    #[serde(default = "default_threshold_on")]
    pub threshold_on: f32,

    /// Probability below which a frame counts as silence while speaking
    #[serde(default = "default_threshold_off")]
    pub threshold_off: f32,

    /// Consecutive speech frames required to open an utterance
    #[serde(default = "default_min_speech_frames")]
    pub min_speech_frames: u32,

    /// Consecutive silence frames required to close an utterance (~512 ms)
    #[serde(default = "default_hangover_frames")]
    pub hangover_frames: u32,

    /// Audio kept from before the trigger (ms)
    #[serde(default = "default_pre_roll_ms")]
    pub pre_roll_ms: u32,

    /// Utterances shorter than this are discarded (ms)
    #[serde(default = "default_min_utterance_ms")]
    pub min_utterance_ms: u32,

    /// Hard cap on utterance duration (seconds)
    #[serde(default = "default_max_utterance_sec")]
    pub max_utterance_sec: f32,

    /// Samples per analysis frame
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
}

fn default_threshold_on() -> f32 {
    0.5
}
fn default_threshold_off() -> f32 {
    0.35
}
fn default_min_speech_frames() -> u32 {
    2
}
fn default_hangover_frames() -> u32 {
    16
}
fn default_pre_roll_ms() -> u32 {
    512
}
fn default_min_utterance_ms() -> u32 {
    250
}
fn default_max_utterance_sec() -> f32 {
    30.0
}
fn default_frame_size() -> usize {
    512
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            threshold_on: default_threshold_on(),
            threshold_off: default_threshold_off(),
            min_speech_frames: default_min_speech_frames(),
            hangover_frames: default_hangover_frames(),
            pre_roll_ms: default_pre_roll_ms(),
            min_utterance_ms: default_min_utterance_ms(),
            max_utterance_sec: default_max_utterance_sec(),
            frame_size: default_frame_size(),
        }
    }
}

/// Transcription dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionSettings {
    /// Worker threads running the speech-to-text model
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Utterances queued beyond this are rejected as overloaded
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,

    /// Per-job transcription deadline (seconds)
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,

    /// How long an end-mark waits for in-flight recognition (seconds)
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,

    /// Path to a local model file; the placeholder engine is used when unset
    #[serde(default)]
    pub model_path: Option<String>,
}

fn default_workers() -> usize {
    2
}
fn default_max_queue_depth() -> usize {
    32
}
fn default_job_timeout() -> u64 {
    30
}
fn default_drain_timeout() -> u64 {
    10
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_queue_depth: default_max_queue_depth(),
            job_timeout_secs: default_job_timeout(),
            drain_timeout_secs: default_drain_timeout(),
            model_path: None,
        }
    }
}

/// Audio log startup defaults; mutable at runtime through the admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioLogSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Oldest files beyond this count are deleted
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_true() -> bool {
    true
}
fn default_output_dir() -> String {
    "audio_logs".to_string()
}
fn default_max_files() -> usize {
    1000
}

impl Default for AudioLogSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            output_dir: default_output_dir(),
            max_files: default_max_files(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    /// Fallback log level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON-formatted log lines
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment.
///
/// Priority (highest to lowest):
/// 1. Environment variables (`STREAMSCRIBE__` prefix, `__` separator)
/// 2. `config/{env}.yaml` (if an environment name is given)
/// 3. `config/default.yaml`
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("STREAMSCRIBE")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.validate()?;

    Ok(settings)
}
