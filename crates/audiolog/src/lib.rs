//! Audit audio persistence
//!
//! Optionally persists each sealed utterance as a raw float32 file plus a
//! JSON sidecar, published atomically (tempfile + fsync + rename) and
//! rotated oldest-first to a bounded file count. Storage failures are
//! logged and swallowed; they never affect recognition delivery.

pub mod config;
pub mod filename;
pub mod list;
pub mod logger;
pub mod rotator;
pub mod writer;

pub use config::{AudioLogConfig, AudioLogConfigUpdate, SharedAudioLogConfig};
pub use filename::{compose_filename, parse_filename, validate_client_filename, ParsedName};
pub use list::{list_pairs, AudioLogEntry};
pub use logger::AudioLogger;
pub use rotator::Rotator;
pub use writer::{read_raw, write_pair, PublishedPair, RawMeta};

use thiserror::Error;

/// Audio log errors
#[derive(Error, Debug)]
pub enum AudioLogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("corrupt raw file: {0}")]
    CorruptRaw(String),
}
