//! Atomic pair publish
//!
//! Each utterance becomes two files: the samples as IEEE-754 float32
//! little-endian with no header, and a JSON sidecar describing them. Both
//! are written to a tempfile in the destination directory, fsynced, and
//! renamed into place, so a file visible under its final name is always
//! complete.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use streamscribe_core::SAMPLE_RATE;
use tempfile::NamedTempFile;

use crate::filename::{compose_filename, STAMP_FORMAT};
use crate::AudioLogError;

/// Sidecar metadata document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMeta {
    pub filename: String,
    pub session_id: u64,
    pub timestamp: String,
    pub sample_rate: u32,
    pub channels: u8,
    pub data_type: String,
    pub duration_seconds: f64,
    pub samples: usize,
}

/// A successfully published `(raw, meta)` pair.
#[derive(Debug, Clone)]
pub struct PublishedPair {
    pub raw_path: PathBuf,
    pub meta_path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub session_id: u64,
}

/// Encode samples as float32 little-endian bytes.
pub fn encode_samples(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 4);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Decode a raw file's bytes back into samples.
pub fn decode_samples(bytes: &[u8]) -> Result<Vec<f32>, AudioLogError> {
    if bytes.len() % 4 != 0 {
        return Err(AudioLogError::CorruptRaw(format!(
            "length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Read a published raw file back into samples.
pub fn read_raw(path: &Path) -> Result<Vec<f32>, AudioLogError> {
    decode_samples(&std::fs::read(path)?)
}

/// Publish one utterance as an atomic `(raw, meta)` pair.
pub fn write_pair(
    dir: &Path,
    timestamp: DateTime<Utc>,
    session_id: u64,
    samples: &[f32],
) -> Result<PublishedPair, AudioLogError> {
    let filename = compose_filename(timestamp, session_id);
    let raw_path = dir.join(&filename);
    let meta_path = raw_path.with_extension("meta");

    publish(dir, &raw_path, &encode_samples(samples))?;

    let meta = RawMeta {
        filename,
        session_id,
        timestamp: timestamp.format(STAMP_FORMAT).to_string(),
        sample_rate: SAMPLE_RATE,
        channels: 1,
        data_type: "float32".to_string(),
        duration_seconds: samples.len() as f64 / SAMPLE_RATE as f64,
        samples: samples.len(),
    };
    let meta_bytes = serde_json::to_vec_pretty(&meta)?;

    if let Err(err) = publish(dir, &meta_path, &meta_bytes) {
        // Half-published pairs are cleaned up best-effort.
        let _ = std::fs::remove_file(&raw_path);
        return Err(err);
    }

    Ok(PublishedPair {
        raw_path,
        meta_path,
        timestamp,
        session_id,
    })
}

/// Tempfile in the same directory, fsync, rename.
fn publish(dir: &Path, final_path: &Path, bytes: &[u8]) -> Result<(), AudioLogError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(final_path).map_err(|e| AudioLogError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn samples() -> Vec<f32> {
        (0..4000).map(|i| ((i as f32) * 0.01).sin() * 0.5).collect()
    }

    #[test]
    fn test_pair_publish_and_meta_fields() {
        let dir = TempDir::new().unwrap();
        let pair = write_pair(dir.path(), Utc::now(), 3, &samples()).unwrap();

        assert!(pair.raw_path.is_file());
        assert!(pair.meta_path.is_file());

        let meta: RawMeta =
            serde_json::from_slice(&std::fs::read(&pair.meta_path).unwrap()).unwrap();
        assert_eq!(meta.session_id, 3);
        assert_eq!(meta.sample_rate, 16_000);
        assert_eq!(meta.channels, 1);
        assert_eq!(meta.data_type, "float32");
        assert_eq!(meta.samples, 4000);
        assert!((meta.duration_seconds - 0.25).abs() < 1e-9);

        // The raw file is exactly samples * 4 bytes.
        let raw_len = std::fs::metadata(&pair.raw_path).unwrap().len();
        assert_eq!(raw_len, meta.samples as u64 * 4);
    }

    #[test]
    fn test_raw_round_trip_is_bit_identical() {
        let dir = TempDir::new().unwrap();
        let original = samples();
        let pair = write_pair(dir.path(), Utc::now(), 1, &original).unwrap();

        let restored = read_raw(&pair.raw_path).unwrap();
        assert_eq!(restored.len(), original.len());
        for (a, b) in original.iter().zip(&restored) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_no_tempfiles_left_behind() {
        let dir = TempDir::new().unwrap();
        write_pair(dir.path(), Utc::now(), 1, &samples()).unwrap();

        let count = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_decode_rejects_truncated_files() {
        let err = decode_samples(&[0u8; 7]).unwrap_err();
        assert!(matches!(err, AudioLogError::CorruptRaw(_)));
    }

    #[test]
    fn test_empty_utterance_round_trip() {
        let dir = TempDir::new().unwrap();
        let pair = write_pair(dir.path(), Utc::now(), 1, &[]).unwrap();
        assert!(read_raw(&pair.raw_path).unwrap().is_empty());
    }
}
