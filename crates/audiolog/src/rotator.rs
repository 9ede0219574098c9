//! Pair rotation
//!
//! Keeps the number of `(raw, meta)` pairs in the output directory within
//! the configured bound by deleting the oldest pairs, ordered by the
//! timestamp embedded in the filename. Files that do not follow the naming
//! pattern are left untouched.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::filename::parse_filename;
use crate::writer::PublishedPair;

/// One tracked pair; the derived ordering is the rotation order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct TrackedPair {
    timestamp: chrono::DateTime<chrono::Utc>,
    session_id: u64,
    filename: String,
}

/// Tracks the pairs in one directory and evicts the oldest.
pub struct Rotator {
    dir: PathBuf,
    tracked: BTreeSet<TrackedPair>,
}

impl Rotator {
    /// Track `dir`, populating from its current contents.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let mut rotator = Self {
            dir: dir.into(),
            tracked: BTreeSet::new(),
        };
        rotator.rescan();
        rotator
    }

    /// Follow a configuration directory change: flush the tracked set and
    /// repopulate from the new directory.
    pub fn sync_dir(&mut self, dir: &Path) {
        if self.dir != dir {
            tracing::info!(
                from = %self.dir.display(),
                to = %dir.display(),
                "audio log directory changed, rescanning"
            );
            self.dir = dir.to_path_buf();
            self.rescan();
        }
    }

    /// Rebuild the tracked set from the directory, picking up files added
    /// by other processes.
    pub fn rescan(&mut self) {
        self.tracked.clear();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            // A missing directory is an empty set, not an error.
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(parsed) = parse_filename(name) {
                self.tracked.insert(TrackedPair {
                    timestamp: parsed.timestamp,
                    session_id: parsed.session_id,
                    filename: name.to_string(),
                });
            }
        }
    }

    /// Record a freshly published pair.
    pub fn record(&mut self, pair: &PublishedPair) {
        if let Some(name) = pair.raw_path.file_name().and_then(|n| n.to_str()) {
            self.tracked.insert(TrackedPair {
                timestamp: pair.timestamp,
                session_id: pair.session_id,
                filename: name.to_string(),
            });
        }
    }

    /// Pairs currently tracked.
    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Delete oldest pairs until at most `max_files` remain. Returns the
    /// number of pairs removed.
    pub fn enforce(&mut self, max_files: usize) -> usize {
        let mut deleted = 0;
        while self.tracked.len() > max_files {
            let Some(oldest) = self.tracked.pop_first() else {
                break;
            };
            let raw = self.dir.join(&oldest.filename);
            let meta = raw.with_extension("meta");

            for path in [&raw, &meta] {
                if let Err(err) = std::fs::remove_file(path) {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(path = %path.display(), error = %err, "failed to delete rotated file");
                    }
                }
            }
            tracing::info!(filename = %oldest.filename, "rotated out audio log pair");
            deleted += 1;
        }
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::write_pair;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn stamp(offset_ms: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 2, 12, 0, 0).unwrap() + Duration::milliseconds(offset_ms)
    }

    fn raw_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .flatten()
            .filter_map(|e| e.file_name().to_str().map(String::from))
            .filter(|n| n.ends_with(".raw"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_rotation_keeps_newest_by_embedded_timestamp() {
        let dir = TempDir::new().unwrap();
        let mut rotator = Rotator::new(dir.path());

        for i in 0..5 {
            let pair = write_pair(dir.path(), stamp(i * 10), 1, &[0.0; 16]).unwrap();
            rotator.record(&pair);
        }
        let deleted = rotator.enforce(3);

        assert_eq!(deleted, 2);
        assert_eq!(rotator.len(), 3);
        let remaining = raw_files(dir.path());
        assert_eq!(remaining.len(), 3);
        // The two oldest stamps are gone.
        assert!(remaining.iter().all(|n| !n.contains("_120000_000_") && !n.contains("_120000_010_")));
        // Meta sidecars went with them.
        let metas = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".meta"))
            .count();
        assert_eq!(metas, 3);
    }

    #[test]
    fn test_rescan_picks_up_external_files() {
        let dir = TempDir::new().unwrap();
        let mut rotator = Rotator::new(dir.path());
        assert!(rotator.is_empty());

        // Pairs written by someone else.
        for i in 0..4 {
            write_pair(dir.path(), stamp(i), 2, &[0.0; 8]).unwrap();
        }
        rotator.rescan();
        assert_eq!(rotator.len(), 4);

        rotator.enforce(2);
        assert_eq!(raw_files(dir.path()).len(), 2);
    }

    #[test]
    fn test_foreign_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.raw"), b"not ours").unwrap();
        std::fs::write(dir.path().join("data.bin"), b"other").unwrap();

        let mut rotator = Rotator::new(dir.path());
        assert!(rotator.is_empty());

        rotator.enforce(0);
        assert!(dir.path().join("notes.raw").exists());
        assert!(dir.path().join("data.bin").exists());
    }

    #[test]
    fn test_sync_dir_flushes_and_repopulates() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();

        write_pair(dir_a.path(), stamp(0), 1, &[0.0; 8]).unwrap();
        write_pair(dir_b.path(), stamp(1), 1, &[0.0; 8]).unwrap();
        write_pair(dir_b.path(), stamp(2), 1, &[0.0; 8]).unwrap();

        let mut rotator = Rotator::new(dir_a.path());
        assert_eq!(rotator.len(), 1);

        rotator.sync_dir(dir_b.path());
        assert_eq!(rotator.len(), 2);

        // Rotation now applies to the new directory only.
        rotator.enforce(1);
        assert_eq!(raw_files(dir_a.path()).len(), 1);
        assert_eq!(raw_files(dir_b.path()).len(), 1);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let rotator = Rotator::new("/nonexistent/streamscribe-test");
        assert!(rotator.is_empty());
    }
}
