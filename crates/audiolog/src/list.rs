//! Log directory listing for the admin surface

use std::path::Path;

use serde::Serialize;

use crate::filename::parse_filename;
use crate::writer::RawMeta;
use crate::AudioLogError;

/// One row in the admin listing.
#[derive(Debug, Clone, Serialize)]
pub struct AudioLogEntry {
    pub filename: String,
    pub size_bytes: u64,
    /// From the sidecar when readable.
    pub duration_seconds: Option<f64>,
    /// Embedded timestamp, RFC 3339.
    pub timestamp: String,
}

/// List `(raw, meta)` pairs in `dir`, newest first by embedded timestamp.
///
/// Files that do not follow the naming pattern are skipped. A missing
/// directory yields an empty listing.
pub fn list_pairs(dir: &Path) -> Result<Vec<AudioLogEntry>, AudioLogError> {
    let mut entries: Vec<(crate::filename::ParsedName, AudioLogEntry)> = Vec::new();

    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    for entry in read_dir.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(parsed) = parse_filename(name) else {
            continue;
        };

        let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let meta_path = entry.path().with_extension("meta");
        let duration_seconds = std::fs::read(&meta_path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<RawMeta>(&bytes).ok())
            .map(|meta| meta.duration_seconds);

        let timestamp = parsed.timestamp.to_rfc3339();
        entries.push((
            parsed,
            AudioLogEntry {
                filename: name.to_string(),
                size_bytes,
                duration_seconds,
                timestamp,
            },
        ));
    }

    entries.sort_by(|(a, _), (b, _)| b.cmp(a));
    Ok(entries.into_iter().map(|(_, entry)| entry).collect())
}
