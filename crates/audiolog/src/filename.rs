//! Log file naming
//!
//! The filename pattern is load-bearing: the rotator orders files by the
//! embedded UTC timestamp, never by filesystem metadata.
//!
//! Pattern: `audio_YYYYMMDD_HHMMSS_mmm_session_<id>.raw`

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::AudioLogError;

/// Timestamp layout embedded in filenames and meta documents.
pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

/// Fields recovered from a log filename.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ParsedName {
    pub timestamp: DateTime<Utc>,
    pub session_id: u64,
}

/// Compose the `.raw` filename for an utterance.
pub fn compose_filename(timestamp: DateTime<Utc>, session_id: u64) -> String {
    format!(
        "audio_{}_session_{}.raw",
        timestamp.format(STAMP_FORMAT),
        session_id
    )
}

/// Parse a `.raw` filename back into its embedded fields.
///
/// Returns `None` for files that do not follow the pattern; the rotator
/// leaves those alone.
pub fn parse_filename(filename: &str) -> Option<ParsedName> {
    let stem = filename.strip_suffix(".raw")?;
    let rest = stem.strip_prefix("audio_")?;
    let (stamp, session) = rest.split_once("_session_")?;

    let session_id = session.parse().ok()?;
    let naive = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?;

    Some(ParsedName {
        timestamp: naive.and_utc(),
        session_id,
    })
}

/// Validate a client-supplied filename before touching the filesystem.
///
/// Only bare `.raw` names are accepted; anything resembling a path is
/// rejected.
pub fn validate_client_filename(filename: &str) -> Result<(), AudioLogError> {
    let ok = filename.ends_with(".raw")
        && !filename.contains("..")
        && !filename.contains('/')
        && !filename.contains('\\');
    if ok {
        Ok(())
    } else {
        Err(AudioLogError::InvalidFilename(filename.to_string()))
    }
}
