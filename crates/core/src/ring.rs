//! Fixed-capacity sample ring buffer
//!
//! Holds the most recent audio for a session so an utterance can be cut out
//! with pre-roll once speech is detected. Positions are absolute sample
//! indices, so marks stay comparable even after old data has been
//! overwritten.

use thiserror::Error;

/// Ring buffer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RingError {
    #[error("insufficient data: requested {requested} samples, {available} available")]
    InsufficientData { requested: usize, available: usize },

    #[error("mark at sample {mark} expired: oldest retained sample is {oldest}")]
    MarkExpired { mark: u64, oldest: u64 },
}

/// An absolute position in the sample stream.
///
/// Obtained from [`RingBuffer::mark`]; survives wrap-around and orders
/// naturally against other marks from the same buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Mark(u64);

impl Mark {
    /// Absolute sample index of this mark.
    pub fn index(self) -> u64 {
        self.0
    }

    /// A mark `samples` earlier in the stream, clamped at zero.
    pub fn rewind(self, samples: u64) -> Mark {
        Mark(self.0.saturating_sub(samples))
    }
}

/// Bounded sample queue: appends always succeed and overwrite the oldest
/// data on wrap.
#[derive(Debug)]
pub struct RingBuffer {
    buf: Vec<f32>,
    /// Total samples ever written; the next sample lands at `head % capacity`.
    head: u64,
}

impl RingBuffer {
    /// Create a buffer holding at most `capacity` samples.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be positive");
        Self {
            buf: vec![0.0; capacity],
            head: 0,
        }
    }

    /// Append samples, overwriting the oldest on wrap. Always succeeds.
    pub fn append(&mut self, samples: &[f32]) {
        let cap = self.buf.len();
        // Anything that would be overwritten before this call returns can be
        // skipped outright.
        let skip = samples.len().saturating_sub(cap);
        let mut pos = ((self.head + skip as u64) % cap as u64) as usize;
        for &s in &samples[skip..] {
            self.buf[pos] = s;
            pos += 1;
            if pos == cap {
                pos = 0;
            }
        }
        self.head += samples.len() as u64;
    }

    /// The most recent `n` samples as a fresh contiguous vec.
    pub fn tail(&self, n: usize) -> Result<Vec<f32>, RingError> {
        let available = self.len();
        if n > available {
            return Err(RingError::InsufficientData {
                requested: n,
                available,
            });
        }
        Ok(self.copy_from(self.head - n as u64, n))
    }

    /// Mark the current head of the stream.
    pub fn mark(&self) -> Mark {
        Mark(self.head)
    }

    /// The earliest mark that is still resolvable.
    pub fn oldest_mark(&self) -> Mark {
        Mark(self.oldest())
    }

    /// All samples from `mark` through the current head.
    pub fn since(&self, mark: Mark) -> Result<Vec<f32>, RingError> {
        let oldest = self.oldest();
        if mark.0 < oldest {
            return Err(RingError::MarkExpired {
                mark: mark.0,
                oldest,
            });
        }
        let n = (self.head - mark.0.min(self.head)) as usize;
        Ok(self.copy_from(mark.0, n))
    }

    /// Absolute index of the next sample to be written.
    pub fn head(&self) -> u64 {
        self.head
    }

    /// Absolute index of the oldest sample still retained.
    pub fn oldest(&self) -> u64 {
        self.head.saturating_sub(self.buf.len() as u64)
    }

    /// Samples currently retained.
    pub fn len(&self) -> usize {
        self.buf.len().min(self.head as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.head == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    fn copy_from(&self, start: u64, n: usize) -> Vec<f32> {
        let cap = self.buf.len();
        let mut out = Vec::with_capacity(n);
        let mut pos = (start % cap as u64) as usize;
        for _ in 0..n {
            out.push(self.buf[pos]);
            pos += 1;
            if pos == cap {
                pos = 0;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(range: std::ops::Range<usize>) -> Vec<f32> {
        range.map(|i| i as f32).collect()
    }

    #[test]
    fn test_append_and_tail() {
        let mut ring = RingBuffer::with_capacity(8);
        ring.append(&samples(0..5));

        assert_eq!(ring.len(), 5);
        assert_eq!(ring.tail(3).unwrap(), vec![2.0, 3.0, 4.0]);
        assert_eq!(ring.tail(5).unwrap(), samples(0..5));
    }

    #[test]
    fn test_tail_insufficient() {
        let mut ring = RingBuffer::with_capacity(8);
        ring.append(&samples(0..3));

        let err = ring.tail(4).unwrap_err();
        assert_eq!(
            err,
            RingError::InsufficientData {
                requested: 4,
                available: 3
            }
        );
    }

    #[test]
    fn test_wrap_overwrites_oldest() {
        let mut ring = RingBuffer::with_capacity(4);
        ring.append(&samples(0..6));

        assert_eq!(ring.len(), 4);
        assert_eq!(ring.tail(4).unwrap(), vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_oversized_append_keeps_newest() {
        let mut ring = RingBuffer::with_capacity(4);
        ring.append(&samples(0..10));

        assert_eq!(ring.head(), 10);
        assert_eq!(ring.tail(4).unwrap(), vec![6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_mark_and_since() {
        let mut ring = RingBuffer::with_capacity(16);
        ring.append(&samples(0..4));
        let mark = ring.mark();
        ring.append(&samples(4..9));

        assert_eq!(ring.since(mark).unwrap(), samples(4..9));
        // A mark taken at the head yields nothing until more data arrives.
        assert!(ring.since(ring.mark()).unwrap().is_empty());
    }

    #[test]
    fn test_mark_expires_after_overwrite() {
        let mut ring = RingBuffer::with_capacity(4);
        ring.append(&samples(0..2));
        let mark = ring.mark().rewind(2);
        ring.append(&samples(2..8));

        let err = ring.since(mark).unwrap_err();
        assert_eq!(err, RingError::MarkExpired { mark: 0, oldest: 4 });
    }

    #[test]
    fn test_rewind_clamps_at_stream_start() {
        let ring = RingBuffer::with_capacity(4);
        let mark = ring.mark().rewind(100);
        assert_eq!(mark.index(), 0);
    }

    #[test]
    fn test_since_spanning_wrap() {
        let mut ring = RingBuffer::with_capacity(6);
        ring.append(&samples(0..4));
        let mark = ring.mark().rewind(2);
        ring.append(&samples(4..8));

        assert_eq!(ring.since(mark).unwrap(), samples(2..8));
    }

    #[test]
    fn test_head_is_monotonic() {
        let mut ring = RingBuffer::with_capacity(4);
        let mut last = ring.head();
        for _ in 0..10 {
            ring.append(&[1.0, 2.0, 3.0]);
            assert!(ring.head() > last);
            last = ring.head();
        }
    }
}
