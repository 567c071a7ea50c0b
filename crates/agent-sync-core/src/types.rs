//! Strong type definitions for the sync protocol.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Session token assigned by the remote side in StartAck.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Get the raw token.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SessionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// An inclusive sequence interval `[start, end]`.
///
/// A range with `start > end` is empty and matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeqRange {
    /// First sequence in the range.
    pub start: u64,
    /// Last sequence in the range.
    pub end: u64,
}

impl SeqRange {
    /// Create a range covering `start..=end`.
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// A range covering a single sequence number.
    pub const fn single(seq: u64) -> Self {
        Self { start: seq, end: seq }
    }

    /// Check whether `seq` falls inside the range.
    pub fn contains(&self, seq: u64) -> bool {
        self.start <= seq && seq <= self.end
    }

    /// Count how many sequence numbers this represents.
    pub fn count(&self) -> u64 {
        if self.end >= self.start {
            (self.end - self.start).saturating_add(1)
        } else {
            0
        }
    }

    /// Check if the range matches nothing.
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

/// Check whether any range in `ranges` contains `seq`.
pub fn ranges_contain(ranges: &[SeqRange], seq: u64) -> bool {
    ranges.iter().any(|r| r.contains(seq))
}

/// Collapse a set of sequence numbers into the minimal list of ranges.
///
/// Input order does not matter; duplicates are ignored.
pub fn coalesce_ranges<I>(seqs: I) -> Vec<SeqRange>
where
    I: IntoIterator<Item = u64>,
{
    let mut sorted: Vec<u64> = seqs.into_iter().collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<SeqRange> = Vec::new();
    for seq in sorted {
        match ranges.last_mut() {
            Some(last) if last.end.checked_add(1) == Some(seq) => last.end = seq,
            _ => ranges.push(SeqRange::single(seq)),
        }
    }
    ranges
}

/// Derive a record identifier from a primary key.
///
/// Hex-encoded Blake3 digest, suitable as a [`Difference`](crate::Difference) id.
pub fn content_id(key: impl AsRef<[u8]>) -> String {
    hex::encode(blake3::hash(key.as_ref()).as_bytes())
}
