//! Difference: one buffered change for a module.
//!
//! Differences are immutable once buffered. The sequence number is assigned
//! by the buffer at append time and is the only identity the protocol uses
//! to address an entry.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// How the remote side applies a difference.
///
/// This set is closed and part of the wire contract: it travels as its
/// numeric code, and unknown codes are rejected when decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Operation {
    /// The record did not exist before.
    Create = 0,
    /// The record existed and changed.
    Modify = 1,
    /// The record was removed.
    Delete = 2,
}

impl Operation {
    /// Convert to the wire code.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Try to parse from the wire code.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Create),
            1 => Some(Self::Modify),
            2 => Some(Self::Delete),
            _ => None,
        }
    }
}

impl From<Operation> for u8 {
    fn from(operation: Operation) -> u8 {
        operation.to_u8()
    }
}

impl TryFrom<u8> for Operation {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value).ok_or(CoreError::UnknownOperation(value))
    }
}

/// Synchronization mode advertised in Start.
///
/// The engine forwards it without interpreting it. Travels as its numeric
/// code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Mode {
    /// The remote should treat the stream as the complete state.
    Full = 0,
    /// The remote should apply the stream on top of what it has.
    Delta = 1,
}

impl Mode {
    /// Convert to the wire code.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Try to parse from the wire code.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Full),
            1 => Some(Self::Delta),
            _ => None,
        }
    }
}

impl From<Mode> for u8 {
    fn from(mode: Mode) -> u8 {
        mode.to_u8()
    }
}

impl TryFrom<u8> for Mode {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value).ok_or(CoreError::UnknownMode(value))
    }
}

/// A buffered change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Difference {
    /// Engine-wide, strictly increasing sequence number.
    pub sequence: u64,
    /// Opaque identifier of the changed record.
    pub id: String,
    /// Logical collection the change belongs to.
    pub index: String,
    /// Opaque change content.
    pub payload: Bytes,
    /// How to apply the change.
    pub operation: Operation,
}

impl Difference {
    /// Create a difference with an already assigned sequence number.
    pub fn new(
        sequence: u64,
        id: impl Into<String>,
        index: impl Into<String>,
        operation: Operation,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            sequence,
            id: id.into(),
            index: index.into(),
            payload: payload.into(),
            operation,
        }
    }
}
