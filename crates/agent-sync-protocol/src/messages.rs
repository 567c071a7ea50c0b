//! Sync protocol message types.
//!
//! Start, Data and End travel from the engine to the remote; StartAck,
//! RequestRetransmit and EndAck travel back.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use agent_sync_core::{Difference, Mode, Operation, SeqRange, SessionId};

/// Outcome carried by StartAck and EndAck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckStatus {
    /// The remote accepted the request.
    Ok,
    /// The remote refused the request.
    Error,
}

impl AckStatus {
    /// Check if this is a positive acknowledgement.
    pub fn is_ok(self) -> bool {
        matches!(self, AckStatus::Ok)
    }
}

/// Sync protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMessage {
    /// Open a cycle for one module.
    Start {
        /// Module being synchronized.
        module: String,
        /// Full or delta sync, forwarded as-is.
        mode: Mode,
        /// Whether this cycle was triggered in realtime.
        realtime: bool,
        /// Number of differences buffered when the cycle started.
        size: u64,
    },

    /// Remote answer to Start.
    StartAck {
        /// Whether the remote accepted the cycle.
        status: AckStatus,
        /// Token scoping every following message of the cycle.
        session_id: SessionId,
    },

    /// One buffered difference.
    Data {
        /// Engine-wide sequence of the difference.
        sequence: u64,
        /// Session the difference is sent under.
        session_id: SessionId,
        /// Changed record.
        id: String,
        /// Collection of the changed record.
        index: String,
        /// How to apply the change.
        operation: Operation,
        /// Opaque change content.
        payload: Bytes,
    },

    /// All differences of the cycle have been sent once.
    End {
        /// Session being closed.
        session_id: SessionId,
    },

    /// Remote confirmation that nothing is missing.
    EndAck {
        /// Whether the remote accepted the cycle.
        status: AckStatus,
        /// Session being confirmed.
        session_id: SessionId,
    },

    /// Remote report of sequences it did not receive.
    ///
    /// An empty range list means nothing is missing.
    RequestRetransmit {
        /// Session the request belongs to.
        session_id: SessionId,
        /// Inclusive ranges of missing sequences.
        ranges: Vec<SeqRange>,
    },
}

impl SyncMessage {
    /// Build the Data message for a buffered difference.
    pub fn data(session_id: SessionId, diff: &Difference) -> Self {
        SyncMessage::Data {
            sequence: diff.sequence,
            session_id,
            id: diff.id.clone(),
            index: diff.index.clone(),
            operation: diff.operation,
            payload: diff.payload.clone(),
        }
    }

    /// Short name of the message kind, for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::Start { .. } => "Start",
            SyncMessage::StartAck { .. } => "StartAck",
            SyncMessage::Data { .. } => "Data",
            SyncMessage::End { .. } => "End",
            SyncMessage::EndAck { .. } => "EndAck",
            SyncMessage::RequestRetransmit { .. } => "RequestRetransmit",
        }
    }

    /// Check whether this kind travels from the engine to the remote.
    pub fn is_outbound(&self) -> bool {
        matches!(
            self,
            SyncMessage::Start { .. } | SyncMessage::Data { .. } | SyncMessage::End { .. }
        )
    }

    /// Session the message is scoped to, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            SyncMessage::Start { .. } => None,
            SyncMessage::StartAck { session_id, .. }
            | SyncMessage::Data { session_id, .. }
            | SyncMessage::End { session_id }
            | SyncMessage::EndAck { session_id, .. }
            | SyncMessage::RequestRetransmit { session_id, .. } => Some(*session_id),
        }
    }
}
