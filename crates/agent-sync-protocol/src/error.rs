//! Error types for the sync protocol.

use thiserror::Error;

use agent_sync_core::SessionId;

/// Errors that end a synchronization cycle.
///
/// None of them touch the difference buffer: a failed cycle leaves every
/// entry in place for the next attempt.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The egress channel could not be opened.
    #[error("transport unavailable at {location}: {reason}")]
    TransportUnavailable { location: String, reason: String },

    /// A send failed, and so did the retry on a reopened channel.
    #[error("send failed after reopen: {0}")]
    SendFailed(String),

    /// Raw channel-level failure reported by a transport.
    #[error("transport error: {0}")]
    TransportError(String),

    /// A message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The remote answered Start with a negative acknowledgement.
    #[error("start of module {module} rejected by remote")]
    Negotiation { module: String },

    /// The remote answered with a message kind that is not valid here.
    #[error("unexpected message: expected {expected}, got {got}")]
    UnexpectedMessage {
        expected: &'static str,
        got: &'static str,
    },

    /// The remote answered for a different session.
    #[error("session mismatch: expected {expected}, got {got}")]
    SessionMismatch { expected: SessionId, got: SessionId },

    /// No response arrived in time.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The remote kept requesting retransmissions past the configured bound.
    #[error("retransmission did not converge after {0} rounds")]
    RetransmitLimit(u32),

    /// The remote answered End with a negative acknowledgement.
    #[error("end of session {0} rejected by remote")]
    Rejected(SessionId),

    /// The response source is gone.
    #[error("response inbox closed")]
    InboxClosed,
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
