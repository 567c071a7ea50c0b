//! # Agent Sync Protocol
//!
//! Session-oriented synchronization of buffered differences over a one-way,
//! best-effort channel.
//!
//! ## Overview
//!
//! The channel offers no delivery guarantee, so the protocol detects loss
//! itself: after streaming a module's differences the engine waits for the
//! remote to report missing sequence ranges and resends them until nothing is
//! missing. Only then are the differences removed from the buffer.
//!
//! ## Key Properties
//!
//! - **Sequential**: one message in flight per session, each step awaited
//! - **Non-destructive failure**: any failure leaves the buffer untouched
//! - **Single retry**: a failed send reopens the channel and retries once
//! - **Watermark clearing**: differences appended mid-cycle survive it
//!
//! ## Message Flow
//!
//! ```text
//! Engine                               Remote
//!   |-------- Start ------------------->|
//!   |<------- StartAck (session) -------|
//!   |-------- Data (seq 1..n) --------->|
//!   |-------- End --------------------->|
//!   |<------- RequestRetransmit --------|
//!   |-------- Data (requested) -------->|
//!   |<------- RequestRetransmit --------|
//!   |-------- Data (requested) -------->|
//!   |<------- EndAck -------------------|
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod messages;
pub mod sender;
pub mod session;
pub mod transport;

pub use codec::{CborCodec, MessageCodec};
pub use config::{SyncConfig, DEFAULT_MAX_RETRANSMIT_ROUNDS, DEFAULT_QUEUE, SYNC_QUEUE_TAG};
pub use error::{Result, SyncError};
pub use messages::{AckStatus, SyncMessage};
pub use sender::QueueSender;
pub use session::{SessionState, SyncReport, SyncSession};
pub use transport::memory::{Frame, MemoryChannel, MemoryConnector, MemoryInbox};
#[cfg(unix)]
pub use transport::unix::{UnixInbox, UnixQueueConnector};
pub use transport::{Channel, Connector, Inbox};
