//! # Agent Sync Core
//!
//! Pure data model for the agent sync engine: buffered differences, the
//! operations they carry, and the sequence ranges used to address them.
//!
//! This crate contains no I/O, no locking, no networking.
//!
//! ## Key Types
//!
//! - [`Difference`] - One buffered change, identified by a global sequence number
//! - [`Operation`] - How the remote applies a difference (create, modify, delete)
//! - [`Mode`] - Full or delta synchronization, forwarded opaquely
//! - [`SessionId`] - Remote-assigned token scoping one cycle
//! - [`SeqRange`] - Inclusive sequence interval used in retransmission requests

pub mod difference;
pub mod error;
pub mod types;

pub use difference::{Difference, Mode, Operation};
pub use error::CoreError;
pub use types::{coalesce_ranges, content_id, ranges_contain, SeqRange, SessionId};
