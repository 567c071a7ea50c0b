//! # Agent Sync Buffer
//!
//! Volatile storage for not-yet-confirmed differences, keyed by module.
//!
//! ## Overview
//!
//! The buffer abstracts difference storage behind the [`DifferenceBuffer`]
//! trait so the sync engine can be tested against any implementation. The
//! provided implementation is [`MemoryBuffer`], a single coarse lock over the
//! module map.
//!
//! ## Design Notes
//!
//! - **Global sequence**: one monotonic counter shared by all modules, assigned
//!   under the same lock that stores the entry, so a snapshot never observes
//!   sequence `n + 1` without `n` for the same module.
//! - **Read-only cycles**: a sync cycle only takes snapshots; removal happens
//!   through [`DifferenceBuffer::clear_through`] after full confirmation.
//! - **Watermark clearing**: entries appended while a cycle runs sit above the
//!   cycle's watermark and survive its completion.

pub mod memory;
pub mod traits;

pub use memory::MemoryBuffer;
pub use traits::DifferenceBuffer;
