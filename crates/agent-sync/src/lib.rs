//! # Agent Sync
//!
//! Accumulate state changes per module and reconcile them with a remote
//! counterpart over a one-way, best-effort queue.
//!
//! ## Overview
//!
//! Producers call [`AgentSyncProtocol::persist`] whenever a module detects a
//! change. A separate trigger calls [`AgentSyncProtocol::synchronize`] for a
//! module, which runs one Start → Data… → End cycle, repairs losses reported
//! by the remote, and only then drops the confirmed differences.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use agent_sync::{AgentSyncProtocol, SyncEngine, SyncConfig};
//! use agent_sync::core::{Mode, Operation};
//! use agent_sync::protocol::{MemoryConnector, MemoryInbox};
//!
//! async fn example() {
//!     let engine = SyncEngine::new(MemoryConnector::new(), MemoryInbox::new(), SyncConfig::default());
//!
//!     engine.persist("fim", "h1", Operation::Create, "files", "{\"path\":\"/etc/hosts\"}".into());
//!
//!     match engine.synchronize("fim", Mode::Full, false).await {
//!         Ok(report) => println!("synced {} differences", report.advertised),
//!         Err(e) => eprintln!("sync failed, will retry later: {e}"),
//!     }
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `agent_sync::core` - Data model (Difference, Operation, SeqRange, ...)
//! - `agent_sync::buffer` - Difference buffer
//! - `agent_sync::protocol` - Messages, codec, transports, session

pub mod engine;

pub use agent_sync_buffer as buffer;
pub use agent_sync_core as core;
pub use agent_sync_protocol as protocol;

pub use engine::{AgentSyncProtocol, SyncEngine};

pub use agent_sync_buffer::{DifferenceBuffer, MemoryBuffer};
pub use agent_sync_core::{Difference, Mode, Operation, SeqRange, SessionId};
pub use agent_sync_protocol::{Result, SyncConfig, SyncError, SyncReport};
