//! # Agent Sync Testkit
//!
//! Testing utilities for the agent sync engine.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Simulated remote**: a reactive counterpart that acknowledges sessions,
//!   loses data on purpose and asks for it again
//! - **Fixtures**: engines wired to a simulated remote, payload helpers
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Simulated Remote
//!
//! ```rust
//! use agent_sync_testkit::{SimulatedRemote, fixtures::engine_with_remote};
//!
//! let remote = SimulatedRemote::new().drop_times(3, 2);
//! let engine = engine_with_remote(&remote);
//! // engine.synchronize(...) now sees seq 3 lost twice before it sticks.
//! ```

#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod remote;

pub use fixtures::{
    engine_with_config, engine_with_remote, init_tracing, json_payload, populate, test_config,
    TestEngine,
};
pub use generators::{mode, module_name, operation, payload, seq_ranges, DifferenceParams};
pub use remote::SimulatedRemote;
