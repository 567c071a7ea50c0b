//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tracing::Level;

use agent_sync::{AgentSyncProtocol, Operation, SyncConfig, SyncEngine};

use crate::remote::SimulatedRemote;

/// An engine talking to a [`SimulatedRemote`] on both sides.
pub type TestEngine = SyncEngine<SimulatedRemote, SimulatedRemote>;

/// Configuration with a short response timeout, suitable for tests.
pub fn test_config() -> SyncConfig {
    SyncConfig::default().with_response_timeout(Duration::from_millis(200))
}

/// Create an engine wired to `remote` with [`test_config`].
pub fn engine_with_remote(remote: &SimulatedRemote) -> TestEngine {
    engine_with_config(remote, test_config())
}

/// Create an engine wired to `remote` with a custom configuration.
pub fn engine_with_config(remote: &SimulatedRemote, config: SyncConfig) -> TestEngine {
    SyncEngine::new(remote.clone(), remote.clone(), config)
}

/// Serialize `value` as a JSON payload.
pub fn json_payload<T: Serialize>(value: &T) -> Bytes {
    Bytes::from(serde_json::to_vec(value).expect("payload serializes"))
}

/// Persist `count` distinct Create differences for `module`.
///
/// Returns the sequences assigned, in order.
pub fn populate(engine: &TestEngine, module: &str, count: usize) -> Vec<u64> {
    (0..count)
        .map(|i| {
            let id = format!("{module}-{i}");
            let payload = json_payload(&serde_json::json!({ "id": id, "n": i }));
            engine.persist(module, &id, Operation::Create, "records", payload)
        })
        .collect()
}

/// Install a test-friendly subscriber. Safe to call more than once.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(Level::DEBUG)
        .try_init()
        .ok();
}
