//! Proptest generators for property-based testing.

use bytes::Bytes;
use proptest::prelude::*;

use agent_sync_core::{Mode, Operation, SeqRange};

/// Generate an Operation.
pub fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        Just(Operation::Create),
        Just(Operation::Modify),
        Just(Operation::Delete),
    ]
}

/// Generate a Mode.
pub fn mode() -> impl Strategy<Value = Mode> {
    prop_oneof![Just(Mode::Full), Just(Mode::Delta)]
}

/// Generate a module name.
pub fn module_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}".prop_map(String::from)
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Bytes> {
    prop::collection::vec(any::<u8>(), 0..=max_len).prop_map(Bytes::from)
}

/// Generate up to `max_ranges` inclusive ranges inside `1..=max_seq`.
///
/// Ranges may overlap and are not sorted.
pub fn seq_ranges(max_seq: u64, max_ranges: usize) -> impl Strategy<Value = Vec<SeqRange>> {
    prop::collection::vec((1..=max_seq, 0..=max_seq), 0..=max_ranges).prop_map(move |pairs| {
        pairs
            .into_iter()
            .map(|(start, len)| SeqRange::new(start, start.saturating_add(len).min(max_seq)))
            .collect()
    })
}

/// Parameters for one `persist` call.
#[derive(Debug, Clone)]
pub struct DifferenceParams {
    /// Module the difference belongs to.
    pub module: String,
    /// Record identifier.
    pub id: String,
    /// Logical collection.
    pub index: String,
    /// How the remote applies it.
    pub operation: Operation,
    /// Opaque content.
    pub payload: Bytes,
}

impl Arbitrary for DifferenceParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            // A small module alphabet so generated batches share modules.
            prop_oneof![Just("fim"), Just("sca"), Just("inventory")],
            "[a-f0-9]{8}",
            "[a-z_]{1,12}",
            operation(),
            payload(256),
        )
            .prop_map(|(module, id, index, operation, payload)| DifferenceParams {
                module: module.to_string(),
                id,
                index,
                operation,
                payload,
            })
            .boxed()
    }
}
