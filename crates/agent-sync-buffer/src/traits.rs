//! Buffer trait: the abstract interface for difference storage.

use bytes::Bytes;

use agent_sync_core::{ranges_contain, Difference, Operation, SeqRange};

/// Module-keyed storage of pending differences.
///
/// Implementations must be safe to call from producer threads while a sync
/// cycle is reading the same module.
///
/// # Design Notes
///
/// - **Infallible**: appends never fail and there is no eviction policy.
/// - **Ordered**: snapshots are in ascending sequence order, which is also
///   append order.
/// - **No dedup**: appending the same fields twice buffers two entries.
pub trait DifferenceBuffer: Send + Sync {
    /// Store a difference under `module` and return its assigned sequence.
    fn append(
        &self,
        module: &str,
        id: &str,
        index: &str,
        operation: Operation,
        payload: Bytes,
    ) -> u64;

    /// Current entries for `module`, without removing them.
    fn snapshot(&self, module: &str) -> Vec<Difference>;

    /// Number of entries currently buffered for `module`.
    fn len(&self, module: &str) -> usize;

    /// Remove every entry of `module`.
    ///
    /// Returns the number of entries removed.
    fn clear(&self, module: &str) -> usize;

    /// Remove the entries of `module` whose sequence is `<= watermark`.
    ///
    /// Returns the number of entries removed.
    fn clear_through(&self, module: &str, watermark: u64) -> usize;

    /// Names of the modules that currently hold entries.
    fn modules(&self) -> Vec<String>;

    /// Check whether `module` has no buffered entries.
    fn is_empty(&self, module: &str) -> bool {
        self.len(module) == 0
    }

    /// Entries of `module` whose sequence falls inside any of `ranges`.
    ///
    /// Each entry appears at most once, even under overlapping ranges.
    fn select(&self, module: &str, ranges: &[SeqRange]) -> Vec<Difference> {
        self.snapshot(module)
            .into_iter()
            .filter(|diff| ranges_contain(ranges, diff.sequence))
            .collect()
    }
}
