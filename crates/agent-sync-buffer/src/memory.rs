//! In-memory implementation of the DifferenceBuffer trait.
//!
//! All data is lost when the buffer is dropped. Thread-safe via RwLock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;

use agent_sync_core::{Difference, Operation};

use crate::traits::DifferenceBuffer;

/// In-memory difference buffer.
pub struct MemoryBuffer {
    inner: RwLock<MemoryBufferInner>,
}

struct MemoryBufferInner {
    /// Last sequence handed out (0 = none yet).
    last_sequence: u64,

    /// Pending entries per module, keyed by sequence.
    modules: HashMap<String, BTreeMap<u64, Difference>>,
}

impl MemoryBuffer {
    /// Create a new empty buffer.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryBufferInner {
                last_sequence: 0,
                modules: HashMap::new(),
            }),
        }
    }

    /// Last sequence number assigned by this buffer, across all modules.
    pub fn last_sequence(&self) -> u64 {
        self.read().last_sequence
    }

    /// Total number of buffered entries across all modules.
    pub fn total_len(&self) -> usize {
        self.read().modules.values().map(BTreeMap::len).sum()
    }

    // A panic in another thread cannot leave the map half-written: every
    // mutation is a single insert or removal.
    fn read(&self) -> RwLockReadGuard<'_, MemoryBufferInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryBufferInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl DifferenceBuffer for MemoryBuffer {
    fn append(
        &self,
        module: &str,
        id: &str,
        index: &str,
        operation: Operation,
        payload: Bytes,
    ) -> u64 {
        let mut inner = self.write();

        inner.last_sequence += 1;
        let sequence = inner.last_sequence;

        inner
            .modules
            .entry(module.to_string())
            .or_default()
            .insert(sequence, Difference::new(sequence, id, index, operation, payload));

        tracing::trace!(module, sequence, "difference buffered");
        sequence
    }

    fn snapshot(&self, module: &str) -> Vec<Difference> {
        let inner = self.read();
        inner
            .modules
            .get(module)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default()
    }

    fn len(&self, module: &str) -> usize {
        let inner = self.read();
        inner.modules.get(module).map_or(0, BTreeMap::len)
    }

    fn clear(&self, module: &str) -> usize {
        let mut inner = self.write();
        inner.modules.remove(module).map_or(0, |entries| entries.len())
    }

    fn clear_through(&self, module: &str, watermark: u64) -> usize {
        let mut inner = self.write();

        let Some(entries) = inner.modules.get_mut(module) else {
            return 0;
        };

        let before = entries.len();
        // split_off keeps everything >= key in the returned map.
        let retained = match watermark.checked_add(1) {
            Some(cut) => entries.split_off(&cut),
            None => BTreeMap::new(),
        };
        *entries = retained;
        let removed = before - entries.len();

        if entries.is_empty() {
            inner.modules.remove(module);
        }

        tracing::debug!(module, watermark, removed, "cleared confirmed differences");
        removed
    }

    fn modules(&self) -> Vec<String> {
        let inner = self.read();
        let mut names: Vec<String> = inner.modules.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_sync_core::SeqRange;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    fn push(buffer: &MemoryBuffer, module: &str, id: &str) -> u64 {
        buffer.append(module, id, "files", Operation::Create, Bytes::from_static(b"{}"))
    }

    #[test]
    fn test_sequence_is_global_across_modules() {
        let buffer = MemoryBuffer::new();

        assert_eq!(push(&buffer, "fim", "a"), 1);
        assert_eq!(push(&buffer, "syscollector", "b"), 2);
        assert_eq!(push(&buffer, "fim", "c"), 3);

        let fim: Vec<u64> = buffer.snapshot("fim").iter().map(|d| d.sequence).collect();
        assert_eq!(fim, vec![1, 3]);
        assert_eq!(buffer.last_sequence(), 3);
        assert_eq!(buffer.total_len(), 3);
    }

    #[test]
    fn test_snapshot_does_not_remove() {
        let buffer = MemoryBuffer::new();
        push(&buffer, "fim", "a");

        assert_eq!(buffer.snapshot("fim").len(), 1);
        assert_eq!(buffer.snapshot("fim").len(), 1);
        assert!(buffer.snapshot("unknown").is_empty());
        assert!(buffer.is_empty("unknown"));
    }

    #[test]
    fn test_no_dedup_of_identical_appends() {
        let buffer = MemoryBuffer::new();
        let s1 = push(&buffer, "fim", "same");
        let s2 = push(&buffer, "fim", "same");

        assert_ne!(s1, s2);
        assert_eq!(buffer.len("fim"), 2);
    }

    #[test]
    fn test_clear_removes_module_only() {
        let buffer = MemoryBuffer::new();
        push(&buffer, "fim", "a");
        push(&buffer, "fim", "b");
        push(&buffer, "sca", "c");

        assert_eq!(buffer.clear("fim"), 2);
        assert!(buffer.is_empty("fim"));
        assert_eq!(buffer.len("sca"), 1);
        assert_eq!(buffer.modules(), vec!["sca".to_string()]);
        assert_eq!(buffer.clear("fim"), 0);
    }

    #[test]
    fn test_clear_through_keeps_late_arrivals() {
        let buffer = MemoryBuffer::new();
        push(&buffer, "fim", "a");
        let watermark = push(&buffer, "fim", "b");
        let late = push(&buffer, "fim", "c");

        assert_eq!(buffer.clear_through("fim", watermark), 2);

        let remaining = buffer.snapshot("fim");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].sequence, late);
    }

    #[test]
    fn test_clear_through_max_watermark_empties_module() {
        let buffer = MemoryBuffer::new();
        push(&buffer, "fim", "a");

        assert_eq!(buffer.clear_through("fim", u64::MAX), 1);
        assert!(buffer.modules().is_empty());
        assert_eq!(buffer.clear_through("fim", u64::MAX), 0);
    }

    #[test]
    fn test_select_overlapping_ranges_once() {
        let buffer = MemoryBuffer::new();
        for i in 0..5 {
            push(&buffer, "fim", &format!("id{i}"));
        }

        let picked = buffer.select("fim", &[SeqRange::new(1, 3), SeqRange::new(2, 4)]);
        let seqs: Vec<u64> = picked.iter().map(|d| d.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);

        assert!(buffer.select("fim", &[SeqRange::new(40, 50)]).is_empty());
    }

    #[test]
    fn test_concurrent_appends_are_unique_and_ordered() {
        let buffer = Arc::new(MemoryBuffer::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    let module = if t % 2 == 0 { "fim" } else { "sca" };
                    (0..200)
                        .map(|i| push(&buffer, module, &format!("{t}-{i}")))
                        .collect::<Vec<u64>>()
                })
            })
            .collect();

        let mut all = Vec::new();
        for handle in handles {
            let seqs = handle.join().unwrap();
            assert!(seqs.windows(2).all(|w| w[0] < w[1]));
            all.extend(seqs);
        }

        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1600);
        assert_eq!(buffer.last_sequence(), 1600);

        for module in ["fim", "sca"] {
            let snapshot = buffer.snapshot(module);
            assert_eq!(snapshot.len(), 800);
            assert!(snapshot.windows(2).all(|w| w[0].sequence < w[1].sequence));
        }
    }

    proptest! {
        #[test]
        fn appends_yield_strictly_increasing_sequences(modules in prop::collection::vec("[a-c]", 1..64)) {
            let buffer = MemoryBuffer::new();
            let mut last = 0;
            for module in &modules {
                let seq = push(&buffer, module, "x");
                prop_assert!(seq > last);
                last = seq;
            }
            prop_assert_eq!(buffer.total_len(), modules.len());
        }
    }
}
