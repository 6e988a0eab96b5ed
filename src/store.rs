use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// A value together with the sequence number it was written under.
///
/// Records are replaced wholesale on every accepted write, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRecord {
    pub value: String,

    /// Per-key sequence number, starting at 1.
    pub seq: u64,
}

impl ValueRecord {
    pub fn new(value: impl Into<String>, seq: u64) -> Self {
        Self {
            value: value.into(),
            seq,
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    records: HashMap<String, ValueRecord>,

    /// Leader-only counters. A missing entry counts as 0.
    counters: HashMap<String, u64>,
}

/// An in-memory key-value store where every value carries a sequence number.
///
/// The leader assigns sequence numbers through [`SequencedStore::put_with_seq`],
/// followers apply them through [`SequencedStore::replicate`], which only accepts
/// writes newer than what is already held. Both maps sit behind a single lock so
/// that no reader can ever observe a counter without its matching record.
#[derive(Debug, Default)]
pub struct SequencedStore {
    state: Mutex<StoreState>,
}

impl SequencedStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Every operation leaves both maps consistent before releasing the lock, so a
    // poisoned lock still guards valid state.
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a value under the next sequence number for `key` and return that number.
    pub fn put_with_seq(&self, key: String, value: String) -> u64 {
        let mut state = self.lock();
        let seq = state.counters.get(&key).copied().unwrap_or(0) + 1;
        state.counters.insert(key.clone(), seq);
        debug!(key, seq, "Assigned sequence");
        state.records.insert(key, ValueRecord { value, seq });
        seq
    }

    /// Apply a replicated write if `seq` is newer than the stored one.
    ///
    /// Returns `false` and leaves the record untouched for stale or duplicate writes.
    pub fn replicate(&self, key: String, value: String, seq: u64) -> bool {
        let mut state = self.lock();
        match state.records.get(&key).map(|r| r.seq) {
            Some(current) if seq <= current => {
                debug!(key, seq, current, "Ignoring stale write");
                false
            }
            _ => {
                debug!(key, seq, "Applying replicated write");
                state.records.insert(key, ValueRecord { value, seq });
                true
            }
        }
    }

    /// Retrieve the record for a key. If the key does not exist, then [`None`] is returned.
    pub fn get(&self, key: &str) -> Option<ValueRecord> {
        self.lock().records.get(key).cloned()
    }

    /// Snapshot of every record, taken under a single lock acquisition.
    pub fn dump(&self) -> BTreeMap<String, ValueRecord> {
        self.lock()
            .records
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Clear all records and sequence counters.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.records.clear();
        state.counters.clear();
        debug!("Store reset");
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn sequence_starts_at_one_per_key() {
        let store = SequencedStore::new();
        assert_eq!(store.put_with_seq("a".to_owned(), "1".to_owned()), 1);
        assert_eq!(store.put_with_seq("b".to_owned(), "1".to_owned()), 1);
        assert_eq!(store.put_with_seq("a".to_owned(), "2".to_owned()), 2);
        assert_eq!(store.get("a"), Some(ValueRecord::new("2", 2)));
    }

    #[test]
    fn reset_clears_counters() {
        let store = SequencedStore::new();
        store.put_with_seq("a".to_owned(), "1".to_owned());
        store.put_with_seq("a".to_owned(), "2".to_owned());
        store.reset();
        assert!(store.is_empty());
        assert_eq!(store.put_with_seq("a".to_owned(), "3".to_owned()), 1);
    }

    #[test]
    fn replicate_does_not_touch_counters() {
        let store = SequencedStore::new();
        assert!(store.replicate("a".to_owned(), "x".to_owned(), 7));
        // Counters only track local writes.
        assert_eq!(store.put_with_seq("a".to_owned(), "y".to_owned()), 1);
    }

    #[test]
    fn concurrent_writers_never_share_a_sequence() {
        let store = Arc::new(SequencedStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|i| store.put_with_seq("hot".to_owned(), format!("{t}-{i}")))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seqs: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        seqs.sort_unstable();
        assert_eq!(seqs, (1..=800).collect::<Vec<_>>());
        assert_eq!(store.get("hot").unwrap().seq, 800);
    }
}
