use std::collections::BTreeMap;
use std::future::Future;

use crate::replication::Mode;
use crate::store::{SequencedStore, ValueRecord};

/// Result of a client write accepted by the leader.
///
/// The write is committed locally regardless of `quorum_reached`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    pub seq: u64,
    pub quorum_reached: bool,
}

/// Read access shared by every node, whatever its role.
pub trait ReadableNode {
    fn store(&self) -> &SequencedStore;

    fn mode(&self) -> Mode;

    fn get(&self, key: &str) -> Option<ValueRecord> {
        self.store().get(key)
    }

    fn dump(&self) -> BTreeMap<String, ValueRecord> {
        self.store().dump()
    }

    fn reset(&self) {
        self.store().reset()
    }
}

/// A node which accepts client writes and assigns their sequence numbers.
pub trait LocalWriter: ReadableNode {
    fn write(&self, key: String, value: String) -> impl Future<Output = WriteOutcome> + Send;
}

/// A node which only accepts writes already sequenced by a leader.
pub trait ReplicaApplier: ReadableNode {
    fn apply(&self, key: String, value: String, seq: u64) -> bool;
}
