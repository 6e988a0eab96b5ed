use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::engine::ReplicaApplier;
use crate::replication::FollowerNode;

/// The capability to push a single sequenced write to one follower.
///
/// Implementations never fail: unreachable followers, timeouts and negative
/// acknowledgements all come back as `false`.
pub trait ReplicaTransport: Send + Sync + 'static {
    fn attempt_replicate(
        &self,
        endpoint: &str,
        key: &str,
        value: &str,
        seq: u64,
        timeout: Duration,
    ) -> impl Future<Output = bool> + Send;
}

/// In-process transport which delivers writes straight to registered followers.
///
/// This allows a single process to host a leader and several followers, each
/// with their own store, without any networking in between.
#[derive(Debug, Clone, Default)]
pub struct LocalTransport {
    followers: Arc<DashMap<String, FollowerNode>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, endpoint: impl Into<String>, follower: FollowerNode) {
        self.followers.insert(endpoint.into(), follower);
    }

    /// Remove a follower, subsequent attempts to reach it are rejected.
    pub fn disconnect(&self, endpoint: &str) -> Option<FollowerNode> {
        self.followers.remove(endpoint).map(|(_, f)| f)
    }
}

impl ReplicaTransport for LocalTransport {
    async fn attempt_replicate(
        &self,
        endpoint: &str,
        key: &str,
        value: &str,
        seq: u64,
        _timeout: Duration,
    ) -> bool {
        // Clone out of the map so no shard lock is held while applying.
        let follower = self.followers.get(endpoint).map(|f| f.value().clone());
        match follower {
            Some(follower) => {
                let applied = follower.apply(key.to_string(), value.to_string(), seq);
                debug!(endpoint, key, seq, applied, "Delivered locally");
                true
            }
            None => {
                warn!(endpoint, "Unknown follower endpoint");
                false
            }
        }
    }
}
