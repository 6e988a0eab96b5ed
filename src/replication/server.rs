use std::sync::Arc;
use tracing::{info, warn};

use crate::client::{Request, Response};
use crate::engine::{LocalWriter, ReadableNode, ReplicaApplier, WriteOutcome};
use crate::replication::{Mode, ReplicaTransport, ReplicationOrchestrator};
use crate::server::{handle_read, RequestHandler};
use crate::store::SequencedStore;

/// The designated leader. Writes are sequenced locally and then replicated
/// to the followers configured in its [`ReplicationOrchestrator`].
#[derive(Debug)]
pub struct LeaderNode<T> {
    store: Arc<SequencedStore>,
    orchestrator: Arc<ReplicationOrchestrator<T>>,
}

impl<T> Clone for LeaderNode<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            orchestrator: self.orchestrator.clone(),
        }
    }
}

impl<T: ReplicaTransport> LeaderNode<T> {
    pub fn new(store: Arc<SequencedStore>, orchestrator: ReplicationOrchestrator<T>) -> Self {
        Self {
            store,
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn orchestrator(&self) -> &ReplicationOrchestrator<T> {
        &self.orchestrator
    }
}

impl<T> ReadableNode for LeaderNode<T> {
    fn store(&self) -> &SequencedStore {
        &self.store
    }

    fn mode(&self) -> Mode {
        Mode::Leader
    }
}

impl<T: ReplicaTransport> LocalWriter for LeaderNode<T> {
    async fn write(&self, key: String, value: String) -> WriteOutcome {
        let seq = self.store.put_with_seq(key.clone(), value.clone());
        let quorum_reached = self
            .orchestrator
            .replicate_to_followers(&key, &value, seq)
            .await;
        if !quorum_reached {
            warn!(key, seq, "Write committed locally without quorum");
        }
        WriteOutcome {
            seq,
            quorum_reached,
        }
    }
}

impl<T: ReplicaTransport> RequestHandler for LeaderNode<T> {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Write { key, value } => {
                info!(key, "Leader write");
                let outcome = self.write(key, value).await;
                Response::written(outcome)
            }
            request @ Request::Replicate { .. } => Response::Unsupported {
                role: self.mode(),
                request: request.name().to_string(),
            },
            request => handle_read(self, request),
        }
    }
}

/// A follower only applies replicated writes, it has no local write path.
#[derive(Debug, Clone, Default)]
pub struct FollowerNode {
    store: Arc<SequencedStore>,
}

impl FollowerNode {
    pub fn new(store: Arc<SequencedStore>) -> Self {
        Self { store }
    }
}

impl ReadableNode for FollowerNode {
    fn store(&self) -> &SequencedStore {
        &self.store
    }

    fn mode(&self) -> Mode {
        Mode::Follower
    }
}

impl ReplicaApplier for FollowerNode {
    fn apply(&self, key: String, value: String, seq: u64) -> bool {
        self.store.replicate(key, value, seq)
    }
}

impl RequestHandler for FollowerNode {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Replicate { key, value, seq } => {
                let applied = self.apply(key, value, seq);
                // Stale writes are still acknowledged, the follower already holds newer data.
                Response::Replicated { ok: true, applied }
            }
            request @ Request::Write { .. } => Response::Unsupported {
                role: self.mode(),
                request: request.name().to_string(),
            },
            request => handle_read(self, request),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::replication::{LocalTransport, ReplicationConfig};
    use crate::ValueRecord;

    fn leader_with(
        transport: LocalTransport,
        followers: &[&str],
        quorum: usize,
    ) -> LeaderNode<LocalTransport> {
        let config = ReplicationConfig {
            followers: followers.iter().map(|f| f.to_string()).collect(),
            write_quorum: quorum,
            max_delay: std::time::Duration::ZERO,
            ..Default::default()
        };
        LeaderNode::new(
            Arc::new(SequencedStore::new()),
            ReplicationOrchestrator::new(config, transport),
        )
    }

    #[tokio::test]
    async fn follower_refuses_client_writes() {
        let follower = FollowerNode::default();
        let response = follower
            .handle(Request::Write {
                key: "k".into(),
                value: "v".into(),
            })
            .await;
        assert!(matches!(
            response,
            Response::Unsupported {
                role: Mode::Follower,
                ..
            }
        ));
        assert!(follower.dump().is_empty());
    }

    #[tokio::test]
    async fn leader_refuses_replicated_writes() {
        let leader = leader_with(LocalTransport::new(), &[], 0);
        let response = leader
            .handle(Request::Replicate {
                key: "k".into(),
                value: "v".into(),
                seq: 4,
            })
            .await;
        assert!(matches!(
            response,
            Response::Unsupported {
                role: Mode::Leader,
                ..
            }
        ));
        assert_eq!(leader.get("k"), None);
    }

    #[tokio::test]
    async fn leader_write_reaches_followers() {
        let transport = LocalTransport::new();
        let follower = FollowerNode::default();
        transport.register("f1", follower.clone());
        let leader = leader_with(transport, &["f1"], 1);

        let outcome = leader.write("k".into(), "v".into()).await;
        assert_eq!(
            outcome,
            WriteOutcome {
                seq: 1,
                quorum_reached: true
            }
        );
        assert_eq!(follower.get("k"), Some(ValueRecord::new("v", 1)));
    }

    #[tokio::test]
    async fn stale_replication_is_acknowledged() {
        let follower = FollowerNode::default();
        follower.apply("k".into(), "new".into(), 5);
        let response = follower
            .handle(Request::Replicate {
                key: "k".into(),
                value: "old".into(),
                seq: 3,
            })
            .await;
        assert_eq!(
            response,
            Response::Replicated {
                ok: true,
                applied: false
            }
        );
        assert_eq!(follower.get("k"), Some(ValueRecord::new("new", 5)));
    }
}
