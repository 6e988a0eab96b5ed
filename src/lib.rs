//! A leader-based key-value store with semi-synchronous replication.
//!
//! Every node owns a [`SequencedStore`]. The leader stamps each write with a
//! per-key sequence number and replicates it to its followers, reporting success
//! once a configurable write quorum has confirmed. Followers only keep a write if
//! its sequence number is newer than the one they hold, which makes their final
//! state independent of the order replicated writes arrive in.

pub mod client;
pub mod diagnostics;
pub mod engine;
mod error;
pub mod replication;
pub mod server;
pub mod store;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;

pub use engine::{LocalWriter, ReadableNode, ReplicaApplier, WriteOutcome};
pub use error::{Error, Result};
pub use replication::{
    FollowerNode, LeaderNode, LocalTransport, Mode, ReplicaTransport, ReplicationConfig,
    ReplicationOrchestrator, TcpTransport,
};
pub use server::NodeServer;
pub use store::{SequencedStore, ValueRecord};

pub const DEFAULT_ADDR: &str = "127.0.0.1:4000";

/// Install a global subscriber which writes to stderr at the given level.
pub fn init_tracing(level: LevelFilter) -> Result<()> {
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let subscriber = tracing_subscriber::registry().with(level).with(layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
