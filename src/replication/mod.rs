//! Replication is achieved through a simplistic leader/follower model.
//!
//! The [`LeaderNode`] is the designated leader. It assigns sequence numbers to
//! local writes and hands them to a [`ReplicationOrchestrator`], which fans them
//! out to every follower through a [`ReplicaTransport`] and reports whether a
//! write quorum confirmed in time. A [`FollowerNode`] only accepts replicated
//! writes and applies them if they are newer than what it holds.

mod client;
mod orchestrator;
mod server;
mod transport;

use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub use client::TcpTransport;
pub use orchestrator::{
    AttemptReport, DelayModel, ReplicationConfig, ReplicationOrchestrator, UnitOutcome,
};
pub use server::{FollowerNode, LeaderNode};
pub use transport::{LocalTransport, ReplicaTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Mode {
    Leader,
    Follower,
}

impl From<Mode> for clap::builder::OsStr {
    fn from(value: Mode) -> Self {
        match value {
            Mode::Leader => "leader".into(),
            Mode::Follower => "follower".into(),
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Leader => write!(f, "leader"),
            Self::Follower => write!(f, "follower"),
        }
    }
}
