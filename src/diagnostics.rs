//! Consistency checks between a leader and its followers.

use std::collections::BTreeMap;
use std::fmt::Display;
use tokio::net::TcpStream;

use crate::client;
use crate::replication::Mode;
use crate::store::ValueRecord;
use crate::{Error, Result};

/// How far a follower's store is from the leader's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Keys held with the leader's sequence number.
    pub matches: usize,

    /// Keys held with an older sequence number than the leader's.
    pub lagging: Vec<String>,

    /// Keys the leader has and the follower does not.
    pub missing: Vec<String>,

    /// Keys which are newer on the follower, or only exist there.
    pub diverged: Vec<String>,

    leader_keys: usize,
}

impl ConsistencyReport {
    pub fn compare(
        leader: &BTreeMap<String, ValueRecord>,
        follower: &BTreeMap<String, ValueRecord>,
    ) -> Self {
        let mut report = Self {
            leader_keys: leader.len(),
            ..Default::default()
        };
        for (key, record) in leader {
            match follower.get(key) {
                None => report.missing.push(key.clone()),
                Some(f) if f.seq == record.seq => report.matches += 1,
                Some(f) if f.seq < record.seq => report.lagging.push(key.clone()),
                Some(_) => report.diverged.push(key.clone()),
            }
        }
        report.diverged.extend(
            follower
                .keys()
                .filter(|k| !leader.contains_key(*k))
                .cloned(),
        );
        report
    }

    /// Number of keys on the leader.
    pub fn total(&self) -> usize {
        self.leader_keys
    }

    pub fn is_consistent(&self) -> bool {
        self.lagging.is_empty() && self.missing.is_empty() && self.diverged.is_empty()
    }
}

impl Display for ConsistencyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} match, {} lag, {} missing, {} diverged",
            self.matches,
            self.total(),
            self.lagging.len(),
            self.missing.len(),
            self.diverged.len()
        )
    }
}

async fn fetch_dump(addr: &str) -> Result<(Mode, BTreeMap<String, ValueRecord>)> {
    let mut stream = TcpStream::connect(addr).await?;
    client::dump(&mut stream).await
}

/// Dump the leader and every follower concurrently and compare each follower against the leader.
pub async fn check_cluster(
    leader: &str,
    followers: &[String],
) -> Result<Vec<(String, ConsistencyReport)>> {
    let (role, leader_entries) = fetch_dump(leader).await?;
    if role != Mode::Leader {
        return Err(Error::UnexpectedResponse {
            peer: leader.to_string(),
            response: format!("node is a {role}"),
        });
    }

    let dumps = futures::future::try_join_all(followers.iter().map(|f| fetch_dump(f))).await?;
    Ok(followers
        .iter()
        .zip(dumps)
        .map(|(addr, (_, entries))| {
            (
                addr.clone(),
                ConsistencyReport::compare(&leader_entries, &entries),
            )
        })
        .collect())
}
