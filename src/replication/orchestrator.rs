use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

use crate::replication::ReplicaTransport;
use crate::{Error, Result};

/// Static replication settings for a leader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationConfig {
    /// Follower endpoints, one replication unit is started per entry.
    pub followers: Vec<String>,

    /// Number of follower confirmations required before a write counts as replicated.
    ///
    /// A quorum of 0 skips replication entirely. A quorum larger than the number of
    /// followers is accepted but can never be reached.
    pub write_quorum: usize,

    /// Bounds for the simulated network delay applied before each follower call.
    pub min_delay: Duration,
    pub max_delay: Duration,

    /// Deadline for a single follower call.
    pub call_timeout: Duration,

    /// Deadline for the whole fan-out of one write.
    pub attempt_timeout: Duration,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            followers: Vec::new(),
            write_quorum: 1,
            min_delay: Duration::ZERO,
            max_delay: Duration::from_millis(200),
            call_timeout: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(5),
        }
    }
}

impl ReplicationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_delay > self.max_delay {
            return Err(Error::InvalidConfig(format!(
                "min delay {:?} is greater than max delay {:?}",
                self.min_delay, self.max_delay
            )));
        }
        if self.call_timeout.is_zero() {
            return Err(Error::InvalidConfig("call timeout must be non-zero".into()));
        }
        if self.attempt_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "replication timeout must be non-zero".into(),
            ));
        }
        let mut seen = HashSet::new();
        for follower in &self.followers {
            if follower.trim().is_empty() {
                return Err(Error::InvalidConfig("empty follower endpoint".into()));
            }
            if !seen.insert(follower.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "follower {follower} is listed more than once"
                )));
            }
        }
        Ok(())
    }
}

/// How long each replication unit waits before contacting its follower.
///
/// This only models network variance, with both bounds at zero no unit waits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelayModel {
    /// A random delay drawn for every unit.
    Uniform { min: Duration, max: Duration },

    /// A fixed delay per follower index. Followers without an entry do not wait.
    Fixed(Vec<Duration>),
}

impl DelayModel {
    fn delay_for(&self, index: usize) -> Duration {
        match self {
            Self::Uniform { min, max } if min < max => rand::thread_rng().gen_range(*min..=*max),
            Self::Uniform { min, .. } => *min,
            Self::Fixed(delays) => delays.get(index).copied().unwrap_or(Duration::ZERO),
        }
    }
}

/// Final state of a single replication unit as observed by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// The follower acknowledged the write.
    Confirmed,
    /// The call failed or the follower answered negatively.
    Rejected,
    /// The call did not finish within the per-call timeout.
    TimedOut,
    /// Quorum was settled before the unit issued its call.
    Cancelled,
}

/// Summary of one fan-out.
///
/// `outcomes` only lists units whose result was observed before the attempt
/// returned, `abandoned` counts the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptReport {
    pub quorum_reached: bool,
    pub confirmations: usize,
    pub outcomes: Vec<(String, UnitOutcome)>,
    pub abandoned: usize,
}

/// Counts confirmations towards a quorum, at most once per follower endpoint.
#[derive(Debug)]
struct QuorumTally {
    target: usize,
    confirmed: HashSet<String>,
}

impl QuorumTally {
    fn new(target: usize) -> Self {
        Self {
            target,
            confirmed: HashSet::new(),
        }
    }

    /// Returns `false` when this follower was already counted.
    fn confirm(&mut self, endpoint: &str) -> bool {
        if self.confirmed.contains(endpoint) {
            return false;
        }
        self.confirmed.insert(endpoint.to_string())
    }

    fn count(&self) -> usize {
        self.confirmed.len()
    }

    fn reached(&self) -> bool {
        self.count() >= self.target
    }
}

/// Work needed to replicate one write to one follower.
struct ReplicationUnit<T> {
    index: usize,
    endpoint: String,
    key: Arc<str>,
    value: Arc<str>,
    seq: u64,
    delay: Duration,
    call_timeout: Duration,
    transport: Arc<T>,
    cancel: watch::Receiver<bool>,
}

impl<T: ReplicaTransport> ReplicationUnit<T> {
    async fn run(mut self) -> (usize, UnitOutcome) {
        if !self.delay.is_zero() {
            tokio::select! {
                _ = sleep(self.delay) => {}
                _ = cancelled(&mut self.cancel) => {
                    debug!(endpoint = self.endpoint, "Stopped during delay, quorum settled");
                    return (self.index, UnitOutcome::Cancelled);
                }
            }
        }
        if *self.cancel.borrow() {
            debug!(endpoint = self.endpoint, "Skipped, quorum already settled");
            return (self.index, UnitOutcome::Cancelled);
        }

        // Past this point the call runs to completion, a late result is just discarded.
        let call = self.transport.attempt_replicate(
            &self.endpoint,
            &self.key,
            &self.value,
            self.seq,
            self.call_timeout,
        );
        let outcome = match timeout(self.call_timeout, call).await {
            Ok(true) => UnitOutcome::Confirmed,
            Ok(false) => {
                debug!(endpoint = self.endpoint, seq = self.seq, "Follower rejected write");
                UnitOutcome::Rejected
            }
            Err(_) => {
                let err = Error::FollowerTimeout {
                    endpoint: self.endpoint.clone(),
                    timeout: self.call_timeout,
                };
                warn!("{err}");
                UnitOutcome::TimedOut
            }
        };
        (self.index, outcome)
    }
}

/// Resolves once the signal is raised, or once its sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Replicates leader-committed writes to followers with a write quorum.
///
/// Every call to [`ReplicationOrchestrator::replicate_to_followers`] starts one
/// unit of work per follower. As soon as enough of them confirm, the units which
/// have not yet contacted their follower are told to stop and the call returns
/// without waiting for them.
#[derive(Debug)]
pub struct ReplicationOrchestrator<T> {
    config: ReplicationConfig,
    delays: DelayModel,
    transport: Arc<T>,
}

impl<T: ReplicaTransport> ReplicationOrchestrator<T> {
    pub fn new(config: ReplicationConfig, transport: T) -> Self {
        let delays = DelayModel::Uniform {
            min: config.min_delay,
            max: config.max_delay,
        };
        Self {
            config,
            delays,
            transport: Arc::new(transport),
        }
    }

    /// Replace the delay model derived from the config.
    pub fn with_delays(mut self, delays: DelayModel) -> Self {
        self.delays = delays;
        self
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Replicate a write and report whether the write quorum confirmed it in time.
    ///
    /// A `false` result never means the local write failed, only that it is not
    /// known to be held by enough followers.
    pub async fn replicate_to_followers(&self, key: &str, value: &str, seq: u64) -> bool {
        self.replicate_with_report(key, value, seq)
            .await
            .quorum_reached
    }

    pub async fn replicate_with_report(&self, key: &str, value: &str, seq: u64) -> AttemptReport {
        let quorum = self.config.write_quorum;
        if quorum == 0 {
            debug!(key, seq, "Write quorum is 0, skipping replication");
            return AttemptReport {
                quorum_reached: true,
                confirmations: 0,
                outcomes: Vec::new(),
                abandoned: 0,
            };
        }

        let deadline = Instant::now() + self.config.attempt_timeout;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let key: Arc<str> = Arc::from(key);
        let value: Arc<str> = Arc::from(value);

        let mut units = JoinSet::new();
        for (index, endpoint) in self.config.followers.iter().enumerate() {
            let unit = ReplicationUnit {
                index,
                endpoint: endpoint.clone(),
                key: key.clone(),
                value: value.clone(),
                seq,
                delay: self.delays.delay_for(index),
                call_timeout: self.config.call_timeout,
                transport: self.transport.clone(),
                cancel: cancel_rx.clone(),
            };
            units.spawn(unit.run());
        }
        debug!(key = &*key, seq, followers = units.len(), quorum, "Dispatched replication");

        let mut tally = QuorumTally::new(quorum);
        let mut outcomes = Vec::with_capacity(units.len());
        let quorum_reached = loop {
            if tally.reached() {
                break true;
            }
            tokio::select! {
                joined = units.join_next(), if !units.is_empty() => match joined {
                    Some(Ok((index, outcome))) => {
                        let endpoint = &self.config.followers[index];
                        if outcome == UnitOutcome::Confirmed && tally.confirm(endpoint) {
                            info!(
                                key = &*key,
                                seq,
                                "Confirmation received: {}/{}",
                                tally.count(),
                                quorum
                            );
                        }
                        outcomes.push((endpoint.clone(), outcome));
                    }
                    Some(Err(e)) => warn!(error = %e, "Replication unit failed"),
                    None => {}
                },
                _ = sleep_until(deadline) => break false,
            }
        };

        // Units still delaying see the signal and stop, units with a call in flight
        // finish on their own and their result is dropped.
        let _ = cancel_tx.send(true);
        let abandoned = units.len();
        units.detach_all();

        if quorum_reached {
            debug!(key = &*key, seq, abandoned, "Quorum reached");
        } else {
            warn!(
                key = &*key,
                seq,
                confirmations = tally.count(),
                quorum,
                "Quorum not reached within {:?}",
                self.config.attempt_timeout
            );
        }

        AttemptReport {
            quorum_reached,
            confirmations: tally.count(),
            outcomes,
            abandoned,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn follower_counts_once() {
        let mut tally = QuorumTally::new(2);
        assert!(tally.confirm("a:1"));
        assert!(!tally.confirm("a:1"));
        assert!(!tally.reached());
        assert!(tally.confirm("c:1"));
        assert!(tally.reached());
        assert_eq!(tally.count(), 2);
    }

    #[test]
    fn fixed_delays_default_to_zero() {
        let delays = DelayModel::Fixed(vec![Duration::from_millis(10)]);
        assert_eq!(delays.delay_for(0), Duration::from_millis(10));
        assert_eq!(delays.delay_for(3), Duration::ZERO);
    }

    #[test]
    fn uniform_delay_stays_in_bounds() {
        let delays = DelayModel::Uniform {
            min: Duration::from_millis(5),
            max: Duration::from_millis(15),
        };
        for _ in 0..100 {
            let d = delays.delay_for(0);
            assert!(d >= Duration::from_millis(5) && d <= Duration::from_millis(15));
        }
        let flat = DelayModel::Uniform {
            min: Duration::ZERO,
            max: Duration::ZERO,
        };
        assert_eq!(flat.delay_for(1), Duration::ZERO);
    }

    #[test]
    fn config_validation() {
        assert!(ReplicationConfig::default().validate().is_ok());

        let inverted = ReplicationConfig {
            min_delay: Duration::from_millis(300),
            ..Default::default()
        };
        assert!(matches!(inverted.validate(), Err(Error::InvalidConfig(_))));

        let no_timeout = ReplicationConfig {
            call_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(no_timeout.validate().is_err());

        // An unreachable quorum is allowed.
        let oversized = ReplicationConfig {
            followers: vec!["a:1".into()],
            write_quorum: 3,
            ..Default::default()
        };
        assert!(oversized.validate().is_ok());

        let duplicated = ReplicationConfig {
            followers: vec!["a:1".into(), "b:1".into(), "a:1".into()],
            write_quorum: 2,
            ..Default::default()
        };
        assert!(matches!(duplicated.validate(), Err(Error::InvalidConfig(_))));
    }
}
