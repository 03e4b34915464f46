//! TCP latency probing
//!
//! Targets are grouped by `address:port`. Every unique address is sampled a
//! fixed number of times, each connect attempt bounded by its own timeout,
//! and the result is attributed to every target name sharing that address.
//! The first name listed for an address is its primary; the other names are
//! annotated as derived from it.
//!
//! ```text
//! targets ─► group by address ─► N connect samples per address ─► average over successes
//!                                      (addresses in parallel)        │
//!                                                                     └─► unreachable if none succeeded
//! ```

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument, trace, warn};

use crate::config::TargetConfig;

use super::{FetchError, SeriesGap, SeriesPoint, SeriesSnapshot, SnapshotSource};

pub const UNREACHABLE: &str = "unreachable";

/// Trait for a single latency measurement
#[async_trait]
pub trait Prober: Send + Sync {
    /// Time one attempt to reach `host:port`; `None` if it failed or timed out.
    async fn probe(&self, host: &str, port: u16) -> Option<Duration>;
}

/// Measures the time to establish a TCP connection.
#[derive(Debug, Clone)]
pub struct TcpProber {
    timeout: Duration,
}

impl TcpProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, host: &str, port: u16) -> Option<Duration> {
        let start = Instant::now();
        match timeout(self.timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => Some(start.elapsed()),
            Ok(Err(e)) => {
                trace!("{host}:{port}: connect failed: {e}");
                None
            }
            Err(_) => {
                trace!("{host}:{port}: connect timed out after {:?}", self.timeout);
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyOutcome {
    Reachable {
        average: Duration,
        successes: usize,
        attempts: usize,
    },
    Unreachable {
        attempts: usize,
    },
}

impl LatencyOutcome {
    /// Average over the successful samples only; failed samples are ignored.
    pub fn from_samples(samples: &[Option<Duration>]) -> Self {
        let successes: Vec<Duration> = samples.iter().flatten().copied().collect();

        if successes.is_empty() {
            return LatencyOutcome::Unreachable {
                attempts: samples.len(),
            };
        }

        let total: Duration = successes.iter().sum();
        LatencyOutcome::Reachable {
            average: total / successes.len() as u32,
            successes: successes.len(),
            attempts: samples.len(),
        }
    }

    /// Average latency in whole milliseconds.
    pub fn millis(&self) -> Option<u64> {
        match self {
            LatencyOutcome::Reachable { average, .. } => {
                Some((average.as_secs_f64() * 1000.0).round() as u64)
            }
            LatencyOutcome::Unreachable { .. } => None,
        }
    }
}

/// Target names sharing one network address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressGroup {
    pub host: String,
    pub port: u16,
    pub primary: String,
    pub aliases: Vec<String>,
}

impl AddressGroup {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Group targets by address, keeping the order in which addresses first appear.
pub fn group_targets(targets: &[TargetConfig]) -> Vec<AddressGroup> {
    let mut groups: Vec<AddressGroup> = Vec::new();

    for target in targets {
        let host = target.address.trim();
        match groups
            .iter_mut()
            .find(|group| group.host == host && group.port == target.port)
        {
            Some(group) => group.aliases.push(target.name.clone()),
            None => groups.push(AddressGroup {
                host: host.to_string(),
                port: target.port,
                primary: target.name.clone(),
                aliases: Vec::new(),
            }),
        }
    }

    groups
}

pub struct LatencySource<P = TcpProber> {
    groups: Vec<AddressGroup>,
    prober: P,
    samples: usize,
}

impl LatencySource<TcpProber> {
    pub fn new(targets: &[TargetConfig], samples: usize, attempt_timeout: Duration) -> Self {
        Self::with_prober(targets, samples, TcpProber::new(attempt_timeout))
    }
}

impl<P: Prober> LatencySource<P> {
    pub fn with_prober(targets: &[TargetConfig], samples: usize, prober: P) -> Self {
        Self {
            groups: group_targets(targets),
            prober,
            samples: samples.max(1),
        }
    }

    pub fn groups(&self) -> &[AddressGroup] {
        &self.groups
    }

    #[instrument(skip(self, group), fields(address = %group.address()))]
    async fn measure(&self, group: &AddressGroup) -> LatencyOutcome {
        let mut samples = Vec::with_capacity(self.samples);
        for _ in 0..self.samples {
            samples.push(self.prober.probe(&group.host, group.port).await);
        }

        let outcome = LatencyOutcome::from_samples(&samples);
        match outcome {
            LatencyOutcome::Reachable {
                average,
                successes,
                attempts,
            } => debug!(
                "{} answered {successes}/{attempts} times, {average:?} on average",
                group.primary
            ),
            LatencyOutcome::Unreachable { attempts } => {
                warn!("{} is unreachable after {attempts} attempts", group.primary)
            }
        }
        outcome
    }
}

#[async_trait]
impl<P: Prober> SnapshotSource for LatencySource<P> {
    type Snapshot = SeriesSnapshot;

    fn describe(&self) -> String {
        format!("{} latency targets", self.groups.len())
    }

    async fn fetch(&self) -> Result<SeriesSnapshot, FetchError> {
        let outcomes = join_all(self.groups.iter().map(|group| self.measure(group))).await;

        let mut snapshot = SeriesSnapshot::default();
        for (group, outcome) in self.groups.iter().zip(outcomes) {
            let names = std::iter::once(&group.primary).chain(group.aliases.iter());
            for name in names {
                match outcome.millis() {
                    Some(millis) => snapshot.points.push(SeriesPoint {
                        entity: name.clone(),
                        metric: millis,
                    }),
                    None => snapshot.gaps.push(SeriesGap {
                        entity: name.clone(),
                        reason: UNREACHABLE.to_string(),
                    }),
                }
            }

            for alias in &group.aliases {
                snapshot
                    .notes
                    .insert(alias.clone(), format!("derived from {}", group.primary));
            }
        }

        Ok(snapshot)
    }
}
