//! Snapshot sources
//!
//! A source performs one fetch of remote state per probe run. Sources are
//! stateless; endpoints and credentials are fixed at construction. There are
//! no retries: a failed fetch is returned to the caller, which aborts the run
//! before touching any history.

pub mod latency;
pub mod manifest;
pub mod population;
pub mod status;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::trace;

pub use latency::LatencySource;
pub use manifest::ManifestSource;
pub use population::PopulationSource;
pub use status::{StatusDigest, StatusSource};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("endpoint answered with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),
}

/// Trait for fetching the current state of a remote system
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    type Snapshot: Send;

    /// Human-readable description, used in logs.
    fn describe(&self) -> String;

    async fn fetch(&self) -> Result<Self::Snapshot, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesPoint {
    pub entity: String,
    pub metric: u64,
}

/// An entity that was part of the fetch but produced no usable metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesGap {
    pub entity: String,
    pub reason: String,
}

/// Entity/metric pairs from one fetch. The capture time is stamped by the
/// pipeline when the snapshot is appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesSnapshot {
    pub points: Vec<SeriesPoint>,
    pub gaps: Vec<SeriesGap>,

    /// Free-form remarks per entity, shown next to its value.
    pub notes: BTreeMap<String, String>,
}

impl SeriesSnapshot {
    pub fn from_points(points: impl IntoIterator<Item = (String, u64)>) -> Self {
        Self {
            points: points
                .into_iter()
                .map(|(entity, metric)| SeriesPoint { entity, metric })
                .collect(),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Check the status of `response` and decode its body as JSON.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, FetchError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
            body,
        });
    }

    trace!("received {} bytes", body.len());
    serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
}
