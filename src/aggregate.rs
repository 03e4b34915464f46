//! Summary statistics over a series history
//!
//! Nothing here mutates the history. Means are taken over the whole history,
//! not a window.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::history::{Observation, SeriesHistory};

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateView {
    /// Mean metric over every observation; NaN for an empty history.
    pub overall_mean: f64,

    pub per_entity_mean: BTreeMap<String, f64>,

    /// Timestamp shared by the cross-section, if there is any data.
    pub latest_at: Option<DateTime<Utc>>,

    /// Observations at the most recent timestamp, ordered by entity name.
    pub latest: Vec<Observation>,
}

impl AggregateView {
    pub fn mean_for(&self, entity: &str) -> Option<f64> {
        self.per_entity_mean.get(entity).copied()
    }
}

pub fn aggregate(history: &SeriesHistory) -> AggregateView {
    let observations = history.observations();
    let (latest_at, latest) = latest_cross_section(observations);

    AggregateView {
        overall_mean: overall_mean(observations),
        per_entity_mean: per_entity_mean(observations),
        latest_at,
        latest,
    }
}

pub fn overall_mean(observations: &[Observation]) -> f64 {
    if observations.is_empty() {
        return f64::NAN;
    }

    let sum: f64 = observations.iter().map(|o| o.metric as f64).sum();
    sum / observations.len() as f64
}

pub fn per_entity_mean(observations: &[Observation]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for observation in observations {
        let entry = sums.entry(observation.entity.as_str()).or_default();
        entry.0 += observation.metric as f64;
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(entity, (sum, count))| (entity.to_string(), sum / count as f64))
        .collect()
}

/// All observations sharing the maximum timestamp, sorted by entity name.
pub fn latest_cross_section(
    observations: &[Observation],
) -> (Option<DateTime<Utc>>, Vec<Observation>) {
    let Some(latest_at) = observations.iter().map(|o| o.date).max() else {
        return (None, Vec::new());
    };

    let mut latest: Vec<Observation> = observations
        .iter()
        .filter(|o| o.date == latest_at)
        .cloned()
        .collect();
    latest.sort_by(|a, b| a.entity.cmp(&b.entity));

    (Some(latest_at), latest)
}
