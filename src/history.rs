//! History kept between probe runs
//!
//! Two shapes exist:
//!
//! - [`SeriesHistory`]: an append-only time series of `(date, sName, iCount)`
//!   observations, persisted as CSV.
//! - [`StoredDocument`]: the single most recently seen scalar document,
//!   together with its fingerprint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fingerprint::{Fingerprint, fingerprint};

/// One observation of one entity at one point in time.
///
/// Field names on disk follow the column names of the history file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(with = "timestamp")]
    pub date: DateTime<Utc>,

    #[serde(rename = "sName")]
    pub entity: String,

    #[serde(rename = "iCount")]
    pub metric: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesHistory {
    observations: Vec<Observation>,
}

impl SeriesHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_observations(observations: Vec<Observation>) -> Self {
        Self { observations }
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Timestamp of the most recent observation.
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.observations.iter().map(|o| o.date).max()
    }

    /// Distinct entity names in order of first appearance.
    pub fn entities(&self) -> Vec<&str> {
        let mut entities: Vec<&str> = Vec::new();
        for observation in &self.observations {
            if !entities.contains(&observation.entity.as_str()) {
                entities.push(&observation.entity);
            }
        }
        entities
    }

    pub(crate) fn push(&mut self, observation: Observation) {
        self.observations.push(observation);
    }
}

/// The single scalar document a fingerprint-gated probe remembers.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub document: Value,
    pub fingerprint: Fingerprint,
}

impl StoredDocument {
    pub fn new(document: Value) -> Self {
        let fingerprint = fingerprint(&document);
        Self {
            document,
            fingerprint,
        }
    }
}

/// RFC 3339 on write; on read additionally the naive `YYYY-MM-DD HH:MM:SS[.f]`
/// form (taken as UTC) and the same with an explicit offset.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
    const OFFSET_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp `{raw}`")))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();

        if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
            return Some(date.with_timezone(&Utc));
        }

        if let Ok(date) = DateTime::parse_from_str(raw, OFFSET_FORMAT) {
            return Some(date.with_timezone(&Utc));
        }

        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|naive| naive.and_utc())
    }
}
