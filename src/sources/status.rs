//! Status page polling
//!
//! Reads the statuspage.io v2 API (`summary.json` and `unresolved.json`) and
//! reduces both answers to a [`StatusDigest`]. Volatile fields such as
//! `updated_at` are dropped so the digest only changes when the reported
//! state does.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{FetchError, SnapshotSource, read_json};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDigest {
    pub description: String,
    pub incidents: Vec<Incident>,
    pub components: Vec<ComponentStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub name: String,
    pub impact: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub name: String,
    pub status: String,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        self.status == "operational"
    }
}

#[derive(Debug, Deserialize)]
struct Summary {
    status: PageStatus,
    #[serde(default)]
    components: Vec<ComponentStatus>,
}

#[derive(Debug, Deserialize)]
struct PageStatus {
    description: String,
}

#[derive(Debug, Deserialize)]
struct Unresolved {
    #[serde(default)]
    incidents: Vec<Incident>,
}

#[derive(Debug, Clone)]
pub struct StatusSource {
    client: Client,
    base_url: String,
}

impl StatusSource {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, document: &str) -> Result<T, FetchError> {
        let url = format!("{}/{document}", self.base_url);
        let response = self.client.get(&url).send().await?;
        read_json(response).await
    }
}

#[async_trait]
impl SnapshotSource for StatusSource {
    type Snapshot = StatusDigest;

    fn describe(&self) -> String {
        format!("status page at {}", self.base_url)
    }

    #[instrument(skip(self), fields(url = %self.base_url))]
    async fn fetch(&self) -> Result<StatusDigest, FetchError> {
        let summary: Summary = self.get("summary.json").await?;
        let unresolved: Unresolved = self.get("unresolved.json").await?;

        debug!(
            "status `{}` with {} unresolved incidents",
            summary.status.description,
            unresolved.incidents.len()
        );

        Ok(StatusDigest {
            description: summary.status.description,
            incidents: unresolved.incidents,
            components: summary.components,
        })
    }
}
