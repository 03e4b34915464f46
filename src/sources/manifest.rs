use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::instrument;

use super::{FetchError, SnapshotSource, read_json};

/// The distribution manifest, taken as an opaque JSON document.
#[derive(Debug, Clone)]
pub struct ManifestSource {
    client: Client,
    url: String,
}

impl ManifestSource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl SnapshotSource for ManifestSource {
    type Snapshot = Value;

    fn describe(&self) -> String {
        format!("manifest at {}", self.url)
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<Value, FetchError> {
        let response = self.client.get(&self.url).send().await?;
        read_json(response).await
    }
}
