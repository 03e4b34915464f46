use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::config::Credentials;

use super::{FetchError, SeriesSnapshot, SnapshotSource, read_json};

#[derive(Debug, Deserialize)]
struct LoginResponse {
    servers: Vec<ServerEntry>,
}

#[derive(Debug, Deserialize)]
struct ServerEntry {
    #[serde(rename = "sName")]
    name: String,
    #[serde(rename = "iCount")]
    count: u64,
}

/// Player counts per game server, read from the login API's server list.
#[derive(Debug, Clone)]
pub struct PopulationSource {
    client: Client,
    url: String,
    credentials: Credentials,
}

impl PopulationSource {
    pub fn new(client: Client, url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            client,
            url: url.into(),
            credentials,
        }
    }
}

#[async_trait]
impl SnapshotSource for PopulationSource {
    type Snapshot = SeriesSnapshot;

    fn describe(&self) -> String {
        format!("login API at {}", self.url)
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<SeriesSnapshot, FetchError> {
        let form = [
            ("user", self.credentials.user.as_str()),
            ("option", "1"),
            ("pass", self.credentials.pass.as_str()),
        ];

        let response = self.client.post(&self.url).form(&form).send().await?;
        let login: LoginResponse = read_json(response).await?;

        let mut points = Vec::with_capacity(login.servers.len());
        for server in login.servers {
            if server.name.trim().is_empty() {
                warn!("skipping server entry without a name");
                continue;
            }
            points.push((server.name, server.count));
        }

        debug!("fetched population of {} servers", points.len());
        Ok(SeriesSnapshot::from_points(points))
    }
}
