//! Helper functions for integration tests

use std::time::Duration;

use pollwatch::config::Credentials;
use pollwatch::discord::DiscordNotifier;
use pollwatch::pipeline::{ProbeKind, SeriesProbe};
use pollwatch::render::{ChartStyle, SeriesLabels};
use reqwest::Client;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub fn test_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

pub fn test_credentials() -> Credentials {
    Credentials {
        user: "watcher".to_string(),
        pass: "hunter2".to_string(),
    }
}

pub fn population_probe() -> SeriesProbe {
    SeriesProbe {
        kind: ProbeKind::Population,
        labels: SeriesLabels::new("AQW Server Populations", "Count", ""),
        chart: ChartStyle::new("Population", "Players", "chart.png"),
        chart_path: None,
    }
}

pub fn servers_json(servers: &[(&str, u64)]) -> serde_json::Value {
    let servers: Vec<serde_json::Value> = servers
        .iter()
        .map(|(name, count)| serde_json::json!({"sName": name, "iCount": count, "bOnline": 1}))
        .collect();
    serde_json::json!({ "login": {"iAccess": 1}, "servers": servers })
}

/// Mount a webhook that accepts every message and expects `times` of them.
pub async fn mount_webhook(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .respond_with(ResponseTemplate::new(204))
        .expect(times)
        .mount(server)
        .await;
}

pub fn webhook_notifier(server: &MockServer) -> DiscordNotifier {
    DiscordNotifier::new(test_client(), Some(format!("{}/webhook", server.uri())))
}

pub async fn webhook_requests(server: &MockServer) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.url.path() == "/webhook")
        .collect()
}

pub fn body_text(request: &Request) -> String {
    String::from_utf8_lossy(&request.body).into_owned()
}
