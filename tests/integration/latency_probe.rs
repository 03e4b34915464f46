//! Latency probe against local listeners

use std::time::Duration;

use pollwatch::config::read_targets_file;
use pollwatch::pipeline::{ProbeKind, RunOutcome, SeriesProbe, run_series};
use pollwatch::render::{ChartStyle, SeriesLabels};
use pollwatch::sources::LatencySource;
use pollwatch::storage::{CsvSeriesStore, HistoryStore};
use tokio::net::TcpListener;
use wiremock::MockServer;

use crate::helpers::*;

fn latency_probe() -> SeriesProbe {
    SeriesProbe {
        kind: ProbeKind::Latency,
        labels: SeriesLabels::new("AQW Server Latency", "Latency", "ms"),
        chart: ChartStyle::new("Latency", "Latency (ms)", "latency.png"),
        chart_path: None,
    }
}

/// A port on localhost with nothing listening on it.
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_unreachable_and_shared_targets() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open = listener.local_addr().unwrap().port();
    let closed = closed_port().await;

    let dir = tempfile::tempdir().unwrap();
    let targets_file = dir.path().join("targets.json");
    std::fs::write(
        &targets_file,
        serde_json::json!({
            "targets": [
                {"name": "Artix", "address": "127.0.0.1", "port": open},
                {"name": "Twig", "address": "127.0.0.1", "port": closed},
                {"name": "Yorumi", "address": "127.0.0.1", "port": open},
            ]
        })
        .to_string(),
    )
    .unwrap();
    let targets = read_targets_file(&targets_file).unwrap();

    let server = MockServer::start().await;
    mount_webhook(&server, 1).await;

    let source = LatencySource::new(&targets.targets, 2, Duration::from_millis(500));
    assert_eq!(source.groups().len(), 2);

    let chart_path = dir.path().join("latency.png");
    let mut probe = latency_probe();
    probe.chart_path = Some(chart_path.clone());
    let store = CsvSeriesStore::new(dir.path().join("latency.csv"));

    let outcome = run_series(&probe, &source, &store, &webhook_notifier(&server))
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Notified(result) if result.is_delivered()));

    let history = store.load().unwrap();
    assert_eq!(history.entities(), vec!["Artix", "Yorumi"]);
    assert_eq!(
        history.observations()[0].metric,
        history.observations()[1].metric
    );
    assert!(chart_path.exists());

    let body = body_text(&webhook_requests(&server).await[0]);
    assert!(body.contains("Latency: `unreachable`"));
    assert!(body.contains("derived from Artix"));

    drop(listener);
}
