//! Population probe end to end: login API, CSV history and webhook

use assert_matches::assert_matches;
use pollwatch::discord::{DeliveryResult, DiscordNotifier};
use pollwatch::pipeline::{PipelineError, RunOutcome, run_series};
use pollwatch::sources::PopulationSource;
use pollwatch::storage::{CsvSeriesStore, HistoryStore};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

async fn mount_login(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_string_contains("user=watcher"))
        .and(body_string_contains("option=1"))
        .and(body_string_contains("pass=hunter2"))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

fn source(server: &MockServer) -> PopulationSource {
    PopulationSource::new(
        test_client(),
        format!("{}/login", server.uri()),
        test_credentials(),
    )
}

#[tokio::test]
async fn test_fetch_append_and_notify_with_chart() {
    let server = MockServer::start().await;
    mount_login(
        &server,
        ResponseTemplate::new(200).set_body_json(servers_json(&[("Artix", 120), ("Twig", 30)])),
    )
    .await;
    mount_webhook(&server, 1).await;

    let dir = tempfile::tempdir().unwrap();
    let store = CsvSeriesStore::new(dir.path().join("data.csv"));

    let outcome = run_series(
        &population_probe(),
        &source(&server),
        &store,
        &webhook_notifier(&server),
    )
    .await
    .unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Notified(DeliveryResult::Delivered { status: 204 })
    );

    let history = store.load().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.entities(), vec!["Artix", "Twig"]);
    let content = std::fs::read_to_string(store.path()).unwrap();
    assert!(content.starts_with("date,sName,iCount\n"));

    let requests = webhook_requests(&server).await;
    assert_eq!(requests.len(), 1);
    let content_type = requests[0]
        .headers
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("multipart/form-data"));

    let body = body_text(&requests[0]);
    assert!(body.contains(r#"name="payload_json""#));
    assert!(body.contains("files[0]"));
    assert!(body.contains(r#"filename="chart.png""#));
    assert!(body.to_lowercase().contains("content-type: image/png"));
    assert!(body.contains("Artix"));
    assert!(body.contains("Count: `120`"));
    assert!(body.contains("attachment://chart.png"));
    assert!(body.contains("PNG"));
    assert!(!body.contains("<svg"));
}

#[tokio::test]
async fn test_existing_history_is_preserved() {
    let server = MockServer::start().await;
    mount_login(
        &server,
        ResponseTemplate::new(200).set_body_json(servers_json(&[("Artix", 120)])),
    )
    .await;
    mount_webhook(&server, 1).await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("data.csv");
    std::fs::write(
        &file,
        "date,sName,iCount\n2025-06-01 12:00:00.123456,Artix,100\n",
    )
    .unwrap();
    let store = CsvSeriesStore::new(&file);

    run_series(
        &population_probe(),
        &source(&server),
        &store,
        &webhook_notifier(&server),
    )
    .await
    .unwrap();

    let history = store.load().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.observations()[0].metric, 100);
    assert_eq!(history.observations()[1].metric, 120);
    assert!(history.observations()[0].date < history.observations()[1].date);

    let body = body_text(&webhook_requests(&server).await[0]);
    assert!(body.contains("AVG: `110.00`"));
}

#[tokio::test]
async fn test_login_failure_aborts_before_history_and_webhook() {
    let server = MockServer::start().await;
    mount_login(&server, ResponseTemplate::new(500).set_body_string("down")).await;
    mount_webhook(&server, 0).await;

    let dir = tempfile::tempdir().unwrap();
    let store = CsvSeriesStore::new(dir.path().join("data.csv"));

    let result = run_series(
        &population_probe(),
        &source(&server),
        &store,
        &webhook_notifier(&server),
    )
    .await;

    assert_matches!(result, Err(PipelineError::Fetch { .. }));
    assert!(!store.path().exists());
}

#[tokio::test]
async fn test_corrupt_history_starts_over() {
    let server = MockServer::start().await;
    mount_login(
        &server,
        ResponseTemplate::new(200).set_body_json(servers_json(&[("Artix", 120), ("Twig", 30)])),
    )
    .await;
    mount_webhook(&server, 1).await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("data.csv");
    std::fs::write(&file, "").unwrap();
    let store = CsvSeriesStore::new(&file);
    assert!(store.load().unwrap_err().is_corrupt());

    run_series(
        &population_probe(),
        &source(&server),
        &store,
        &webhook_notifier(&server),
    )
    .await
    .unwrap();

    assert_eq!(store.load().unwrap().len(), 2);
}

#[tokio::test]
async fn test_rejected_webhook_keeps_history() {
    let server = MockServer::start().await;
    mount_login(
        &server,
        ResponseTemplate::new(200).set_body_json(servers_json(&[("Artix", 120)])),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad embed"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = CsvSeriesStore::new(dir.path().join("data.csv"));

    let outcome = run_series(
        &population_probe(),
        &source(&server),
        &store,
        &webhook_notifier(&server),
    )
    .await
    .unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Notified(DeliveryResult::Rejected {
            status: 400,
            body: "bad embed".to_string(),
        })
    );
    assert_eq!(store.load().unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_webhook_still_records_history() {
    let server = MockServer::start().await;
    mount_login(
        &server,
        ResponseTemplate::new(200).set_body_json(servers_json(&[("Artix", 120)])),
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let store = CsvSeriesStore::new(dir.path().join("data.csv"));
    let notifier = DiscordNotifier::new(test_client(), None);

    let outcome = run_series(&population_probe(), &source(&server), &store, &notifier)
        .await
        .unwrap();

    assert_eq!(outcome, RunOutcome::Notified(DeliveryResult::Skipped));
    assert_eq!(store.load().unwrap().len(), 1);
}
