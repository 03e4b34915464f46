//! Manifest and status probes: fingerprint gating with a JSON cache file

use assert_matches::assert_matches;
use pollwatch::discord::DeliveryResult;
use pollwatch::pipeline::{PipelineError, ProbeKind, RunOutcome, run_document};
use pollwatch::render::{ManifestPresenter, StatusPresenter};
use pollwatch::sources::{ManifestSource, StatusSource};
use pollwatch::storage::{HistoryStore, JsonDocumentStore};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

async fn mount_manifest(server: &MockServer, manifest: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/manifest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest))
        .mount(server)
        .await;
}

async fn run_manifest(server: &MockServer, store: &JsonDocumentStore) -> RunOutcome {
    let source = ManifestSource::new(test_client(), format!("{}/manifest", server.uri()));
    run_document(
        ProbeKind::Manifest,
        &source,
        store,
        &webhook_notifier(server),
        &ManifestPresenter,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_first_manifest_is_stored_and_announced() {
    let server = MockServer::start().await;
    mount_manifest(&server, json!({"full": {"host_version": [1, 0, 9]}})).await;
    mount_webhook(&server, 1).await;

    let dir = tempfile::tempdir().unwrap();
    let store = JsonDocumentStore::new(dir.path().join("manifest_cache.json"));

    let outcome = run_manifest(&server, &store).await;

    assert_eq!(
        outcome,
        RunOutcome::Notified(DeliveryResult::Delivered { status: 204 })
    );
    let stored = store.load().unwrap().unwrap();
    assert_eq!(stored.document, json!({"full": {"host_version": [1, 0, 9]}}));

    let requests = webhook_requests(&server).await;
    let message: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(message["username"], "Manifest Watcher");
    assert_eq!(message["embeds"][0]["color"], 0x5865F2);
    assert_eq!(
        message["embeds"][0]["footer"]["text"],
        "Discord Manifest Watcher"
    );
}

#[tokio::test]
async fn test_unchanged_manifest_is_silent() {
    let server = MockServer::start().await;
    mount_manifest(&server, json!({"b": 2, "a": 1})).await;
    mount_webhook(&server, 0).await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("manifest_cache.json");
    // same document, different key order
    std::fs::write(&file, r#"{"a": 1, "b": 2}"#).unwrap();
    let before = std::fs::read(&file).unwrap();
    let store = JsonDocumentStore::new(&file);

    let outcome = run_manifest(&server, &store).await;

    assert_eq!(outcome, RunOutcome::Unchanged);
    assert_eq!(std::fs::read(&file).unwrap(), before);
}

#[tokio::test]
async fn test_changed_manifest_replaces_cache_and_notifies_once() {
    let server = MockServer::start().await;
    mount_manifest(&server, json!({"version": 2})).await;
    mount_webhook(&server, 1).await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("manifest_cache.json");
    std::fs::write(&file, r#"{"version": 1}"#).unwrap();
    let store = JsonDocumentStore::new(&file);

    let outcome = run_manifest(&server, &store).await;

    assert_matches!(outcome, RunOutcome::Notified(_));
    let stored = store.load().unwrap().unwrap();
    assert_eq!(stored.document, json!({"version": 2}));

    let body = body_text(&webhook_requests(&server).await[0]);
    assert!(body.contains(stored.fingerprint.short()));
}

#[tokio::test]
async fn test_corrupt_manifest_cache_counts_as_change() {
    let server = MockServer::start().await;
    mount_manifest(&server, json!({"version": 2})).await;
    mount_webhook(&server, 1).await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("manifest_cache.json");
    std::fs::write(&file, "{not json").unwrap();
    let store = JsonDocumentStore::new(&file);

    let outcome = run_manifest(&server, &store).await;

    assert_matches!(outcome, RunOutcome::Notified(_));
    assert!(store.load().unwrap().is_some());
}

/// A status page where everything is operational, as of `updated_at`.
fn operational_summary(updated_at: &str, positions: [u32; 2]) -> serde_json::Value {
    json!({
        "page": {"updated_at": updated_at},
        "status": {"indicator": "none", "description": "All Systems Operational"},
        "components": [
            {"name": "API", "status": "operational", "position": positions[0], "updated_at": updated_at},
            {"name": "Media Proxy", "status": "operational", "position": positions[1], "updated_at": updated_at}
        ]
    })
}

async fn mount_summary(server: &MockServer, summary: serde_json::Value, unresolved: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/api/v2/summary.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(summary))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/unresolved.json"))
        .respond_with(unresolved)
        .mount(server)
        .await;
}

async fn mount_status(server: &MockServer, unresolved: ResponseTemplate) {
    mount_summary(server, operational_summary("2025-06-01T12:00:00Z", [1, 2]), unresolved).await;
}

async fn run_status(server: &MockServer, store: &JsonDocumentStore) -> RunOutcome {
    let source = StatusSource::new(test_client(), format!("{}/api/v2", server.uri()));
    run_document(
        ProbeKind::Status,
        &source,
        store,
        &webhook_notifier(server),
        &StatusPresenter,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_status_with_nothing_to_report_uses_fallbacks() {
    let server = MockServer::start().await;
    mount_status(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"incidents": []})),
    )
    .await;
    mount_webhook(&server, 1).await;

    let dir = tempfile::tempdir().unwrap();
    let store = JsonDocumentStore::new(dir.path().join("status_cache.json"));
    let source = StatusSource::new(test_client(), format!("{}/api/v2/", server.uri()));

    let first = run_document(
        ProbeKind::Status,
        &source,
        &store,
        &webhook_notifier(&server),
        &StatusPresenter,
    )
    .await
    .unwrap();
    let second = run_document(
        ProbeKind::Status,
        &source,
        &store,
        &webhook_notifier(&server),
        &StatusPresenter,
    )
    .await
    .unwrap();

    assert_matches!(first, RunOutcome::Notified(_));
    assert_eq!(second, RunOutcome::Unchanged);

    let requests = webhook_requests(&server).await;
    assert_eq!(requests.len(), 1);
    let message: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let fields = &message["embeds"][0]["fields"];
    assert_eq!(fields[0]["value"], "All Systems Operational");
    assert_eq!(fields[1]["value"], "No unresolved incidents.");
    assert_eq!(fields[2]["value"], "All components operational.");
}

#[tokio::test]
async fn test_status_fetch_failure_leaves_cache_untouched() {
    let server = MockServer::start().await;
    mount_status(&server, ResponseTemplate::new(503)).await;
    mount_webhook(&server, 0).await;

    let dir = tempfile::tempdir().unwrap();
    let store = JsonDocumentStore::new(dir.path().join("status_cache.json"));
    let source = StatusSource::new(test_client(), format!("{}/api/v2", server.uri()));

    let result = run_document(
        ProbeKind::Status,
        &source,
        &store,
        &webhook_notifier(&server),
        &StatusPresenter,
    )
    .await;

    assert_matches!(
        result,
        Err(PipelineError::Fetch {
            probe: ProbeKind::Status,
            ..
        })
    );
    assert!(!store.path().exists());
}

#[tokio::test]
async fn test_status_page_touching_only_volatile_fields_is_silent() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("status_cache.json");
    let store = JsonDocumentStore::new(&file);
    let no_incidents = || ResponseTemplate::new(200).set_body_json(json!({"incidents": []}));

    let before = MockServer::start().await;
    mount_summary(
        &before,
        operational_summary("2025-06-01T12:00:00Z", [1, 2]),
        no_incidents(),
    )
    .await;
    mount_webhook(&before, 1).await;
    assert_matches!(run_status(&before, &store).await, RunOutcome::Notified(_));
    let cached = std::fs::read(&file).unwrap();

    // same statuses, new timestamps and reordered positions
    let after = MockServer::start().await;
    mount_summary(
        &after,
        operational_summary("2025-06-01T18:30:00Z", [2, 1]),
        no_incidents(),
    )
    .await;
    mount_webhook(&after, 0).await;

    assert_eq!(run_status(&after, &store).await, RunOutcome::Unchanged);
    assert_eq!(std::fs::read(&file).unwrap(), cached);
}
