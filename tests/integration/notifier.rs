//! Webhook delivery

use assert_matches::assert_matches;
use pollwatch::discord::{
    DeliveryResult, DiscordNotifier, Embed, EmbedField, MessageBuilder, Notification, Notifier,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_plain_message_is_sent_as_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let message = MessageBuilder::new().username("pollwatch").build();
    let result = webhook_notifier(&server)
        .notify(Notification::new(message))
        .await;

    assert_eq!(result, DeliveryResult::Delivered { status: 204 });
}

#[tokio::test]
async fn test_limits_are_enforced_on_the_wire() {
    let server = MockServer::start().await;
    mount_webhook(&server, 1).await;

    let embed = Embed {
        title: Some("x".repeat(400)),
        fields: (0..30)
            .map(|i| EmbedField::new(format!("server {i}"), "y".repeat(1500), true))
            .collect(),
        ..Default::default()
    };
    let message = MessageBuilder::new().add_embed(embed).build();

    let result = webhook_notifier(&server)
        .notify(Notification::new(message))
        .await;
    assert!(result.is_delivered());

    let requests = webhook_requests(&server).await;
    let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let embed = &sent["embeds"][0];
    assert_eq!(embed["title"].as_str().unwrap().chars().count(), 256);
    assert_eq!(embed["fields"].as_array().unwrap().len(), 25);
    assert_eq!(
        embed["fields"][0]["value"].as_str().unwrap().chars().count(),
        1024
    );
    assert!(embed["fields"][0]["value"].as_str().unwrap().ends_with('…'));
}

#[tokio::test]
async fn test_unreachable_webhook_is_a_failed_delivery() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let notifier = DiscordNotifier::new(
        test_client(),
        Some(format!("http://127.0.0.1:{port}/webhook")),
    );
    let message = MessageBuilder::new().username("pollwatch").build();

    let result = notifier.notify(Notification::new(message)).await;

    assert_matches!(result, DeliveryResult::Failed(_));
}
