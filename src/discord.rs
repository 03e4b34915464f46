//! Webhook notifications
//!
//! A [`Notification`] is one webhook message plus an optional binary
//! attachment. The [`DiscordNotifier`] sends it exactly once: as a JSON body
//! when there is no attachment, otherwise as a multipart form carrying the
//! message in `payload_json` and the artifact in `files[0]`. Failures are
//! reported through [`DeliveryResult`], never retried.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::util::truncate_chars;

pub const TITLE_LIMIT: usize = 256;
pub const DESCRIPTION_LIMIT: usize = 4096;
pub const FIELD_NAME_LIMIT: usize = 256;
pub const FIELD_VALUE_LIMIT: usize = 1024;
pub const FIELD_COUNT_LIMIT: usize = 25;

pub const BLURPLE: u32 = 0x5865F2;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

impl EmbedField {
    pub fn new(name: impl ToString, value: impl ToString, inline: bool) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            inline,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

impl Embed {
    /// Clamp the embed to the webhook's size limits.
    ///
    /// Over-long texts are truncated; fields beyond [`FIELD_COUNT_LIMIT`] are
    /// dropped. Returns the number of dropped fields.
    pub fn enforce_limits(&mut self) -> usize {
        if let Some(title) = &mut self.title {
            *title = truncate_chars(title, TITLE_LIMIT);
        }
        if let Some(description) = &mut self.description {
            *description = truncate_chars(description, DESCRIPTION_LIMIT);
        }

        for field in &mut self.fields {
            field.name = truncate_chars(&field.name, FIELD_NAME_LIMIT);
            field.value = truncate_chars(&field.value, FIELD_VALUE_LIMIT);
        }

        let dropped = self.fields.len().saturating_sub(FIELD_COUNT_LIMIT);
        self.fields.truncate(FIELD_COUNT_LIMIT);
        dropped
    }
}

pub struct MessageBuilder {
    username: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self {
            username: None,
            embeds: Vec::new(),
        }
    }

    pub fn username(mut self, username: impl ToString) -> Self {
        self.username = Some(username.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            username: self.username,
            embeds: self.embeds,
        }
    }
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A rendered file sent along with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    /// The URL an embed uses to reference this attachment.
    pub fn reference(&self) -> String {
        format!("attachment://{}", self.filename)
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub message: Message,
    pub attachment: Option<Attachment>,
}

impl Notification {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            attachment: None,
        }
    }

    pub fn with_attachment(message: Message, attachment: Attachment) -> Self {
        Self {
            message,
            attachment: Some(attachment),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered { status: u16 },
    Rejected { status: u16, body: String },
    Failed(String),

    /// No destination configured
    Skipped,
}

impl DeliveryResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryResult::Delivered { .. })
    }
}

/// Trait for delivering a notification
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> DeliveryResult;
}

#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: Client,
    url: Option<String>,
}

impl DiscordNotifier {
    /// `url` of `None` makes every delivery a logged no-op.
    pub fn new(client: Client, url: Option<String>) -> Self {
        Self { client, url }
    }

    fn prepare(mut message: Message) -> Message {
        for (index, embed) in message.embeds.iter_mut().enumerate() {
            let dropped = embed.enforce_limits();
            if dropped > 0 {
                warn!(
                    "embed {index}: dropped {dropped} fields beyond the limit of {FIELD_COUNT_LIMIT}"
                );
            }
        }
        message
    }

    fn multipart(message: &Message, attachment: Attachment) -> Result<Form, String> {
        let payload = serde_json::to_string(message).map_err(|e| e.to_string())?;
        let payload = Part::text(payload)
            .mime_str("application/json")
            .map_err(|e| e.to_string())?;
        let file = Part::bytes(attachment.bytes)
            .file_name(attachment.filename)
            .mime_str(&attachment.content_type)
            .map_err(|e| e.to_string())?;

        Ok(Form::new().part("payload_json", payload).part("files[0]", file))
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    #[instrument(skip_all)]
    async fn notify(&self, notification: Notification) -> DeliveryResult {
        let Some(url) = &self.url else {
            warn!("no webhook configured, skipping notification");
            return DeliveryResult::Skipped;
        };

        let Notification {
            message,
            attachment,
        } = notification;
        let message = Self::prepare(message);

        let request = match attachment {
            Some(attachment) => match Self::multipart(&message, attachment) {
                Ok(form) => self.client.post(url).multipart(form),
                Err(e) => {
                    error!("failed to build webhook payload: {e}");
                    return DeliveryResult::Failed(e);
                }
            },
            None => self.client.post(url).json(&message),
        };

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    info!("Successfully sent webhook message");
                    DeliveryResult::Delivered {
                        status: status.as_u16(),
                    }
                } else {
                    let body = response.text().await.unwrap_or_default();
                    error!("Webhook message failed with status: {status}");
                    error!("Webhook error response: {body}");
                    DeliveryResult::Rejected {
                        status: status.as_u16(),
                        body,
                    }
                }
            }
            Err(e) => {
                error!("Failed to send webhook message: {e}");
                DeliveryResult::Failed(e.to_string())
            }
        }
    }
}
