//! Embed text for the probe notifications

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::aggregate::AggregateView;
use crate::discord::{
    Attachment, BLURPLE, Embed, EmbedField, EmbedFooter, EmbedImage, Message, MessageBuilder,
};
use crate::fingerprint::Fingerprint;
use crate::history::Observation;
use crate::sources::{SeriesSnapshot, StatusDigest};

pub const NO_INCIDENTS: &str = "No unresolved incidents.";
pub const ALL_OPERATIONAL: &str = "All components operational.";
pub const NO_DESCRIPTION: &str = "No status description.";

const MANIFEST_TITLE: &str = "🚀 Discord Distribution Manifest Updated";
const MANIFEST_DESCRIPTION: &str =
    "A new build has been published or updated in the Discord distribution manifest.";
const MANIFEST_FOOTER: &str = "Discord Manifest Watcher";
const MANIFEST_FOOTER_ICON: &str = "https://cdn.discordapp.com/embed/avatars/0.png";
const MANIFEST_USERNAME: &str = "Manifest Watcher";

const STATUS_TITLE: &str = "📡 Discord Status Update";

/// Wording of a series notification.
#[derive(Debug, Clone)]
pub struct SeriesLabels {
    pub title: String,
    /// Label in front of each value, e.g. `Count`.
    pub metric: String,
    /// Appended to every value, e.g. `ms`. May be empty.
    pub unit: String,
}

impl SeriesLabels {
    pub fn new(title: impl ToString, metric: impl ToString, unit: impl ToString) -> Self {
        Self {
            title: title.to_string(),
            metric: metric.to_string(),
            unit: unit.to_string(),
        }
    }
}

/// The cross-section rows that belong to the current run.
///
/// `recorded_at` is the stamp of the rows this run appended, `None` when it
/// appended nothing. Older rows are never reported as current.
fn current_rows(view: &AggregateView, recorded_at: Option<DateTime<Utc>>) -> &[Observation] {
    match (view.latest_at, recorded_at) {
        (Some(latest), Some(recorded)) if latest == recorded => view.latest.as_slice(),
        _ => &[],
    }
}

/// One inline field per entity recorded at `recorded_at`, followed by one per
/// gap in the snapshot.
pub fn render_series_fields(
    view: &AggregateView,
    snapshot: &SeriesSnapshot,
    labels: &SeriesLabels,
    recorded_at: Option<DateTime<Utc>>,
) -> Vec<EmbedField> {
    let unit = &labels.unit;
    let with_note = |entity: &str, mut value: String| {
        if let Some(note) = snapshot.notes.get(entity) {
            value.push_str(&format!("\n*{note}*"));
        }
        value
    };

    let rows = current_rows(view, recorded_at).iter().map(|row| {
        let mut value = format!("{}: `{}{unit}`", labels.metric, row.metric);
        if let Some(mean) = view.mean_for(&row.entity) {
            value.push_str(&format!("\nAVG: `{mean:.2}{unit}`"));
        }
        EmbedField::new(&row.entity, with_note(&row.entity, value), true)
    });

    let gaps = snapshot.gaps.iter().map(|gap| {
        let value = format!("{}: `{}`", labels.metric, gap.reason);
        EmbedField::new(&gap.entity, with_note(&gap.entity, value), true)
    });

    rows.chain(gaps).collect()
}

pub fn series_message(
    view: &AggregateView,
    snapshot: &SeriesSnapshot,
    labels: &SeriesLabels,
    recorded_at: Option<DateTime<Utc>>,
    chart: Option<&Attachment>,
) -> Message {
    let fields = render_series_fields(view, snapshot, labels, recorded_at);

    let description = match recorded_at {
        Some(recorded) if !current_rows(view, recorded_at).is_empty() => {
            format!("As of {} UTC", recorded.format("%Y-%m-%d %H:%M"))
        }
        _ if fields.is_empty() => "All clear, nothing to report.".to_string(),
        _ => "No values recorded this run.".to_string(),
    };

    let embed = Embed {
        title: Some(labels.title.clone()),
        description: Some(description),
        fields,
        image: chart.map(|chart| EmbedImage {
            url: chart.reference(),
        }),
        ..Default::default()
    };

    MessageBuilder::new().add_embed(embed).build()
}

/// Summary, unresolved incidents and degraded components.
pub fn render_status(digest: &StatusDigest) -> Vec<EmbedField> {
    let incidents = digest
        .incidents
        .iter()
        .map(|i| format!("• {} ({}) - {}", i.name, i.impact, i.status))
        .collect::<Vec<_>>()
        .join("\n");

    let components = digest
        .components
        .iter()
        .filter(|c| !c.is_operational())
        .map(|c| format!("• {}: {}", c.name, c.status))
        .collect::<Vec<_>>()
        .join("\n");

    let summary = match digest.description.trim() {
        "" => NO_DESCRIPTION,
        description => description,
    };

    vec![
        EmbedField::new("🔔 Summary", summary, false),
        EmbedField::new(
            "🚨 Unresolved Incidents",
            if incidents.is_empty() { NO_INCIDENTS.to_string() } else { incidents },
            false,
        ),
        EmbedField::new(
            "🧩 Component Status",
            if components.is_empty() { ALL_OPERATIONAL.to_string() } else { components },
            false,
        ),
    ]
}

fn embed_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// A changed document, ready to be presented.
#[derive(Debug, Clone, Copy)]
pub struct DocumentChange<'a> {
    pub previous: Option<&'a Fingerprint>,
    pub current: &'a Fingerprint,
    pub detected_at: DateTime<Utc>,
}

/// Trait for turning a changed document into a notification message
pub trait DocumentPresenter<T>: Send + Sync {
    fn present(&self, document: &T, change: DocumentChange<'_>) -> Message;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestPresenter;

impl DocumentPresenter<Value> for ManifestPresenter {
    fn present(&self, _document: &Value, change: DocumentChange<'_>) -> Message {
        let fingerprint = match change.previous {
            Some(previous) => format!("`{}` → `{}`", previous.short(), change.current.short()),
            None => format!("`{}`", change.current.short()),
        };

        let embed = Embed {
            title: Some(MANIFEST_TITLE.to_string()),
            description: Some(MANIFEST_DESCRIPTION.to_string()),
            color: Some(BLURPLE),
            fields: vec![EmbedField::new("Fingerprint", fingerprint, false)],
            footer: Some(EmbedFooter {
                text: MANIFEST_FOOTER.to_string(),
                icon_url: Some(MANIFEST_FOOTER_ICON.to_string()),
            }),
            timestamp: Some(embed_timestamp(change.detected_at)),
            ..Default::default()
        };

        MessageBuilder::new()
            .username(MANIFEST_USERNAME)
            .add_embed(embed)
            .build()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusPresenter;

impl DocumentPresenter<StatusDigest> for StatusPresenter {
    fn present(&self, digest: &StatusDigest, change: DocumentChange<'_>) -> Message {
        let embed = Embed {
            title: Some(STATUS_TITLE.to_string()),
            color: Some(BLURPLE),
            fields: render_status(digest),
            timestamp: Some(embed_timestamp(change.detected_at)),
            ..Default::default()
        };

        MessageBuilder::new().add_embed(embed).build()
    }
}
