//! The poll, diff, persist, notify pipeline
//!
//! Every probe is one run of the same sequence:
//!
//! ```text
//! fetch ─► load history ─► reconcile ─► save ─► aggregate / render ─► notify
//!   │                          │
//!   └─ error: abort            └─ unchanged document: stop, nothing saved or sent
//! ```
//!
//! [`ProbeKind::policy`] decides which run a probe takes: [`Policy::Append`]
//! probes go through [`run_series`], [`Policy::FingerprintGated`] probes
//! through [`run_document`]. Either refuses a probe of the other policy
//! before fetching. A fetch error aborts the run before the history is
//! touched. Delivery failures are
//! reported in the [`RunOutcome`] but never undo the saved history.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::aggregate::aggregate;
use crate::discord::{DeliveryResult, Notification, Notifier};
use crate::history::{SeriesHistory, StoredDocument};
use crate::reconcile::{Decision, Policy, append, reconcile_document};
use crate::render::{ChartStyle, DocumentChange, DocumentPresenter, SeriesLabels};
use crate::render::{render_chart, series_message};
use crate::sources::{FetchError, SeriesSnapshot, SnapshotSource};
use crate::storage::{HistoryStore, StorageError, write_atomically};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    Population,
    Latency,
    Manifest,
    Status,
}

impl ProbeKind {
    pub fn policy(self) -> Policy {
        match self {
            ProbeKind::Population | ProbeKind::Latency => Policy::Append,
            ProbeKind::Manifest | ProbeKind::Status => Policy::FingerprintGated,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ProbeKind::Population => "population",
            ProbeKind::Latency => "latency",
            ProbeKind::Manifest => "manifest",
            ProbeKind::Status => "status",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A notification was attempted; the result says whether it arrived.
    Notified(DeliveryResult),

    /// The fingerprint matched the stored document.
    Unchanged,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{probe} probe: fetch failed: {source}")]
    Fetch { probe: ProbeKind, source: FetchError },

    #[error("{probe} probe: could not persist history: {source}")]
    Storage {
        probe: ProbeKind,
        source: StorageError,
    },

    #[error("{probe} probe: could not encode snapshot: {source}")]
    Encode {
        probe: ProbeKind,
        source: serde_json::Error,
    },

    #[error("{probe} probe cannot take the {expected:?} path")]
    Policy { probe: ProbeKind, expected: Policy },
}

fn check_policy(probe: ProbeKind, expected: Policy) -> Result<(), PipelineError> {
    if probe.policy() == expected {
        Ok(())
    } else {
        Err(PipelineError::Policy { probe, expected })
    }
}

/// Fixed parameters of a series probe.
#[derive(Debug, Clone)]
pub struct SeriesProbe {
    pub kind: ProbeKind,
    pub labels: SeriesLabels,
    pub chart: ChartStyle,

    /// Where to keep a copy of the rendered chart, if anywhere.
    pub chart_path: Option<PathBuf>,
}

/// Run an append-policy probe.
#[instrument(skip_all, fields(probe = %probe.kind))]
pub async fn run_series<S, H, N>(
    probe: &SeriesProbe,
    source: &S,
    store: &H,
    notifier: &N,
) -> Result<RunOutcome, PipelineError>
where
    S: SnapshotSource<Snapshot = SeriesSnapshot>,
    H: HistoryStore<State = SeriesHistory>,
    N: Notifier,
{
    check_policy(probe.kind, Policy::Append)?;

    info!("fetching {}", source.describe());
    let snapshot = source.fetch().await.map_err(|source| PipelineError::Fetch {
        probe: probe.kind,
        source,
    })?;
    let fetched_at = Utc::now();

    let mut history = store.load_or_default();
    let added = append(&mut history, &snapshot, fetched_at);
    store.save(&history).map_err(|source| PipelineError::Storage {
        probe: probe.kind,
        source,
    })?;
    info!("stored {added} new rows ({} total)", history.len());

    // rows of this run carry the newest stamp
    let recorded_at = if added > 0 { history.latest_timestamp() } else { None };
    let view = aggregate(&history);

    let chart = match render_chart(&history, &probe.chart) {
        Ok(chart) => Some(chart),
        Err(e) => {
            warn!("could not render chart: {e}");
            None
        }
    };
    if let (Some(chart), Some(path)) = (&chart, &probe.chart_path) {
        let written = write_atomically(path, |file| {
            file.write_all(&chart.bytes)?;
            Ok(())
        });
        if let Err(e) = written {
            warn!("could not write chart to {}: {e}", path.display());
        }
    }

    let message = series_message(&view, &snapshot, &probe.labels, recorded_at, chart.as_ref());
    let notification = match chart {
        Some(chart) => Notification::with_attachment(message, chart),
        None => Notification::new(message),
    };
    let result = notifier.notify(notification).await;

    Ok(RunOutcome::Notified(result))
}

/// Run a fingerprint-gated probe.
///
/// The document is saved and announced only when its fingerprint differs
/// from the stored one. A missing or unreadable stored document counts as a
/// change.
#[instrument(skip_all, fields(probe = %kind))]
pub async fn run_document<S, H, N, P>(
    kind: ProbeKind,
    source: &S,
    store: &H,
    notifier: &N,
    presenter: &P,
) -> Result<RunOutcome, PipelineError>
where
    S: SnapshotSource,
    S::Snapshot: Serialize,
    H: HistoryStore<State = Option<StoredDocument>>,
    N: Notifier,
    P: DocumentPresenter<S::Snapshot>,
{
    check_policy(kind, Policy::FingerprintGated)?;

    info!("fetching {}", source.describe());
    let document = source
        .fetch()
        .await
        .map_err(|source| PipelineError::Fetch { probe: kind, source })?;
    let value = serde_json::to_value(&document)
        .map_err(|source| PipelineError::Encode { probe: kind, source })?;

    let stored = store.load_or_default();
    let (previous, current) = match reconcile_document(stored.as_ref(), value) {
        Decision::Unchanged => {
            info!("no change detected");
            return Ok(RunOutcome::Unchanged);
        }
        Decision::Changed { previous, current } => (previous, current),
    };

    let fingerprint = current.fingerprint.clone();
    store
        .save(&Some(current))
        .map_err(|source| PipelineError::Storage { probe: kind, source })?;
    info!("change detected, stored fingerprint {}", fingerprint.short());

    let message = presenter.present(
        &document,
        DocumentChange {
            previous: previous.as_ref(),
            current: &fingerprint,
            detected_at: Utc::now(),
        },
    );
    let result = notifier.notify(Notification::new(message)).await;

    Ok(RunOutcome::Notified(result))
}
