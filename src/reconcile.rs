//! Deciding how a fresh snapshot changes the persisted history
//!
//! - [`Policy::Append`]: every point of the snapshot becomes a new
//!   observation. Nothing is deduplicated; running twice with the same data
//!   yields the rows twice.
//! - [`Policy::FingerprintGated`]: the snapshot replaces the stored document
//!   only when its fingerprint differs. An unchanged fingerprint ends the run
//!   without a write or a notification.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::fingerprint::Fingerprint;
use crate::history::{Observation, SeriesHistory, StoredDocument};
use crate::sources::SeriesSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Append,
    FingerprintGated,
}

/// Append every point of `snapshot` to `history`, stamped with `fetched_at`.
///
/// Timestamps never go backwards: a `fetched_at` earlier than the newest row
/// is raised to that row's timestamp. Returns the number of rows added.
pub fn append(history: &mut SeriesHistory, snapshot: &SeriesSnapshot, fetched_at: DateTime<Utc>) -> usize {
    let stamp = match history.latest_timestamp() {
        Some(latest) if latest > fetched_at => {
            warn!("clock went backwards ({fetched_at} < {latest}), stamping rows with {latest}");
            latest
        }
        _ => fetched_at,
    };

    for point in &snapshot.points {
        history.push(Observation {
            date: stamp,
            entity: point.entity.clone(),
            metric: point.metric,
        });
    }

    debug!("appended {} rows, history has {}", snapshot.len(), history.len());
    snapshot.len()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Unchanged,
    Changed {
        previous: Option<Fingerprint>,
        current: StoredDocument,
    },
}

/// Compare `incoming` with the stored document by fingerprint.
pub fn reconcile_document(stored: Option<&StoredDocument>, incoming: Value) -> Decision {
    let current = StoredDocument::new(incoming);

    match stored {
        Some(stored) if stored.fingerprint == current.fingerprint => {
            debug!("fingerprint {} unchanged", current.fingerprint.short());
            Decision::Unchanged
        }
        Some(stored) => {
            debug!(
                "fingerprint changed from {} to {}",
                stored.fingerprint.short(),
                current.fingerprint.short()
            );
            Decision::Changed {
                previous: Some(stored.fingerprint.clone()),
                current,
            }
        }
        None => {
            debug!("no stored document, treating {} as new", current.fingerprint.short());
            Decision::Changed {
                previous: None,
                current,
            }
        }
    }
}
