//! Durable history for the probes
//!
//! This module provides a small trait-based abstraction over the two kinds of
//! persisted state:
//!
//! - **CSV time series** ([`series::CsvSeriesStore`]): append-only population
//!   and latency history
//! - **JSON document** ([`document::JsonDocumentStore`]): the last seen
//!   manifest or status digest
//!
//! ## Design
//!
//! - **Explicit corruption**: `load` reports an unusable file as
//!   [`StorageError::Corrupt`]; [`HistoryStore::load_or_default`] is the
//!   recovery policy that falls back to an empty state.
//! - **Whole-file writes**: `save` always rewrites the complete state into a
//!   temp file next to the target and renames it into place, so a failed
//!   write leaves the previous file intact.

pub mod document;
pub mod error;
pub mod series;

use std::fs::File;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{trace, warn};

pub use document::JsonDocumentStore;
pub use error::{StorageError, StorageResult};
pub use series::CsvSeriesStore;

/// Trait for persisted probe state
pub trait HistoryStore {
    type State: Default;

    /// Read the persisted state.
    ///
    /// A missing file is not an error and yields the default state. A file
    /// that exists but cannot be read or parsed is reported as an error.
    fn load(&self) -> StorageResult<Self::State>;

    /// Replace the persisted state with `state`.
    fn save(&self, state: &Self::State) -> StorageResult<()>;

    /// [`HistoryStore::load`], substituting the default state on any error.
    fn load_or_default(&self) -> Self::State {
        match self.load() {
            Ok(state) => state,
            Err(e) => {
                warn!("{e}; starting from an empty state");
                Self::State::default()
            }
        }
    }
}

/// Write `path` through a temp file in the same directory, then rename it over
/// the target.
pub fn write_atomically<F>(path: &Path, write: F) -> StorageResult<()>
where
    F: FnOnce(&mut File) -> StorageResult<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    write(temp.as_file_mut())?;
    temp.as_file().sync_all()?;

    temp.persist(path).map_err(|e| StorageError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    trace!("wrote {}", path.display());
    Ok(())
}
