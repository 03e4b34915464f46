//! Single-slot JSON document store
//!
//! Keeps exactly one document, written as pretty JSON. The fingerprint is not
//! stored; it is derived from the document on load.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, instrument};

use crate::history::StoredDocument;

use super::{HistoryStore, StorageError, StorageResult, write_atomically};

#[derive(Debug, Clone)]
pub struct JsonDocumentStore {
    path: PathBuf,
}

impl JsonDocumentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for JsonDocumentStore {
    type State = Option<StoredDocument>;

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn load(&self) -> StorageResult<Option<StoredDocument>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no cached document yet");
                return Ok(None);
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(StorageError::corrupt(&self.path, e));
            }
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Err(StorageError::corrupt(&self.path, "file is empty"));
        }

        let document: Value =
            serde_json::from_str(&content).map_err(|e| StorageError::corrupt(&self.path, e))?;
        let stored = StoredDocument::new(document);
        debug!("cached document has fingerprint {}", stored.fingerprint.short());

        Ok(Some(stored))
    }

    /// Replace the cached document. Saving `None` leaves the file untouched.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    fn save(&self, state: &Option<StoredDocument>) -> StorageResult<()> {
        let Some(stored) = state else {
            debug!("nothing to store");
            return Ok(());
        };

        write_atomically(&self.path, |file| {
            serde_json::to_writer_pretty(&mut *file, &stored.document)?;
            file.write_all(b"\n")?;
            Ok(())
        })
    }
}
