//! CSV-backed time series history
//!
//! The file has the columns `date,sName,iCount`, one row per observation,
//! oldest first. Extra columns are ignored on load.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::history::{Observation, SeriesHistory};

use super::{HistoryStore, StorageError, StorageResult, write_atomically};

const COLUMNS: [&str; 3] = ["date", "sName", "iCount"];

#[derive(Debug, Clone)]
pub struct CsvSeriesStore {
    path: PathBuf,
}

impl CsvSeriesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(&self, bytes: &[u8]) -> StorageResult<SeriesHistory> {
        let mut reader = csv::Reader::from_reader(bytes);

        let headers = reader
            .headers()
            .map_err(|e| StorageError::corrupt(&self.path, e))?
            .clone();
        for column in COLUMNS {
            if !headers.iter().any(|header| header == column) {
                return Err(StorageError::corrupt(
                    &self.path,
                    format!("missing column `{column}`"),
                ));
            }
        }

        let mut observations = Vec::new();
        for (index, row) in reader.deserialize::<Observation>().enumerate() {
            let observation = row.map_err(|e| StorageError::corrupt(&self.path, e))?;
            if observation.entity.is_empty() {
                return Err(StorageError::corrupt(
                    &self.path,
                    format!("row {} has an empty sName", index + 1),
                ));
            }
            observations.push(observation);
        }

        Ok(SeriesHistory::from_observations(observations))
    }
}

impl HistoryStore for CsvSeriesStore {
    type State = SeriesHistory;

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn load(&self) -> StorageResult<SeriesHistory> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no history file yet");
                return Ok(SeriesHistory::new());
            }
            Err(e) => return Err(e.into()),
        };

        if bytes.is_empty() {
            return Err(StorageError::corrupt(&self.path, "file is empty"));
        }

        let history = self.parse(&bytes)?;
        debug!("loaded {} observations", history.len());
        Ok(history)
    }

    #[instrument(skip_all, fields(path = %self.path.display(), rows = history.len()))]
    fn save(&self, history: &SeriesHistory) -> StorageResult<()> {
        write_atomically(&self.path, |file| {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file);
            writer.write_record(COLUMNS)?;
            for observation in history.observations() {
                writer.serialize(observation)?;
            }
            writer.flush()?;
            Ok(())
        })
    }
}
