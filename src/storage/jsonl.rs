//! Append-only JSON-lines record store, one record per line.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{RecordStore, StoreError, VitalsAverage, VitalsRecord};

/// Append-only store keeping one JSON record per line.
#[derive(Debug, Clone)]
pub struct JsonLinesStore {
    path: PathBuf,
}

impl JsonLinesStore {
    /// Opens a store at `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record for `subject_id`.
    pub fn load(&self, subject_id: &str) -> Result<Vec<VitalsRecord>, StoreError> {
        let subject_id = subject_id.trim();
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: VitalsRecord =
                serde_json::from_str(&line).map_err(|e| StoreError::Corrupt {
                    line: index + 1,
                    message: e.to_string(),
                })?;
            if record.subject_id == subject_id {
                records.push(record);
            }
        }
        Ok(records)
    }
}

impl RecordStore for JsonLinesStore {
    fn save(&mut self, record: &VitalsRecord) -> Result<(), StoreError> {
        if record.subject_id.trim().is_empty() {
            return Err(StoreError::InvalidSubject);
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(record).map_err(|e| StoreError::Encode(e.to_string()))?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")?;

        tracing::debug!(
            path = %self.path.display(),
            subject = %record.subject_id,
            "Record saved"
        );
        Ok(())
    }

    fn average_vitals(&self, subject_id: &str) -> Result<Option<VitalsAverage>, StoreError> {
        let records = self.load(subject_id)?;
        Ok(VitalsAverage::from_records(&records))
    }

    fn last_access(&self, subject_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.load(subject_id)?.into_iter().map(|r| r.timestamp).max())
    }
}
