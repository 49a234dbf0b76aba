//! Record store held in process memory, for tests and short runs.

use chrono::{DateTime, Utc};

use super::{RecordStore, StoreError, VitalsAverage, VitalsRecord};

/// In-process record store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: Vec<VitalsRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored record in insertion order.
    pub fn records(&self) -> &[VitalsRecord] {
        &self.records
    }

    fn for_subject<'a>(
        &'a self,
        subject_id: &'a str,
    ) -> impl Iterator<Item = &'a VitalsRecord> + 'a {
        let subject_id = subject_id.trim();
        self.records.iter().filter(move |r| r.subject_id == subject_id)
    }
}

impl RecordStore for MemoryStore {
    fn save(&mut self, record: &VitalsRecord) -> Result<(), StoreError> {
        if record.subject_id.trim().is_empty() {
            return Err(StoreError::InvalidSubject);
        }
        self.records.push(record.clone());
        Ok(())
    }

    fn average_vitals(&self, subject_id: &str) -> Result<Option<VitalsAverage>, StoreError> {
        Ok(VitalsAverage::from_records(self.for_subject(subject_id)))
    }

    fn last_access(&self, subject_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.for_subject(subject_id).map(|r| r.timestamp).max())
    }
}
