//! Persistence of finished recordings.
//!
//! A [`VitalsRecord`] is written once per completed session. Queries
//! distinguish "no data" (`None`) from a measured value, so a subject
//! with no history never reads back as zero.

mod jsonl;
mod memory;

pub use jsonl::JsonLinesStore;
pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vitals::{HeartRateEstimate, HrvEstimate};

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("subject id must not be empty")]
    InvalidSubject,
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt record at line {line}: {message}")]
    Corrupt { line: usize, message: String },
    #[error("failed to encode record: {0}")]
    Encode(String),
}

/// One stored recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalsRecord {
    pub subject_id: String,
    pub heart_rate: HeartRateEstimate,
    pub hrv: HrvEstimate,
    /// Raw sample values of the session, oldest first.
    pub raw_signal: Vec<f64>,
    pub timestamp: DateTime<Utc>,
}

impl VitalsRecord {
    /// Creates a record stamped with the current time.
    pub fn new(
        subject_id: &str,
        heart_rate: HeartRateEstimate,
        hrv: HrvEstimate,
        raw_signal: Vec<f64>,
    ) -> Result<Self, StoreError> {
        Self::with_timestamp(subject_id, heart_rate, hrv, raw_signal, Utc::now())
    }

    /// Creates a record with an explicit timestamp.
    pub fn with_timestamp(
        subject_id: &str,
        heart_rate: HeartRateEstimate,
        hrv: HrvEstimate,
        raw_signal: Vec<f64>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        let subject_id = subject_id.trim();
        if subject_id.is_empty() {
            return Err(StoreError::InvalidSubject);
        }
        Ok(Self {
            subject_id: subject_id.to_string(),
            heart_rate,
            hrv,
            raw_signal,
            timestamp,
        })
    }
}

/// Historical averages for one subject.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VitalsAverage {
    /// Mean bpm over records with a heart rate; unset if none had one.
    pub avg_bpm: Option<f64>,
    /// Mean SDNN over records with an HRV value; unset if none had one.
    pub avg_sdnn_ms: Option<f64>,
    pub record_count: usize,
}

impl VitalsAverage {
    /// Averages a subject's records, or `None` when there are none.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a VitalsRecord>) -> Option<Self> {
        let mut count = 0;
        let (mut bpm_sum, mut bpm_n) = (0.0, 0usize);
        let (mut sdnn_sum, mut sdnn_n) = (0.0, 0usize);

        for record in records {
            count += 1;
            if let Some(bpm) = record.heart_rate.bpm.filter(|v| v.is_finite()) {
                bpm_sum += bpm;
                bpm_n += 1;
            }
            if let Some(sdnn) = record.hrv.sdnn_ms.filter(|v| v.is_finite()) {
                sdnn_sum += sdnn;
                sdnn_n += 1;
            }
        }

        (count > 0).then(|| Self {
            avg_bpm: (bpm_n > 0).then(|| bpm_sum / bpm_n as f64),
            avg_sdnn_ms: (sdnn_n > 0).then(|| sdnn_sum / sdnn_n as f64),
            record_count: count,
        })
    }
}

/// Record persistence.
pub trait RecordStore {
    /// Stores one record.
    fn save(&mut self, record: &VitalsRecord) -> Result<(), StoreError>;

    /// Averages a subject's history; `None` when the subject has no records.
    fn average_vitals(&self, subject_id: &str) -> Result<Option<VitalsAverage>, StoreError>;

    /// Timestamp of the subject's newest record; `None` when there is none.
    fn last_access(&self, subject_id: &str) -> Result<Option<DateTime<Utc>>, StoreError>;
}
