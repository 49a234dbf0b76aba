//! Background quality inference.
//!
//! Inference runs on a dedicated thread so a slow model never stalls the
//! sample path. At most one job is in flight; submissions made while the
//! worker is busy are skipped. Every job carries the session generation it
//! was cut from so results that arrive after a reset can be discarded.

use std::io;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

use super::classifier::{assess_window, QualityResult};
use super::features::FeatureExtractor;
use super::model::{InferenceError, QualityModel};

/// A raw window submitted for classification.
#[derive(Debug, Clone)]
pub struct QualityJob {
    pub generation: u64,
    pub window: Vec<f64>,
}

/// Result of one job.
#[derive(Debug, Clone)]
pub struct QualityOutcome {
    pub generation: u64,
    pub result: Result<QualityResult, InferenceError>,
}

/// Handle to the inference thread.
pub struct QualityWorker {
    tx: Option<Sender<QualityJob>>,
    rx: Receiver<QualityOutcome>,
    handle: Option<thread::JoinHandle<()>>,
    in_flight: bool,
    stopped: bool,
    submitted: u64,
    skipped: u64,
}

impl QualityWorker {
    /// Starts the worker thread with its own model instance.
    pub fn spawn(extractor: FeatureExtractor, model: Box<dyn QualityModel>) -> io::Result<Self> {
        let (job_tx, job_rx) = bounded::<QualityJob>(1);
        let (out_tx, out_rx) = unbounded::<QualityOutcome>();

        let handle = thread::Builder::new()
            .name("quality-inference".to_string())
            .spawn(move || Self::run(extractor, model, job_rx, out_tx))?;

        tracing::debug!("Quality worker started");

        Ok(Self {
            tx: Some(job_tx),
            rx: out_rx,
            handle: Some(handle),
            in_flight: false,
            stopped: false,
            submitted: 0,
            skipped: 0,
        })
    }

    fn run(
        extractor: FeatureExtractor,
        model: Box<dyn QualityModel>,
        jobs: Receiver<QualityJob>,
        outcomes: Sender<QualityOutcome>,
    ) {
        for job in jobs.iter() {
            let result = assess_window(&extractor, model.as_ref(), &job.window);
            let outcome = QualityOutcome {
                generation: job.generation,
                result,
            };
            if outcomes.send(outcome).is_err() {
                break;
            }
        }
        tracing::debug!("Quality worker exiting");
    }

    /// Submits a job unless one is already running.
    ///
    /// Returns false if the job was skipped.
    pub fn try_submit(&mut self, job: QualityJob) -> bool {
        if self.in_flight || self.stopped {
            self.skipped += 1;
            return false;
        }
        let Some(tx) = &self.tx else {
            return false;
        };

        match tx.try_send(job) {
            Ok(()) => {
                self.in_flight = true;
                self.submitted += 1;
                true
            }
            Err(crossbeam_channel::TrySendError::Full(_)) => {
                self.skipped += 1;
                false
            }
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
                tracing::warn!("Quality worker stopped unexpectedly");
                self.stopped = true;
                false
            }
        }
    }

    /// Collects every finished outcome without blocking.
    pub fn poll(&mut self) -> Vec<QualityOutcome> {
        let mut outcomes = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(outcome) => {
                    self.in_flight = false;
                    outcomes.push(outcome);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.stopped {
                        tracing::warn!("Quality worker disconnected");
                    }
                    self.stopped = true;
                    self.in_flight = false;
                    break;
                }
            }
        }
        outcomes
    }

    /// Blocks until the next outcome arrives or the timeout passes.
    pub fn wait(&mut self, timeout: Duration) -> Option<QualityOutcome> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => {
                self.in_flight = false;
                Some(outcome)
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.stopped = true;
                self.in_flight = false;
                None
            }
        }
    }

    /// Returns true while a job is running.
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    /// Returns true once the worker thread is gone.
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    #[inline]
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    #[inline]
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl Drop for QualityWorker {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Quality worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::{QualityFeatures, QualityLabel};
    use std::sync::{Arc, Barrier};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn window(len: usize) -> Vec<f64> {
        (0..len).map(|i| (i as f64 * 0.2).cos()).collect()
    }

    #[test]
    fn test_job_round_trip() {
        let model = |_: &QualityFeatures| Ok::<_, InferenceError>([0.1, 0.8, 0.1]);
        let mut worker =
            QualityWorker::spawn(FeatureExtractor::default(), Box::new(model)).unwrap();

        assert!(worker.try_submit(QualityJob {
            generation: 3,
            window: window(150),
        }));
        assert!(worker.is_busy());

        let outcome = worker.wait(TIMEOUT).unwrap();
        assert_eq!(outcome.generation, 3);
        assert_eq!(outcome.result.unwrap().label, Some(QualityLabel::Acceptable));
        assert!(!worker.is_busy());
    }

    #[test]
    fn test_second_job_skipped_while_busy() {
        let gate = Arc::new(Barrier::new(2));
        let worker_gate = Arc::clone(&gate);
        let model = move |_: &QualityFeatures| {
            worker_gate.wait();
            Ok::<_, InferenceError>([1.0, 0.0, 0.0])
        };
        let mut worker =
            QualityWorker::spawn(FeatureExtractor::default(), Box::new(model)).unwrap();

        let job = QualityJob {
            generation: 0,
            window: window(120),
        };
        assert!(worker.try_submit(job.clone()));
        assert!(!worker.try_submit(job));
        assert_eq!(worker.skipped(), 1);

        gate.wait();
        assert!(worker.wait(TIMEOUT).is_some());
        assert_eq!(worker.submitted(), 1);
    }

    #[test]
    fn test_short_window_reports_insufficient_data() {
        let model = |_: &QualityFeatures| Ok::<_, InferenceError>([1.0, 0.0, 0.0]);
        let mut worker =
            QualityWorker::spawn(FeatureExtractor::default(), Box::new(model)).unwrap();

        worker.try_submit(QualityJob {
            generation: 1,
            window: window(10),
        });
        let outcome = worker.wait(TIMEOUT).unwrap();
        assert!(matches!(
            outcome.result,
            Err(InferenceError::InsufficientData { got: 10, need: 100 })
        ));
    }

    #[test]
    fn test_drop_joins_thread() {
        let model = |_: &QualityFeatures| Ok::<_, InferenceError>([1.0, 0.0, 0.0]);
        let worker = QualityWorker::spawn(FeatureExtractor::default(), Box::new(model)).unwrap();
        drop(worker);
    }
}
