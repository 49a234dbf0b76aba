//! rPPG Vitals CLI
//!
//! Runs a recording session against a frame source, logs the live
//! estimates and optionally stores the finished record.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing::{error, info, warn};

use rppg_vitals::{
    capture::{Camera, CameraError, MockCamera, StallGuard},
    config::{ConfigError, FileConfig},
    quality::{DenseModel, InferenceError, QualityModel},
    session::{ReportSink, Session, SessionError, TracingSink, VitalsReport},
    storage::{JsonLinesStore, RecordStore, StoreError},
};

/// Seconds without a frame before the source is considered lost.
const STALL_SECONDS: u32 = 5;

#[derive(Parser, Debug)]
#[command(name = "rppg-vitals", version, about = "Camera-based heart rate and HRV estimation")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Channel-combination strategy (default, green-red, chrom, pos, luminance).
    #[arg(long)]
    combination: Option<String>,

    /// Number of frames to process.
    #[arg(short, long)]
    frames: Option<u32>,

    /// Run until interrupted.
    #[arg(long)]
    continuous: bool,

    /// Heart rate of the synthetic subject.
    #[arg(long, default_value_t = 72.0)]
    pulse_bpm: f64,

    /// Read frames from a real webcam instead of the synthetic source.
    #[cfg(feature = "camera")]
    #[arg(long)]
    device: bool,

    /// Quality model artifact (JSON).
    #[arg(long)]
    model: Option<PathBuf>,

    /// Subject id for the stored record.
    #[arg(long)]
    subject: Option<String>,

    /// JSON-lines record store.
    #[arg(long)]
    store: Option<PathBuf>,

    /// Metrics server port (0 disables).
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[derive(Debug, Error)]
enum AppError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("quality model: {0}")]
    Model(#[from] InferenceError),
    #[error("session: {0}")]
    Session(#[from] SessionError),
    #[error("camera: {0}")]
    Camera(#[from] CameraError),
    #[error("record store: {0}")]
    Store(#[from] StoreError),
    #[cfg(feature = "metrics")]
    #[error("metrics: {0}")]
    Metrics(String),
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("rPPG Vitals v{}", rppg_vitals::VERSION);

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Loads the file configuration and applies command-line overrides.
fn load_config(cli: &Cli) -> Result<FileConfig, AppError> {
    let mut config = match &cli.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };

    if let Some(combination) = &cli.combination {
        config.sampler.combination = combination.clone();
    }
    if let Some(frames) = cli.frames {
        config.output.frame_count = frames;
    }
    if cli.continuous {
        config.output.continuous = true;
    }
    if let Some(model) = &cli.model {
        config.quality.model_path = Some(model.clone());
    }
    if let Some(subject) = &cli.subject {
        config.output.subject = Some(subject.clone());
    }
    if let Some(store) = &cli.store {
        config.output.store_path = Some(store.clone());
    }
    if let Some(port) = cli.metrics_port {
        config.output.metrics_port = port;
    }

    config.validate()?;
    Ok(config)
}

fn open_camera(cli: &Cli, config: &FileConfig) -> Result<(Box<dyn Camera>, bool), AppError> {
    #[cfg(feature = "camera")]
    {
        if cli.device {
            let mut camera = rppg_vitals::capture::DeviceCamera::new();
            camera.open(&config.capture)?;
            return Ok((Box::new(camera), false));
        }
    }

    info!(pulse_bpm = cli.pulse_bpm, "Using synthetic frame source");
    let mut camera = MockCamera::with_pulse(cli.pulse_bpm);
    camera.open(&config.capture)?;
    Ok((Box::new(camera), true))
}

fn run(cli: Cli) -> Result<(), AppError> {
    let config = load_config(&cli)?;

    let model: Option<Box<dyn QualityModel>> = match &config.quality.model_path {
        Some(path) => Some(Box::new(DenseModel::from_json_file(path)?)),
        None => {
            info!("No quality model configured; quality stays unset");
            None
        }
    };

    let (mut camera, synthetic) = open_camera(&cli, &config)?;
    let mut session = Session::from_config(&config, model)?;
    let mut sinks = Sinks::start(&config)?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        if let Err(e) = ctrlc::set_handler(move || running.store(false, Ordering::SeqCst)) {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }
    }

    let fps = config.capture.fps.max(1);
    let frame_period = Duration::from_secs_f64(1.0 / fps as f64);
    let mut processed: u64 = 0;
    let mut unavailable: u64 = 0;
    let mut stall = StallGuard::for_duration(fps, STALL_SECONDS);

    info!(
        continuous = config.output.continuous,
        frames = config.output.frame_count,
        strategy = %session.sampler().strategy(),
        "Processing frames..."
    );

    while running.load(Ordering::SeqCst) {
        if !config.output.continuous && processed >= u64::from(config.output.frame_count) {
            break;
        }

        match camera.capture() {
            Ok(frame) => {
                processed += 1;
                stall.frame();
                if let Some(valley) = session.on_frame(&frame) {
                    tracing::trace!(timestamp_ms = valley.timestamp_ms, "Beat");
                }
            }
            Err(CameraError::FrameUnavailable) => {
                unavailable += 1;
                if let Err(e) = stall.unavailable() {
                    camera.close();
                    return Err(e.into());
                }
                session.poll_quality();
                if !synthetic {
                    std::thread::sleep(frame_period);
                }
                continue;
            }
            Err(e) => {
                camera.close();
                return Err(e.into());
            }
        }

        if processed % u64::from(fps) == 0 {
            sinks.publish(&session.report());
        }
        if synthetic && config.output.continuous {
            std::thread::sleep(frame_period);
        }
    }

    camera.close();
    session.poll_quality();

    let report = session.report();
    sinks.publish(&report);
    info!(
        processed,
        unavailable,
        dropped = report.frames_dropped,
        valleys = report.valleys.len(),
        "Session finished"
    );

    if let Some(subject) = &config.output.subject {
        store_record(&session, subject, &config)?;
    }
    Ok(())
}

fn store_record(session: &Session, subject: &str, config: &FileConfig) -> Result<(), AppError> {
    let record = session.finalize(subject)?;
    let Some(path) = &config.output.store_path else {
        warn!(subject, "No record store configured; record not saved");
        return Ok(());
    };

    let mut store = JsonLinesStore::new(path);
    store.save(&record)?;
    info!(subject, path = %path.display(), "Record saved");

    match store.average_vitals(subject)? {
        Some(avg) => info!(
            subject,
            avg_bpm = ?avg.avg_bpm,
            avg_sdnn_ms = ?avg.avg_sdnn_ms,
            records = avg.record_count,
            "Historical averages"
        ),
        None => info!(subject, "No history"),
    }
    if let Some(last) = store.last_access(subject)? {
        info!(subject, last_access = %last.to_rfc3339(), "Last access");
    }
    Ok(())
}

/// Report destinations for the run.
struct Sinks {
    log: TracingSink,
    #[cfg(feature = "metrics")]
    metrics: Option<MetricsExport>,
}

#[cfg(feature = "metrics")]
struct MetricsExport {
    state: Arc<tokio::sync::RwLock<rppg_vitals::metrics::MetricsState>>,
    // Keeps the server task alive for the duration of the run.
    _runtime: tokio::runtime::Runtime,
}

impl Sinks {
    #[cfg(feature = "metrics")]
    fn start(config: &FileConfig) -> Result<Self, AppError> {
        use rppg_vitals::metrics::{MetricsRegistry, MetricsServer, MetricsServerConfig};

        let port = config.output.metrics_port;
        if port == 0 {
            return Ok(Self {
                log: TracingSink,
                metrics: None,
            });
        }

        let registry = MetricsRegistry::new().map_err(|e| AppError::Metrics(e.to_string()))?;
        let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry);
        let state = server.state();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| AppError::Metrics(e.to_string()))?;
        runtime.spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server failed: {e}");
            }
        });

        Ok(Self {
            log: TracingSink,
            metrics: Some(MetricsExport {
                state,
                _runtime: runtime,
            }),
        })
    }

    #[cfg(not(feature = "metrics"))]
    fn start(config: &FileConfig) -> Result<Self, AppError> {
        if config.output.metrics_port != 0 {
            tracing::debug!("Built without the metrics feature; exporter disabled");
        }
        Ok(Self { log: TracingSink })
    }

    fn publish(&mut self, report: &VitalsReport) {
        self.log.publish(report);
        #[cfg(feature = "metrics")]
        {
            if let Some(metrics) = &self.metrics {
                metrics.state.blocking_write().publish(report);
            }
        }
    }
}
