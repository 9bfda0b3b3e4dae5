use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{ArgAction, Parser, ValueEnum};

use handsight_core::camera::infrastructure::camera_factory::create_camera;
use handsight_core::detection::infrastructure::onnx_hand_landmarker::OnnxHandLandmarker;
use handsight_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use handsight_core::overlay::domain::frame_presenter::FramePresenter;
use handsight_core::overlay::infrastructure::headless_presenter::HeadlessPresenter;
use handsight_core::overlay::infrastructure::window_presenter::WindowPresenter;
use handsight_core::pipeline::session_config::SessionConfig;
use handsight_core::pipeline::session_controller::SessionController;
use handsight_core::pipeline::session_logger::StdoutSessionLogger;
use handsight_core::shared::constants::{
    DEFAULT_OUTPUT_FOLDER, HAND_LANDMARK_MODEL_NAME, OBJECT_MODEL_NAME, PALM_MODEL_NAME,
    WINDOW_TITLE,
};
use handsight_core::shared::model_resolver;
use handsight_core::shared::settings::{BackendPreference, Settings};
use handsight_core::video::infrastructure::ffmpeg_writer::FfmpegWriter;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum BackendArg {
    Auto,
    Industrial,
    Generic,
}

impl From<BackendArg> for BackendPreference {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Auto => BackendPreference::Auto,
            BackendArg::Industrial => BackendPreference::Industrial,
            BackendArg::Generic => BackendPreference::Generic,
        }
    }
}

/// Live object detection and hand landmark overlay for industrial and USB
/// cameras.
#[derive(Parser, Debug)]
#[command(name = "handsight")]
struct Cli {
    /// Camera index.
    #[arg(long, default_value_t = 0)]
    camera: usize,

    /// Folder for recordings.
    #[arg(long, default_value = DEFAULT_OUTPUT_FOLDER)]
    folder: PathBuf,

    /// Run detection (false shows the raw camera feed).
    #[arg(short = 'q', long, default_value_t = true, action = ArgAction::Set)]
    capture: bool,

    /// Camera backend; defaults to the settings file, then auto.
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    /// JSON settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Record the annotated stream to <folder>/handsight_<unix-seconds>.mp4.
    #[arg(long)]
    record: bool,

    /// Run without a preview window.
    #[arg(long)]
    headless: bool,

    /// Stop after this many presented frames.
    #[arg(long, requires = "headless")]
    max_frames: Option<usize>,

    /// Disable object detection.
    #[arg(long)]
    no_objects: bool,

    /// Disable hand landmark detection.
    #[arg(long)]
    no_hands: bool,

    /// Detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Run detection every Nth frame (1 = every frame).
    #[arg(long)]
    frame_skip: Option<usize>,

    /// Run the object and hand detectors concurrently.
    #[arg(long)]
    parallel: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    let config = session_config(&cli, &settings.session);
    config.validate()?;

    let backend = cli.backend.map(BackendPreference::from).unwrap_or(settings.backend);
    let camera = create_camera(backend)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let presenter: Box<dyn FramePresenter> = if cli.headless {
        let presenter = HeadlessPresenter::new();
        match cli.max_frames {
            Some(n) => Box::new(presenter.stop_after(n, Arc::clone(&cancel))),
            None => Box::new(presenter),
        }
    } else {
        Box::new(WindowPresenter::new(WINDOW_TITLE, Arc::clone(&cancel)))
    };

    let mut session = SessionController::new(config.clone(), camera, presenter)
        .with_camera_index(cli.camera)
        .with_cancel(cancel)
        .with_logger(Box::new(StdoutSessionLogger::default()));

    let search_dirs = model_resolver::default_search_dirs();
    if config.object_detection_enabled {
        let path = model_resolver::resolve(
            OBJECT_MODEL_NAME,
            settings.models.object_detector.as_deref(),
            &search_dirs,
        )?;
        log::info!("Loading object detector from {}", path.display());
        session = session.with_object_detector(Box::new(OnnxYoloDetector::new(&path)?));
    }
    if config.hand_detection_enabled {
        let palm = model_resolver::resolve(
            PALM_MODEL_NAME,
            settings.models.palm_detector.as_deref(),
            &search_dirs,
        )?;
        let landmarks = model_resolver::resolve(
            HAND_LANDMARK_MODEL_NAME,
            settings.models.hand_landmarks.as_deref(),
            &search_dirs,
        )?;
        log::info!(
            "Loading hand models from {} and {}",
            palm.display(),
            landmarks.display()
        );
        session = session.with_hand_landmarker(Box::new(OnnxHandLandmarker::new(&palm, &landmarks)?));
    }

    if cli.record {
        std::fs::create_dir_all(&cli.folder)?;
        let seconds = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        let path = recording_path(&cli.folder, seconds);
        session = session.with_recording(Box::new(FfmpegWriter::new()), path);
    }

    let report = session.run()?;
    if let Some(stats) = report.recording {
        log::info!("Recorded {} frames ({} dropped)", stats.written, stats.dropped);
    }
    Ok(())
}

/// Applies command-line overrides on top of the settings file.
fn session_config(cli: &Cli, base: &SessionConfig) -> SessionConfig {
    if !cli.capture {
        return SessionConfig {
            grab_timeout_ms: base.grab_timeout_ms,
            ..SessionConfig::passthrough()
        };
    }

    let mut config = base.clone();
    if cli.no_objects {
        config.object_detection_enabled = false;
    }
    if cli.no_hands {
        config.hand_detection_enabled = false;
    }
    if let Some(confidence) = cli.confidence {
        config.confidence_threshold = confidence;
    }
    if let Some(frame_skip) = cli.frame_skip {
        config.frame_skip = frame_skip;
    }
    if cli.parallel {
        config.parallel_detection = true;
    }
    config
}

fn recording_path(folder: &Path, unix_seconds: u64) -> PathBuf {
    folder.join(format!("handsight_{unix_seconds}.mp4"))
}
