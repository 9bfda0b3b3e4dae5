use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::camera::domain::camera_source::{Acquired, CameraError, CameraSource};
use crate::detection::domain::hand_landmarker::{HandLandmarker, HandObservation};
use crate::detection::domain::object_detector::{
    retain_confident, Detection, DetectorError, ObjectDetector,
};
use crate::overlay::domain::frame_presenter::FramePresenter;
use crate::overlay::overlay_renderer::OverlayRenderer;
use crate::shared::camera_info::CameraInfo;
use crate::shared::frame::Frame;
use crate::video::domain::video_writer::VideoWriter;
use crate::video::infrastructure::background_recorder::{
    BackgroundRecorder, RecordingStats, DEFAULT_RECORDER_CAPACITY,
};

use super::coordinate_remapper::{remap_detections, remap_hands};
use super::frame_scaler;
use super::frame_throttle::FrameThrottle;
use super::session_config::SessionConfig;
use super::session_error::{DetectionStage, SessionError};
use super::session_logger::{NullSessionLogger, SessionLogger};

/// Lifecycle of a capture session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    Running,
    Draining,
    Closed,
    Failed,
}

/// Why a session ended without a fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    UserStop,
    EndOfStream,
}

/// Throughput accounting for a completed session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionReport {
    pub stop_reason: StopReason,
    pub frames_acquired: usize,
    pub frames_admitted: usize,
    pub elapsed: Duration,
    pub recording: Option<RecordingStats>,
}

impl SessionReport {
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames_acquired as f64 / secs
        } else {
            0.0
        }
    }
}

#[derive(Default)]
struct Counters {
    acquired: usize,
    admitted: usize,
}

type StageOutput<T> = (Result<Vec<T>, DetectorError>, f64);

/// Drives one camera session: acquire, throttle, scale, detect, remap,
/// render, present, and optionally record, until the user stops, the
/// stream ends, or a fault occurs.
///
/// The controller owns the camera, detectors, presenter and recorder
/// exclusively. Whatever the outcome, all of them are released before
/// [`SessionController::run`] returns.
pub struct SessionController {
    config: SessionConfig,
    camera: Box<dyn CameraSource>,
    camera_index: usize,
    object_detector: Option<Box<dyn ObjectDetector>>,
    hand_landmarker: Option<Box<dyn HandLandmarker>>,
    renderer: OverlayRenderer,
    presenter: Box<dyn FramePresenter>,
    pending_recording: Option<(Box<dyn VideoWriter>, PathBuf)>,
    recorder: Option<BackgroundRecorder>,
    recording_stats: Option<RecordingStats>,
    logger: Box<dyn SessionLogger>,
    cancel: Arc<AtomicBool>,
    state: SessionState,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        camera: Box<dyn CameraSource>,
        presenter: Box<dyn FramePresenter>,
    ) -> Self {
        Self {
            config,
            camera,
            camera_index: 0,
            object_detector: None,
            hand_landmarker: None,
            renderer: OverlayRenderer::new(),
            presenter,
            pending_recording: None,
            recorder: None,
            recording_stats: None,
            logger: Box::new(NullSessionLogger),
            cancel: Arc::new(AtomicBool::new(false)),
            state: SessionState::Idle,
        }
    }

    pub fn with_camera_index(mut self, index: usize) -> Self {
        self.camera_index = index;
        self
    }

    pub fn with_object_detector(mut self, detector: Box<dyn ObjectDetector>) -> Self {
        self.object_detector = Some(detector);
        self
    }

    pub fn with_hand_landmarker(mut self, landmarker: Box<dyn HandLandmarker>) -> Self {
        self.hand_landmarker = Some(landmarker);
        self
    }

    /// Records every acquired frame to `path` at the camera's frame rate,
    /// annotated when the frame was admitted for inference.
    pub fn with_recording(mut self, writer: Box<dyn VideoWriter>, path: PathBuf) -> Self {
        self.pending_recording = Some((writer, path));
        self
    }

    pub fn with_logger(mut self, logger: Box<dyn SessionLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Shares a cancellation flag, polled once per iteration after present.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the session to completion.
    pub fn run(&mut self) -> Result<SessionReport, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidConfig(format!(
                "session already {:?}",
                self.state
            )));
        }

        let mut throttle = match self.validate() {
            Ok(throttle) => throttle,
            Err(e) => {
                self.state = SessionState::Failed;
                log::error!("{e}");
                return Err(e);
            }
        };

        self.state = SessionState::Opening;
        let info = match self.open_camera() {
            Ok(info) => info,
            Err(e) => {
                self.release();
                self.state = SessionState::Failed;
                log::error!("{e}");
                return Err(e);
            }
        };
        self.start_recording(&info);

        let started = Instant::now();
        let mut counters = Counters::default();
        let outcome = self.run_loop(&mut throttle, &mut counters);

        self.state = SessionState::Draining;
        self.release();
        self.logger.summary();

        match outcome {
            Ok(stop_reason) => {
                self.state = SessionState::Closed;
                let report = SessionReport {
                    stop_reason,
                    frames_acquired: counters.acquired,
                    frames_admitted: counters.admitted,
                    elapsed: started.elapsed(),
                    recording: self.recording_stats,
                };
                log::info!(
                    "Session closed ({:?}): {} frames acquired, {} processed, {:.1} fps",
                    report.stop_reason,
                    report.frames_acquired,
                    report.frames_admitted,
                    report.fps()
                );
                Ok(report)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                log::error!("{e}");
                Err(e)
            }
        }
    }

    fn validate(&self) -> Result<FrameThrottle, SessionError> {
        self.config.validate().map_err(SessionError::InvalidConfig)?;
        if self.config.object_detection_enabled && self.object_detector.is_none() {
            return Err(SessionError::InvalidConfig(
                "object detection enabled without a detector".into(),
            ));
        }
        if self.config.hand_detection_enabled && self.hand_landmarker.is_none() {
            return Err(SessionError::InvalidConfig(
                "hand detection enabled without a landmarker".into(),
            ));
        }
        FrameThrottle::new(self.config.frame_skip)
            .map_err(|e| SessionError::InvalidConfig(e.to_string()))
    }

    fn open_camera(&mut self) -> Result<CameraInfo, SessionError> {
        let info = self
            .camera
            .open(self.camera_index)
            .map_err(SessionError::DeviceUnavailable)?;
        self.camera.start().map_err(SessionError::DeviceUnavailable)?;
        self.logger.info(&format!(
            "Camera {} ({} backend): {}x{} @ {:.1} fps",
            info.device, info.backend, info.width, info.height, info.fps
        ));
        Ok(info)
    }

    fn start_recording(&mut self, info: &CameraInfo) {
        let Some((writer, path)) = self.pending_recording.take() else {
            return;
        };
        match BackgroundRecorder::start(writer, &path, info, DEFAULT_RECORDER_CAPACITY) {
            Ok(recorder) => self.recorder = Some(recorder),
            Err(e) => log::error!("Recording disabled, could not open {}: {e}", path.display()),
        }
    }

    fn run_loop(
        &mut self,
        throttle: &mut FrameThrottle,
        counters: &mut Counters,
    ) -> Result<StopReason, SessionError> {
        let timeout = Duration::from_millis(self.config.grab_timeout_ms);

        loop {
            let t = Instant::now();
            let acquired = self
                .camera
                .next_frame(timeout)
                .map_err(|source| SessionError::Acquisition {
                    frames: counters.acquired,
                    source,
                })?;
            let mut frame = match acquired {
                Acquired::Frame(frame) => frame,
                Acquired::EndOfStream => {
                    self.logger.info("Camera reported end of stream");
                    return Ok(StopReason::EndOfStream);
                }
            };
            self.logger.timing("acquire", elapsed_ms(t));

            if self.state == SessionState::Opening {
                self.state = SessionState::Running;
            }

            let index = counters.acquired;
            counters.acquired += 1;
            let admitted = throttle.admit();
            self.logger.frame(index, admitted);

            if admitted {
                counters.admitted += 1;
                if self.config.inference_enabled() {
                    self.annotate(&mut frame, index)?;
                }
            }
            if admitted || self.config.show_skipped_frames {
                self.present(&frame, index)?;
            }
            // Every acquired frame is recorded so playback runs at camera fps.
            if let Some(recorder) = self.recorder.as_mut() {
                recorder.submit(&frame);
            }

            if self.cancel.load(Ordering::SeqCst) {
                self.logger.info("Stop requested");
                return Ok(StopReason::UserStop);
            }
        }
    }

    /// Runs inference on the working frame and draws the results onto the
    /// full-resolution frame.
    fn annotate(&mut self, frame: &mut Frame, frames: usize) -> Result<(), SessionError> {
        let (detections, hands) = {
            let t = Instant::now();
            // A frame the scaler cannot bound is a defect of the acquired frame.
            let working = frame_scaler::scale(
                frame,
                self.config.max_working_width,
                self.config.max_working_height,
            )
            .map_err(|e| SessionError::Acquisition {
                frames,
                source: CameraError::GrabFailed(e.to_string()),
            })?;
            self.logger.timing("scale", elapsed_ms(t));

            let (objects, observations) = self.detect(&working.frame, frames)?;
            let objects = retain_confident(objects, self.config.confidence_threshold);
            (
                remap_detections(&objects, working.scale),
                remap_hands(&observations, working.scale, working.width(), working.height()),
            )
        };
        self.logger.metric("objects", detections.len() as f64);
        self.logger.metric("hands", hands.len() as f64);

        let t = Instant::now();
        self.renderer.render(frame, &detections, &hands);
        self.logger.timing("render", elapsed_ms(t));
        Ok(())
    }

    fn detect(
        &mut self,
        working: &Frame,
        frames: usize,
    ) -> Result<(Vec<Detection>, Vec<HandObservation>), SessionError> {
        let threshold = self.config.confidence_threshold;
        let objects_on = self.config.object_detection_enabled;
        let hands_on = self.config.hand_detection_enabled;
        let object_detector = &mut self.object_detector;
        let hand_landmarker = &mut self.hand_landmarker;

        let (objects, hands) = if self.config.parallel_detection && objects_on && hands_on {
            std::thread::scope(|s| {
                let objects = s.spawn(|| detect_objects(object_detector, working, threshold));
                let hands = s.spawn(|| detect_hands(hand_landmarker, working));
                (
                    objects.join().unwrap_or_else(|_| panicked()),
                    hands.join().unwrap_or_else(|_| panicked()),
                )
            })
        } else {
            let objects = if objects_on {
                detect_objects(object_detector, working, threshold)
            } else {
                (Ok(Vec::new()), 0.0)
            };
            let hands = if hands_on {
                detect_hands(hand_landmarker, working)
            } else {
                (Ok(Vec::new()), 0.0)
            };
            (objects, hands)
        };

        if objects_on {
            self.logger.timing("objects", objects.1);
        }
        if hands_on {
            self.logger.timing("hands", hands.1);
        }
        let fault = |stage: DetectionStage| move |source: DetectorError| SessionError::Inference {
            stage,
            frames,
            source,
        };
        Ok((
            objects.0.map_err(fault(DetectionStage::Object))?,
            hands.0.map_err(fault(DetectionStage::Hand))?,
        ))
    }

    fn present(&mut self, frame: &Frame, frames: usize) -> Result<(), SessionError> {
        let t = Instant::now();
        self.presenter
            .present(frame)
            .map_err(|e| SessionError::Presentation {
                frames,
                message: e.to_string(),
            })?;
        self.logger.timing("present", elapsed_ms(t));
        Ok(())
    }

    /// Stops and closes the camera, closes the presenter and finalizes the
    /// recording. Runs on every exit path once the camera was touched.
    fn release(&mut self) {
        self.camera.stop();
        self.camera.close();
        self.presenter.close();
        if let Some(mut recorder) = self.recorder.take() {
            match recorder.close() {
                Ok(stats) => {
                    log::info!(
                        "Recording finished: {} frames written, {} dropped",
                        stats.written,
                        stats.dropped
                    );
                    self.recording_stats = Some(stats);
                }
                Err(e) => log::error!("Recording failed: {e}"),
            }
        }
    }
}

fn detect_objects(
    detector: &mut Option<Box<dyn ObjectDetector>>,
    frame: &Frame,
    threshold: f64,
) -> StageOutput<Detection> {
    let t = Instant::now();
    let result = match detector.as_mut() {
        Some(detector) => detector.detect(frame, threshold),
        None => Ok(Vec::new()),
    };
    (result, elapsed_ms(t))
}

fn detect_hands(
    landmarker: &mut Option<Box<dyn HandLandmarker>>,
    frame: &Frame,
) -> StageOutput<HandObservation> {
    let t = Instant::now();
    let result = match landmarker.as_mut() {
        Some(landmarker) => landmarker.detect(frame),
        None => Ok(Vec::new()),
    };
    (result, elapsed_ms(t))
}

fn panicked<T>() -> StageOutput<T> {
    (Err("detector panicked".into()), 0.0)
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::domain::camera_source::{require_state, CameraState};
    use crate::detection::domain::hand_landmarker::{Handedness, NUM_LANDMARKS};
    use crate::overlay::domain::frame_presenter::PresentError;
    use crate::overlay::infrastructure::headless_presenter::HeadlessPresenter;
    use crate::overlay::overlay_renderer::{BOX_COLOR, KEYPOINT_COLOR};
    use crate::shared::camera_info::CameraBackend;
    use crate::shared::geometry::{BoundingBox, Point};
    use crate::video::domain::video_writer::WriterError;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;

    // --- Fakes ---

    #[derive(Default)]
    struct CameraLog {
        opened: usize,
        started: usize,
        stopped: usize,
        closed: usize,
    }

    enum Script {
        /// Produce frames forever.
        Endless,
        /// Pop scripted results; end of stream once empty.
        Queue(VecDeque<Result<(), CameraError>>),
    }

    struct FakeCamera {
        width: u32,
        height: u32,
        channels: u8,
        fail_open: bool,
        script: Script,
        log: Arc<Mutex<CameraLog>>,
        state: CameraState,
        info: Option<CameraInfo>,
        next_index: usize,
    }

    impl FakeCamera {
        fn new(width: u32, height: u32, script: Script) -> (Self, Arc<Mutex<CameraLog>>) {
            let log = Arc::new(Mutex::new(CameraLog::default()));
            let camera = Self {
                width,
                height,
                channels: 3,
                fail_open: false,
                script,
                log: Arc::clone(&log),
                state: CameraState::Closed,
                info: None,
                next_index: 0,
            };
            (camera, log)
        }

        fn frames(width: u32, height: u32, n: usize) -> (Self, Arc<Mutex<CameraLog>>) {
            Self::new(width, height, Script::Queue((0..n).map(|_| Ok(())).collect()))
        }
    }

    impl CameraSource for FakeCamera {
        fn open(&mut self, index: usize) -> Result<CameraInfo, CameraError> {
            self.log.lock().unwrap().opened += 1;
            if self.fail_open {
                return Err(CameraError::CameraUnavailable {
                    index,
                    reason: "busy".into(),
                });
            }
            self.state = CameraState::Open;
            let info = CameraInfo {
                width: self.width,
                height: self.height,
                fps: 30.0,
                backend: CameraBackend::Generic,
                device: "fake".into(),
            };
            self.info = Some(info.clone());
            Ok(info)
        }

        fn start(&mut self) -> Result<(), CameraError> {
            require_state(self.state, CameraState::Open)?;
            self.log.lock().unwrap().started += 1;
            self.state = CameraState::Grabbing;
            Ok(())
        }

        fn next_frame(&mut self, _timeout: Duration) -> Result<Acquired, CameraError> {
            require_state(self.state, CameraState::Grabbing)?;
            let step = match &mut self.script {
                Script::Endless => Some(Ok(())),
                Script::Queue(queue) => queue.pop_front(),
            };
            match step {
                None => Ok(Acquired::EndOfStream),
                Some(Err(e)) => Err(e),
                Some(Ok(())) => {
                    let len = (self.width * self.height) as usize * self.channels as usize;
                    let frame =
                        Frame::new(vec![0u8; len], self.width, self.height, self.channels, self.next_index);
                    self.next_index += 1;
                    Ok(Acquired::Frame(frame))
                }
            }
        }

        fn stop(&mut self) {
            self.log.lock().unwrap().stopped += 1;
            if self.state == CameraState::Grabbing {
                self.state = CameraState::Stopped;
            }
        }

        fn close(&mut self) {
            self.log.lock().unwrap().closed += 1;
            self.state = CameraState::Closed;
        }

        fn state(&self) -> CameraState {
            self.state
        }

        fn info(&self) -> Option<&CameraInfo> {
            self.info.as_ref()
        }
    }

    struct FakeObjectDetector {
        detections: Vec<Detection>,
        fail_on_call: Option<usize>,
        calls: usize,
        seen_sizes: Arc<Mutex<Vec<(u32, u32)>>>,
    }

    impl FakeObjectDetector {
        fn returning(detections: Vec<Detection>) -> Self {
            Self {
                detections,
                fail_on_call: None,
                calls: 0,
                seen_sizes: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl ObjectDetector for FakeObjectDetector {
        fn detect(
            &mut self,
            frame: &Frame,
            _confidence_threshold: f64,
        ) -> Result<Vec<Detection>, DetectorError> {
            self.calls += 1;
            self.seen_sizes
                .lock()
                .unwrap()
                .push((frame.width(), frame.height()));
            if self.fail_on_call == Some(self.calls) {
                return Err("output tensor has unexpected shape".into());
            }
            Ok(self.detections.clone())
        }
    }

    enum HandBehavior {
        Return(Vec<HandObservation>),
        Fail,
        Panic,
    }

    struct FakeHands(HandBehavior);

    impl HandLandmarker for FakeHands {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<HandObservation>, DetectorError> {
            match &self.0 {
                HandBehavior::Return(hands) => Ok(hands.clone()),
                HandBehavior::Fail => Err("landmark model failed".into()),
                HandBehavior::Panic => panic!("landmark model crashed"),
            }
        }
    }

    #[derive(Default)]
    struct PresenterLog {
        frames: Vec<Frame>,
        closed: usize,
    }

    struct CapturingPresenter {
        log: Arc<Mutex<PresenterLog>>,
        fail_on: Option<usize>,
    }

    impl CapturingPresenter {
        fn new() -> (Self, Arc<Mutex<PresenterLog>>) {
            let log = Arc::new(Mutex::new(PresenterLog::default()));
            (
                Self {
                    log: Arc::clone(&log),
                    fail_on: None,
                },
                log,
            )
        }
    }

    impl FramePresenter for CapturingPresenter {
        fn present(&mut self, frame: &Frame) -> Result<(), PresentError> {
            let mut log = self.log.lock().unwrap();
            if self.fail_on == Some(log.frames.len()) {
                return Err("display lost".into());
            }
            log.frames.push(frame.clone());
            Ok(())
        }

        fn close(&mut self) {
            self.log.lock().unwrap().closed += 1;
        }
    }

    struct CountingWriter(Arc<Mutex<usize>>);

    impl VideoWriter for CountingWriter {
        fn open(&mut self, _path: &Path, _info: &CameraInfo) -> Result<(), WriterError> {
            Ok(())
        }

        fn write(&mut self, _frame: &Frame) -> Result<(), WriterError> {
            *self.0.lock().unwrap() += 1;
            Ok(())
        }

        fn close(&mut self) -> Result<(), WriterError> {
            Ok(())
        }
    }

    // --- Helpers ---

    fn cup(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f64) -> Detection {
        Detection {
            class_id: 41,
            label: "cup".into(),
            confidence,
            bbox: BoundingBox::new(x1, y1, x2, y2),
        }
    }

    fn centered_hand() -> HandObservation {
        HandObservation {
            handedness: Handedness::Right,
            score: 0.9,
            keypoints: vec![Point::new(0.5, 0.5); NUM_LANDMARKS],
        }
    }

    fn config(frame_skip: usize, objects: bool, hands: bool) -> SessionConfig {
        SessionConfig {
            object_detection_enabled: objects,
            hand_detection_enabled: hands,
            frame_skip,
            ..SessionConfig::default()
        }
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let i = ((y * frame.width() + x) * 3) as usize;
        [frame.data()[i], frame.data()[i + 1], frame.data()[i + 2]]
    }

    // --- Tests ---

    #[test]
    fn test_user_stop_releases_camera_once() {
        let (camera, camera_log) = FakeCamera::new(64, 48, Script::Endless);
        let cancel = Arc::new(AtomicBool::new(false));
        let presenter = HeadlessPresenter::new().stop_after(5, Arc::clone(&cancel));

        let mut session =
            SessionController::new(SessionConfig::passthrough(), Box::new(camera), Box::new(presenter))
                .with_cancel(cancel);
        let report = session.run().unwrap();

        assert_eq!(report.stop_reason, StopReason::UserStop);
        assert_eq!(report.frames_acquired, 5);
        assert_eq!(report.frames_admitted, 5);
        assert_eq!(session.state(), SessionState::Closed);
        let log = camera_log.lock().unwrap();
        assert_eq!((log.opened, log.started, log.closed), (1, 1, 1));
    }

    #[test]
    fn test_end_of_stream_with_throttle() {
        let (camera, camera_log) = FakeCamera::frames(64, 48, 4);
        let (presenter, presented) = CapturingPresenter::new();
        let detector = FakeObjectDetector::returning(Vec::new());
        let seen = Arc::clone(&detector.seen_sizes);

        let mut session =
            SessionController::new(config(2, true, false), Box::new(camera), Box::new(presenter))
                .with_object_detector(Box::new(detector));
        let report = session.run().unwrap();

        assert_eq!(report.stop_reason, StopReason::EndOfStream);
        assert_eq!(report.frames_acquired, 4);
        assert_eq!(report.frames_admitted, 2);
        assert_eq!(seen.lock().unwrap().len(), 2);
        let presented = presented.lock().unwrap();
        let indices: Vec<usize> = presented.frames.iter().map(|f| f.index()).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(presented.closed, 1);
        assert_eq!(camera_log.lock().unwrap().closed, 1);
    }

    #[test]
    fn test_show_skipped_frames_presents_everything() {
        let (camera, _) = FakeCamera::frames(64, 48, 6);
        let (presenter, presented) = CapturingPresenter::new();
        let cfg = SessionConfig {
            show_skipped_frames: true,
            ..config(3, true, false)
        };
        let mut session = SessionController::new(cfg, Box::new(camera), Box::new(presenter))
            .with_object_detector(Box::new(FakeObjectDetector::returning(Vec::new())));
        let report = session.run().unwrap();

        assert_eq!(report.frames_admitted, 2);
        assert_eq!(presented.lock().unwrap().frames.len(), 6);
    }

    #[test]
    fn test_grab_failure_is_acquisition_fault() {
        let script = Script::Queue(VecDeque::from(vec![
            Ok(()),
            Ok(()),
            Err(CameraError::GrabFailed("buffer underrun".into())),
        ]));
        let (camera, camera_log) = FakeCamera::new(64, 48, script);
        let (presenter, presented) = CapturingPresenter::new();

        let mut session =
            SessionController::new(SessionConfig::passthrough(), Box::new(camera), Box::new(presenter));
        let err = session.run().unwrap_err();

        assert!(matches!(
            err,
            SessionError::Acquisition {
                frames: 2,
                source: CameraError::GrabFailed(_)
            }
        ));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(camera_log.lock().unwrap().closed, 1);
        assert_eq!(presented.lock().unwrap().closed, 1);
    }

    #[test]
    fn test_inference_fault_names_stage_and_releases() {
        let (camera, camera_log) = FakeCamera::frames(64, 48, 10);
        let (presenter, presented) = CapturingPresenter::new();
        let mut detector = FakeObjectDetector::returning(Vec::new());
        detector.fail_on_call = Some(2);

        let mut session =
            SessionController::new(config(1, true, false), Box::new(camera), Box::new(presenter))
                .with_object_detector(Box::new(detector));
        let err = session.run().unwrap_err();

        match err {
            SessionError::Inference { stage, frames, .. } => {
                assert_eq!(stage, DetectionStage::Object);
                assert_eq!(frames, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(camera_log.lock().unwrap().closed, 1);
        assert_eq!(presented.lock().unwrap().frames.len(), 1);
    }

    #[test]
    fn test_hand_fault_is_reported_as_hand_stage() {
        let (camera, camera_log) = FakeCamera::frames(64, 48, 3);
        let (presenter, _) = CapturingPresenter::new();
        let mut session =
            SessionController::new(config(1, false, true), Box::new(camera), Box::new(presenter))
                .with_hand_landmarker(Box::new(FakeHands(HandBehavior::Fail)));

        let err = session.run().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Inference {
                stage: DetectionStage::Hand,
                frames: 0,
                ..
            }
        ));
        assert_eq!(camera_log.lock().unwrap().closed, 1);
    }

    #[test]
    fn test_open_failure_is_device_unavailable() {
        let (mut camera, camera_log) = FakeCamera::frames(64, 48, 3);
        camera.fail_open = true;
        let (presenter, presented) = CapturingPresenter::new();
        let detector = FakeObjectDetector::returning(Vec::new());
        let seen = Arc::clone(&detector.seen_sizes);

        let mut session =
            SessionController::new(config(1, true, false), Box::new(camera), Box::new(presenter))
                .with_object_detector(Box::new(detector));
        let err = session.run().unwrap_err();

        assert!(matches!(err, SessionError::DeviceUnavailable(_)));
        assert_eq!(err.frames(), Some(0));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(seen.lock().unwrap().is_empty());
        assert!(presented.lock().unwrap().frames.is_empty());
        let log = camera_log.lock().unwrap();
        assert_eq!(log.started, 0);
        assert_eq!(log.closed, 1);
    }

    #[test]
    fn test_presentation_error_is_fatal() {
        let (camera, camera_log) = FakeCamera::frames(64, 48, 5);
        let (mut presenter, _) = CapturingPresenter::new();
        presenter.fail_on = Some(1);
        let mut session =
            SessionController::new(SessionConfig::passthrough(), Box::new(camera), Box::new(presenter));

        let err = session.run().unwrap_err();
        assert!(matches!(err, SessionError::Presentation { frames: 1, .. }));
        assert_eq!(camera_log.lock().unwrap().closed, 1);
    }

    #[test]
    fn test_invalid_config_never_opens_camera() {
        let (camera, camera_log) = FakeCamera::frames(64, 48, 3);
        let (presenter, _) = CapturingPresenter::new();
        let cfg = SessionConfig {
            frame_skip: 0,
            ..SessionConfig::passthrough()
        };
        let mut session = SessionController::new(cfg, Box::new(camera), Box::new(presenter));

        assert!(matches!(session.run(), Err(SessionError::InvalidConfig(_))));
        assert_eq!(camera_log.lock().unwrap().opened, 0);
    }

    #[test]
    fn test_enabled_detector_must_be_supplied() {
        let (camera, _) = FakeCamera::frames(64, 48, 3);
        let (presenter, _) = CapturingPresenter::new();
        let mut session =
            SessionController::new(config(1, true, false), Box::new(camera), Box::new(presenter));
        assert!(matches!(session.run(), Err(SessionError::InvalidConfig(_))));
    }

    #[test]
    fn test_second_run_is_rejected() {
        let (camera, camera_log) = FakeCamera::frames(64, 48, 1);
        let (presenter, _) = CapturingPresenter::new();
        let mut session =
            SessionController::new(SessionConfig::passthrough(), Box::new(camera), Box::new(presenter));
        session.run().unwrap();
        assert!(session.run().is_err());
        assert_eq!(camera_log.lock().unwrap().opened, 1);
    }

    #[test]
    fn test_large_frame_detections_are_remapped_to_original() {
        let (camera, _) = FakeCamera::frames(1280, 960, 1);
        let (presenter, presented) = CapturingPresenter::new();
        let detector = FakeObjectDetector::returning(vec![cup(10.0, 10.0, 50.0, 50.0, 0.9)]);
        let seen = Arc::clone(&detector.seen_sizes);

        let mut session =
            SessionController::new(config(1, true, true), Box::new(camera), Box::new(presenter))
                .with_object_detector(Box::new(detector))
                .with_hand_landmarker(Box::new(FakeHands(HandBehavior::Return(vec![
                    centered_hand(),
                ]))));
        session.run().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![(320, 240)]);
        let presented = presented.lock().unwrap();
        let frame = &presented.frames[0];
        assert_eq!((frame.width(), frame.height()), (1280, 960));
        // left edge of the remapped (40,40)-(200,200) box
        assert_eq!(pixel(frame, 40, 100), BOX_COLOR);
        assert_eq!(pixel(frame, 120, 120), [0, 0, 0]);
        // normalized (0.5, 0.5) lands at the original center
        assert_eq!(pixel(frame, 640, 480), KEYPOINT_COLOR);
    }

    #[test]
    fn test_low_confidence_detections_are_not_drawn() {
        let (camera, _) = FakeCamera::frames(320, 240, 1);
        let (presenter, presented) = CapturingPresenter::new();
        let cfg = SessionConfig {
            confidence_threshold: 0.5,
            ..config(1, true, false)
        };
        let mut session = SessionController::new(cfg, Box::new(camera), Box::new(presenter))
            .with_object_detector(Box::new(FakeObjectDetector::returning(vec![cup(
                40.0, 40.0, 200.0, 200.0, 0.2,
            )])));
        session.run().unwrap();

        let presented = presented.lock().unwrap();
        assert!(presented.frames[0].data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_zero_hands_is_not_an_error() {
        let (camera, _) = FakeCamera::frames(64, 48, 2);
        let (presenter, presented) = CapturingPresenter::new();
        let mut session =
            SessionController::new(config(1, false, true), Box::new(camera), Box::new(presenter))
                .with_hand_landmarker(Box::new(FakeHands(HandBehavior::Return(Vec::new()))));

        let report = session.run().unwrap();
        assert_eq!(report.frames_admitted, 2);
        let presented = presented.lock().unwrap();
        assert!(presented.frames.iter().all(|f| f.data().iter().all(|&v| v == 0)));
    }

    #[test]
    fn test_parallel_detection_matches_sequential() {
        let run = |parallel: bool| {
            let (camera, _) = FakeCamera::frames(640, 480, 1);
            let (presenter, presented) = CapturingPresenter::new();
            let cfg = SessionConfig {
                parallel_detection: parallel,
                ..config(1, true, true)
            };
            let mut session = SessionController::new(cfg, Box::new(camera), Box::new(presenter))
                .with_object_detector(Box::new(FakeObjectDetector::returning(vec![cup(
                    20.0, 20.0, 100.0, 100.0, 0.8,
                )])))
                .with_hand_landmarker(Box::new(FakeHands(HandBehavior::Return(vec![
                    centered_hand(),
                ]))));
            session.run().unwrap();
            let frames = std::mem::take(&mut presented.lock().unwrap().frames);
            frames
        };
        let sequential = run(false);
        let parallel = run(true);
        assert_eq!(sequential[0].data(), parallel[0].data());
    }

    #[test]
    fn test_parallel_detector_panic_is_inference_fault() {
        let (camera, camera_log) = FakeCamera::frames(64, 48, 3);
        let (presenter, _) = CapturingPresenter::new();
        let cfg = SessionConfig {
            parallel_detection: true,
            ..config(1, true, true)
        };
        let mut session = SessionController::new(cfg, Box::new(camera), Box::new(presenter))
            .with_object_detector(Box::new(FakeObjectDetector::returning(Vec::new())))
            .with_hand_landmarker(Box::new(FakeHands(HandBehavior::Panic)));

        let err = session.run().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Inference {
                stage: DetectionStage::Hand,
                ..
            }
        ));
        assert_eq!(camera_log.lock().unwrap().closed, 1);
    }

    #[test]
    fn test_passthrough_recording_writes_every_frame() {
        let (camera, _) = FakeCamera::frames(32, 24, 3);
        let (presenter, _) = CapturingPresenter::new();
        let written = Arc::new(Mutex::new(0));

        let mut session =
            SessionController::new(SessionConfig::passthrough(), Box::new(camera), Box::new(presenter))
                .with_recording(
                    Box::new(CountingWriter(Arc::clone(&written))),
                    PathBuf::from("session.mp4"),
                );
        let report = session.run().unwrap();

        assert_eq!(
            report.recording,
            Some(RecordingStats {
                written: 3,
                dropped: 0
            })
        );
        assert_eq!(*written.lock().unwrap(), 3);
    }

    #[test]
    fn test_recording_keeps_skipped_frames_at_camera_rate() {
        let (camera, _) = FakeCamera::frames(32, 24, 6);
        let (presenter, presented) = CapturingPresenter::new();
        let written = Arc::new(Mutex::new(0));

        let mut session =
            SessionController::new(config(3, true, false), Box::new(camera), Box::new(presenter))
                .with_object_detector(Box::new(FakeObjectDetector::returning(Vec::new())))
                .with_recording(
                    Box::new(CountingWriter(Arc::clone(&written))),
                    PathBuf::from("session.mp4"),
                );
        let report = session.run().unwrap();

        assert_eq!(report.frames_admitted, 2);
        assert_eq!(presented.lock().unwrap().frames.len(), 2);
        assert_eq!(*written.lock().unwrap(), report.frames_acquired);
        assert_eq!(
            report.recording,
            Some(RecordingStats {
                written: 6,
                dropped: 0
            })
        );
    }

    #[test]
    fn test_unscalable_frame_is_acquisition_fault() {
        let (mut camera, camera_log) = FakeCamera::frames(640, 480, 2);
        camera.channels = 1;
        let (presenter, presented) = CapturingPresenter::new();
        let detector = FakeObjectDetector::returning(Vec::new());
        let seen = Arc::clone(&detector.seen_sizes);

        let mut session =
            SessionController::new(config(1, true, false), Box::new(camera), Box::new(presenter))
                .with_object_detector(Box::new(detector));
        let err = session.run().unwrap_err();

        assert!(matches!(
            err,
            SessionError::Acquisition {
                frames: 0,
                source: CameraError::GrabFailed(_)
            }
        ));
        assert!(seen.lock().unwrap().is_empty());
        assert!(presented.lock().unwrap().frames.is_empty());
        assert_eq!(camera_log.lock().unwrap().closed, 1);
    }

    #[test]
    fn test_fault_frame_counts_exclude_failing_frame() {
        // Each fault reports the frames completed before it: two clean
        // frames, then the third fails in every stage.
        let acquisition = {
            let script = Script::Queue(VecDeque::from(vec![
                Ok(()),
                Ok(()),
                Err(CameraError::GrabFailed("usb reset".into())),
            ]));
            let (camera, _) = FakeCamera::new(64, 48, script);
            let (presenter, _) = CapturingPresenter::new();
            SessionController::new(SessionConfig::passthrough(), Box::new(camera), Box::new(presenter))
                .run()
                .unwrap_err()
        };
        let inference = {
            let (camera, _) = FakeCamera::frames(64, 48, 5);
            let (presenter, _) = CapturingPresenter::new();
            let mut detector = FakeObjectDetector::returning(Vec::new());
            detector.fail_on_call = Some(3);
            SessionController::new(config(1, true, false), Box::new(camera), Box::new(presenter))
                .with_object_detector(Box::new(detector))
                .run()
                .unwrap_err()
        };
        let presentation = {
            let (camera, _) = FakeCamera::frames(64, 48, 5);
            let (mut presenter, _) = CapturingPresenter::new();
            presenter.fail_on = Some(2);
            SessionController::new(SessionConfig::passthrough(), Box::new(camera), Box::new(presenter))
                .run()
                .unwrap_err()
        };

        assert!(matches!(acquisition, SessionError::Acquisition { .. }));
        assert!(matches!(inference, SessionError::Inference { .. }));
        assert!(matches!(presentation, SessionError::Presentation { .. }));
        for err in [acquisition, inference, presentation] {
            assert_eq!(err.frames(), Some(2), "{err}");
        }
    }

    #[test]
    fn test_report_fps_with_zero_elapsed() {
        let report = SessionReport {
            stop_reason: StopReason::EndOfStream,
            frames_acquired: 10,
            frames_admitted: 4,
            elapsed: Duration::ZERO,
            recording: None,
        };
        assert_eq!(report.fps(), 0.0);
    }
}
