pub const OBJECT_MODEL_NAME: &str = "yolo_objects.onnx";
pub const PALM_MODEL_NAME: &str = "palm_detection.onnx";
pub const HAND_LANDMARK_MODEL_NAME: &str = "hand_landmark.onnx";

/// Working-frame bounds for inference; 320x240 is the smallest size the
/// hand models still track reliably.
pub const WORKING_MAX_WIDTH: u32 = 320;
pub const WORKING_MAX_HEIGHT: u32 = 240;

/// Run inference on every Nth acquired frame.
pub const DEFAULT_FRAME_SKIP: usize = 3;

pub const DEFAULT_CONFIDENCE: f64 = 0.3;

pub const MAX_HANDS: usize = 2;

/// Upper bound on a single industrial camera grab.
pub const GRAB_TIMEOUT_MS: u64 = 5000;

/// Generic cameras that do not report a frame rate are assumed to run at this.
pub const DEFAULT_GENERIC_FPS: f64 = 25.0;

/// Industrial cameras whose resulting frame rate cannot be read.
pub const DEFAULT_INDUSTRIAL_FPS: f64 = 30.0;

pub const DEFAULT_OUTPUT_FOLDER: &str = "videos";

pub const WINDOW_TITLE: &str = "handsight";
