use serde::{Deserialize, Serialize};

use crate::shared::constants::{
    DEFAULT_CONFIDENCE, DEFAULT_FRAME_SKIP, GRAB_TIMEOUT_MS, WORKING_MAX_HEIGHT,
    WORKING_MAX_WIDTH,
};

/// Options for one capture session, passed to the controller at construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub object_detection_enabled: bool,
    pub hand_detection_enabled: bool,
    pub confidence_threshold: f64,
    /// Run inference on every Nth acquired frame.
    pub frame_skip: usize,
    pub max_working_width: u32,
    pub max_working_height: u32,
    /// Run both detectors on scoped threads and join before remapping.
    pub parallel_detection: bool,
    /// Present and record frames the throttle rejected, unannotated.
    pub show_skipped_frames: bool,
    pub grab_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            object_detection_enabled: true,
            hand_detection_enabled: true,
            confidence_threshold: DEFAULT_CONFIDENCE,
            frame_skip: DEFAULT_FRAME_SKIP,
            max_working_width: WORKING_MAX_WIDTH,
            max_working_height: WORKING_MAX_HEIGHT,
            parallel_detection: false,
            show_skipped_frames: false,
            grab_timeout_ms: GRAB_TIMEOUT_MS,
        }
    }
}

impl SessionConfig {
    /// Configuration with both detectors off: frames are acquired and shown
    /// without inference.
    pub fn passthrough() -> Self {
        Self {
            object_detection_enabled: false,
            hand_detection_enabled: false,
            frame_skip: 1,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(format!(
                "Confidence must be between 0.0 and 1.0, got {}",
                self.confidence_threshold
            ));
        }
        if self.frame_skip == 0 {
            return Err("Frame skip must be at least 1".to_string());
        }
        if self.max_working_width == 0 || self.max_working_height == 0 {
            return Err(format!(
                "Working frame bounds must be positive, got {}x{}",
                self.max_working_width, self.max_working_height
            ));
        }
        if self.grab_timeout_ms == 0 {
            return Err("Grab timeout must be positive".to_string());
        }
        Ok(())
    }

    pub fn inference_enabled(&self) -> bool {
        self.object_detection_enabled || self.hand_detection_enabled
    }
}
