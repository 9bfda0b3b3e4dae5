use std::fmt;

use thiserror::Error;

use crate::camera::domain::camera_source::CameraError;
use crate::detection::domain::object_detector::DetectorError;

/// Which detector raised an inference fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionStage {
    Object,
    Hand,
}

impl fmt::Display for DetectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionStage::Object => write!(f, "object detection"),
            DetectionStage::Hand => write!(f, "hand detection"),
        }
    }
}

/// Fatal session outcomes. Each variant is raised after the camera,
/// presenter and recorder have been released.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(#[source] CameraError),
    #[error("acquisition failed after {frames} frames: {source}")]
    Acquisition {
        frames: usize,
        #[source]
        source: CameraError,
    },
    #[error("{stage} failed after {frames} frames: {source}")]
    Inference {
        stage: DetectionStage,
        frames: usize,
        #[source]
        source: DetectorError,
    },
    #[error("presentation failed after {frames} frames: {message}")]
    Presentation { frames: usize, message: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SessionError {
    /// Frames fully processed before the fault, where known. The frame
    /// being handled when the fault occurred is not counted.
    pub fn frames(&self) -> Option<usize> {
        match self {
            SessionError::Acquisition { frames, .. }
            | SessionError::Inference { frames, .. }
            | SessionError::Presentation { frames, .. } => Some(*frames),
            SessionError::DeviceUnavailable(_) => Some(0),
            SessionError::InvalidConfig(_) => None,
        }
    }
}
