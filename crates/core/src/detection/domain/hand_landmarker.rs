use std::fmt;

use crate::shared::frame::Frame;
use crate::shared::geometry::Point;

use super::object_detector::DetectorError;

/// Number of keypoints in a hand skeleton.
pub const NUM_LANDMARKS: usize = 21;

/// Keypoint index pairs forming the hand skeleton.
///
/// 0 is the wrist; each finger runs base to tip: thumb 1-4, index 5-8,
/// middle 9-12, ring 13-16, pinky 17-20.
pub const HAND_CONNECTIONS: [(usize, usize); 21] = [
    // palm
    (0, 1),
    (0, 5),
    (9, 13),
    (13, 17),
    (5, 9),
    (0, 17),
    // thumb
    (1, 2),
    (2, 3),
    (3, 4),
    // index
    (5, 6),
    (6, 7),
    (7, 8),
    // middle
    (9, 10),
    (10, 11),
    (11, 12),
    // ring
    (13, 14),
    (14, 15),
    (15, 16),
    // pinky
    (17, 18),
    (18, 19),
    (19, 20),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

impl fmt::Display for Handedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handedness::Left => write!(f, "Left"),
            Handedness::Right => write!(f, "Right"),
        }
    }
}

/// One detected hand. Keypoints are normalized to the frame the detector
/// was given, each component in `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct HandObservation {
    pub handedness: Handedness,
    pub score: f64,
    pub keypoints: Vec<Point>,
}

/// Domain interface for multi-hand landmark detection.
pub trait HandLandmarker: Send {
    /// Returns every hand found in `frame`. No hands is an empty result,
    /// not an error.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<HandObservation>, DetectorError>;
}
