//! Maps detector output from working-frame space back to the original frame.

use crate::detection::domain::hand_landmarker::{HandObservation, Handedness};
use crate::detection::domain::object_detector::Detection;
use crate::shared::geometry::{BoundingBox, Point};

/// A detection in original-frame pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct RemappedDetection {
    pub label: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

/// A hand with keypoints in original-frame pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct RemappedHand {
    pub handedness: Handedness,
    pub keypoints: Vec<Point>,
}

/// Divides each box corner by `scale`.
pub fn remap_detection(detection: &Detection, scale: f64) -> RemappedDetection {
    RemappedDetection {
        label: detection.label.clone(),
        confidence: detection.confidence,
        bbox: detection.bbox.scaled(1.0 / scale),
    }
}

/// Maps normalized keypoints to original pixels:
/// `x = nx * working_width / scale`, `y = ny * working_height / scale`.
pub fn remap_hand(
    hand: &HandObservation,
    scale: f64,
    working_width: u32,
    working_height: u32,
) -> RemappedHand {
    let sx = working_width as f64 / scale;
    let sy = working_height as f64 / scale;
    RemappedHand {
        handedness: hand.handedness,
        keypoints: hand
            .keypoints
            .iter()
            .map(|p| Point::new(p.x * sx, p.y * sy))
            .collect(),
    }
}

pub fn remap_detections(detections: &[Detection], scale: f64) -> Vec<RemappedDetection> {
    detections
        .iter()
        .map(|d| remap_detection(d, scale))
        .collect()
}

pub fn remap_hands(
    hands: &[HandObservation],
    scale: f64,
    working_width: u32,
    working_height: u32,
) -> Vec<RemappedHand> {
    hands
        .iter()
        .map(|h| remap_hand(h, scale, working_width, working_height))
        .collect()
}
