use crate::shared::frame::Frame;
use crate::shared::geometry::BoundingBox;

/// Error type shared by the detector traits. Inference backends surface
/// their own error types through it.
pub type DetectorError = Box<dyn std::error::Error + Send + Sync>;

/// One labeled box, in pixels of the frame the detector was given.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub label: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

/// Domain interface for bounding-box object detection.
///
/// Implementations hold a loaded model, hence `&mut self`.
pub trait ObjectDetector: Send {
    /// Detects objects in `frame`, keeping candidates whose confidence is
    /// at least `confidence_threshold`.
    fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f64,
    ) -> Result<Vec<Detection>, DetectorError>;
}

/// Keeps detections with `confidence >= threshold`, preserving order.
pub fn retain_confident(detections: Vec<Detection>, threshold: f64) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.confidence >= threshold)
        .collect()
}
