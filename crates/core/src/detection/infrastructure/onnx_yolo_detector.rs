/// YOLO object detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, YOLOv8-style output decoding
/// and class-aware NMS.
use std::collections::HashMap;
use std::path::Path;

use crate::detection::domain::object_detector::{Detection, DetectorError, ObjectDetector};
use crate::shared::frame::{ChannelOrder, Frame};
use crate::shared::geometry::BoundingBox;

use super::execution_provider::build_session;
use super::letterbox::{letterbox, Letterbox};
use super::math::{nms, Scored};

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Letterbox border, YOLO convention.
const PAD_VALUE: f32 = 114.0 / 255.0;

/// YOLO object detector backed by an ONNX Runtime session.
pub struct OnnxYoloDetector {
    session: ort::session::Session,
    input_size: u32,
    labels: HashMap<usize, String>,
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting
    /// NCHW) and class names from the `names` metadata entry written by
    /// the ultralytics exporter.
    pub fn new(model_path: &Path) -> Result<Self, DetectorError> {
        let session = build_session(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    // shape is [N, C, H, W]; square input, use H
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        let labels = session
            .metadata()
            .ok()
            .and_then(|meta| meta.custom("names").ok().flatten())
            .map(|names| parse_class_names(&names))
            .unwrap_or_default();
        log::info!(
            "Loaded object detector {} ({} classes, input {input_size})",
            model_path.display(),
            labels.len()
        );

        Ok(Self {
            session,
            input_size,
            labels,
        })
    }

    fn label(&self, class_id: usize) -> String {
        self.labels
            .get(&class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }
}

impl ObjectDetector for OnnxYoloDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f64,
    ) -> Result<Vec<Detection>, DetectorError> {
        let rgb = frame.to_channel_order(ChannelOrder::Rgb);

        // 1. Preprocess: letterbox + normalize → NCHW float32
        let (input_tensor, geometry) = letterbox(&rgb, self.input_size, PAD_VALUE);

        // 2. Inference + decode; outputs borrow the session until dropped
        let candidates = {
            let input_value = ort::value::Tensor::from_array(input_tensor)?;
            let outputs = self.session.run(ort::inputs![input_value])?;
            if outputs.len() == 0 {
                return Err("YOLO model produced no outputs".into());
            }
            let tensor = outputs[0].try_extract_array::<f32>()?;
            let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;
            decode_output(
                data,
                tensor.shape(),
                confidence_threshold,
                &geometry,
                frame.width() as f64,
                frame.height() as f64,
            )?
        };

        // 3. Suppress, label
        let kept = nms(candidates, NMS_IOU_THRESH);

        Ok(kept
            .into_iter()
            .map(|c| Detection {
                class_id: c.class_id,
                label: self.label(c.class_id),
                confidence: c.score,
                bbox: c.bbox,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Output decoding
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct Candidate {
    bbox: BoundingBox,
    score: f64,
    class_id: usize,
}

impl Scored for Candidate {
    fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }
    fn score(&self) -> f64 {
        self.score
    }
    fn group(&self) -> usize {
        self.class_id
    }
}

/// Decodes a YOLOv8 output tensor into candidates on the source frame.
///
/// Output shape is `[1, 4 + classes, anchors]` (transposed) or
/// `[1, anchors, 4 + classes]`; each row is `[cx, cy, w, h, class scores...]`
/// in letterboxed pixels.
fn decode_output(
    data: &[f32],
    shape: &[usize],
    confidence_threshold: f64,
    geometry: &Letterbox,
    frame_w: f64,
    frame_h: f64,
) -> Result<Vec<Candidate>, DetectorError> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
    }
    // Fewer features than anchors means [1, features, anchors].
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats < 5 {
        return Err(format!("YOLO output has {num_feats} features, need at least 5").into());
    }
    if data.len() < num_dets * num_feats {
        return Err("YOLO output shorter than its shape".into());
    }

    let at = |det: usize, feat: usize| {
        if transposed {
            data[feat * num_dets + det]
        } else {
            data[det * num_feats + feat]
        }
    };

    let mut candidates = Vec::new();
    for i in 0..num_dets {
        let (class_id, score) = (4..num_feats)
            .map(|f| (f - 4, at(i, f) as f64))
            .fold((0, f64::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        if score < confidence_threshold {
            continue;
        }

        let (cx, cy) = (at(i, 0) as f64, at(i, 1) as f64);
        let (w, h) = (at(i, 2) as f64, at(i, 3) as f64);
        let (x1, y1) = geometry.to_source(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = geometry.to_source(cx + w / 2.0, cy + h / 2.0);

        candidates.push(Candidate {
            bbox: BoundingBox::new(x1, y1, x2, y2).clamped(frame_w, frame_h),
            score,
            class_id,
        });
    }
    Ok(candidates)
}

/// Parses the ultralytics `names` metadata, e.g. `{0: 'person', 1: 'cup'}`.
fn parse_class_names(raw: &str) -> HashMap<usize, String> {
    raw.trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split(',')
        .filter_map(|entry| {
            let (id, name) = entry.split_once(':')?;
            let id = id.trim().trim_matches(|c: char| c == '\'' || c == '"').parse().ok()?;
            let name = name.trim().trim_matches(|c: char| c == '\'' || c == '"');
            (!name.is_empty()).then(|| (id, name.to_string()))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
