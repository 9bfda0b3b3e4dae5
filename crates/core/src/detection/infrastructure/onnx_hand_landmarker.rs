/// Two-stage hand landmark detector using ONNX Runtime via `ort`.
///
/// Stage one runs a palm detector over the letterboxed frame. Stage two
/// crops a rotated square around each palm and runs the 21-point landmark
/// model on it, then projects the keypoints back onto the frame.
use std::f64::consts::PI;
use std::path::Path;

use ndarray::Array4;

use crate::detection::domain::hand_landmarker::{
    HandLandmarker, HandObservation, Handedness, NUM_LANDMARKS,
};
use crate::detection::domain::object_detector::DetectorError;
use crate::shared::constants::MAX_HANDS;
use crate::shared::frame::{ChannelOrder, Frame};
use crate::shared::geometry::{BoundingBox, Point};

use super::execution_provider::build_session;
use super::letterbox::{is_channels_first, letterbox, to_nhwc};
use super::math::{as_probability, nms, sigmoid, Scored};

/// Palm detector input resolution.
const PALM_INPUT_SIZE: u32 = 192;

/// Landmark model input resolution.
const LANDMARK_INPUT_SIZE: u32 = 224;

/// Palm anchors: 24×24 grid × 2 + 12×12 grid × 6.
const NUM_ANCHORS: usize = 2016;

/// Values per palm regressor row: box (4) + 7 keypoints × 2.
const PALM_REGRESSOR_LEN: usize = 18;

const PALM_SCORE_THRESH: f32 = 0.5;
const PALM_NMS_IOU_THRESH: f64 = 0.3;
const PRESENCE_THRESH: f32 = 0.5;

/// ROI expansion around the palm box so the crop covers the fingers.
const ROI_SCALE: f64 = 2.6;
/// ROI shift toward the fingers, as a fraction of the palm size.
const ROI_SHIFT_Y: f64 = -0.5;

/// Palm keypoints used to orient the ROI: wrist center and middle finger base.
const WRIST_KEYPOINT: usize = 0;
const MIDDLE_FINGER_KEYPOINT: usize = 2;

/// Hand landmark detector backed by two ONNX Runtime sessions.
pub struct OnnxHandLandmarker {
    palm_session: ort::session::Session,
    palm_input: ModelInput,
    landmark_session: ort::session::Session,
    landmark_input: ModelInput,
    anchors: Vec<[f32; 2]>,
    max_hands: usize,
}

impl OnnxHandLandmarker {
    /// Load the palm detection and hand landmark models.
    pub fn new(palm_model: &Path, landmark_model: &Path) -> Result<Self, DetectorError> {
        let palm_session = build_session(palm_model)?;
        let landmark_session = build_session(landmark_model)?;
        let palm_input = ModelInput::read(&palm_session, PALM_INPUT_SIZE);
        let landmark_input = ModelInput::read(&landmark_session, LANDMARK_INPUT_SIZE);
        log::info!(
            "Loaded hand landmarker (palm input {}, landmark input {})",
            palm_input.size,
            landmark_input.size
        );

        Ok(Self {
            palm_session,
            palm_input,
            landmark_session,
            landmark_input,
            anchors: generate_anchors(),
            max_hands: MAX_HANDS,
        })
    }

    fn detect_palms(&mut self, frame: &Frame) -> Result<Vec<Palm>, DetectorError> {
        let (tensor, geometry) = letterbox(frame, self.palm_input.size, 0.0);
        let tensor = self.palm_input.layout(tensor);

        let (regressors, scores) = {
            let input_value = ort::value::Tensor::from_array(tensor)?;
            let outputs = self.palm_session.run(ort::inputs![input_value])?;
            let mut regressors: Option<Vec<f32>> = None;
            let mut scores: Option<Vec<f32>> = None;
            for i in 0..outputs.len() {
                let array = outputs[i].try_extract_array::<f32>()?;
                match array.shape().last() {
                    Some(&PALM_REGRESSOR_LEN) => regressors = Some(array.iter().copied().collect()),
                    Some(1) => scores = Some(array.iter().copied().collect()),
                    _ => {}
                }
            }
            match (regressors, scores) {
                (Some(r), Some(s)) => (r, s),
                _ => return Err("Palm model must output regressors and scores".into()),
            }
        };

        let size = self.palm_input.size as f64;
        let palms: Vec<Palm> = decode_palms(&regressors, &scores, &self.anchors)?
            .into_iter()
            .map(|palm| {
                // normalized letterbox coordinates → source pixels
                let to_source = |(x, y): (f64, f64)| geometry.to_source(x * size, y * size);
                let (x1, y1) = to_source((palm.bbox.x1, palm.bbox.y1));
                let (x2, y2) = to_source((palm.bbox.x2, palm.bbox.y2));
                Palm {
                    bbox: BoundingBox::new(x1, y1, x2, y2),
                    score: palm.score,
                    keypoints: palm.keypoints.map(to_source),
                }
            })
            .collect();

        let mut kept = nms(palms, PALM_NMS_IOU_THRESH);
        kept.truncate(self.max_hands);
        Ok(kept)
    }

    fn landmarks(
        &mut self,
        frame: &Frame,
        roi: &Roi,
    ) -> Result<Option<HandObservation>, DetectorError> {
        let size = self.landmark_input.size;
        let crop = self.landmark_input.layout(crop_roi(frame, roi, size));

        let input_value = ort::value::Tensor::from_array(crop)?;
        let outputs = self.landmark_session.run(ort::inputs![input_value])?;
        let mut raw_landmarks: Option<Vec<f32>> = None;
        let mut scalars = Vec::new();
        for i in 0..outputs.len() {
            let array = outputs[i].try_extract_array::<f32>()?;
            if array.len() >= NUM_LANDMARKS * 3 && raw_landmarks.is_none() {
                raw_landmarks = Some(array.iter().copied().collect());
            } else if array.len() == 1 {
                scalars.extend(array.iter().copied());
            }
        }
        let raw_landmarks = raw_landmarks.ok_or("Landmark model produced no keypoints")?;

        let presence = scalars.first().copied().map(as_probability).unwrap_or(1.0);
        if presence < PRESENCE_THRESH {
            return Ok(None);
        }
        let right = scalars.get(1).copied().map(as_probability).unwrap_or(0.0) as f64;
        let (handedness, score) = if right > 0.5 {
            (Handedness::Right, right)
        } else {
            (Handedness::Left, 1.0 - right)
        };

        Ok(Some(HandObservation {
            handedness,
            score,
            keypoints: project_landmarks(
                &raw_landmarks,
                roi,
                size,
                frame.width() as f64,
                frame.height() as f64,
            ),
        }))
    }
}

impl HandLandmarker for OnnxHandLandmarker {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<HandObservation>, DetectorError> {
        let rgb = frame.to_channel_order(ChannelOrder::Rgb);

        let palms = self.detect_palms(&rgb)?;
        let mut hands = Vec::with_capacity(palms.len());
        for palm in &palms {
            let roi = Roi::from_palm(palm);
            if let Some(hand) = self.landmarks(&rgb, &roi)? {
                hands.push(hand);
            }
        }
        Ok(hands)
    }
}

// ---------------------------------------------------------------------------
// Model inputs
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
struct ModelInput {
    size: u32,
    channels_first: bool,
}

impl ModelInput {
    /// Reads the square input size and layout from the first model input,
    /// accepting both `[N, C, H, W]` and `[N, H, W, C]`.
    fn read(session: &ort::session::Session, default_size: u32) -> Self {
        session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    if shape.len() != 4 {
                        return None;
                    }
                    let channels_first = is_channels_first(shape);
                    let h = if channels_first { shape[2] } else { shape[1] };
                    Some(Self {
                        size: if h > 0 { h as u32 } else { default_size },
                        channels_first,
                    })
                } else {
                    None
                }
            })
            .unwrap_or(Self {
                size: default_size,
                channels_first: true,
            })
    }

    fn layout(&self, nchw: Array4<f32>) -> Array4<f32> {
        if self.channels_first {
            nchw
        } else {
            to_nhwc(nchw)
        }
    }
}

// ---------------------------------------------------------------------------
// Palm decoding
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct Palm {
    bbox: BoundingBox,
    score: f64,
    keypoints: [(f64, f64); 7],
}

impl Scored for Palm {
    fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }
    fn score(&self) -> f64 {
        self.score
    }
}

/// Generate palm detector anchors.
///
/// Two feature map sizes, 24×24 and 12×12, with 2 and 6 anchors per cell.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)]; // (stride, anchors_per_cell)
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = PALM_INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }

    anchors
}

/// Decodes raw palm outputs into palms in normalized letterbox coordinates.
fn decode_palms(
    regressors: &[f32],
    scores: &[f32],
    anchors: &[[f32; 2]],
) -> Result<Vec<Palm>, DetectorError> {
    if regressors.len() != anchors.len() * PALM_REGRESSOR_LEN || scores.len() != anchors.len() {
        return Err(format!(
            "Palm outputs do not match {} anchors ({} regressors, {} scores)",
            anchors.len(),
            regressors.len(),
            scores.len()
        )
        .into());
    }

    let size = PALM_INPUT_SIZE as f32;
    let mut palms = Vec::new();
    for (i, &raw_score) in scores.iter().enumerate() {
        let score = sigmoid(raw_score.clamp(-100.0, 100.0));
        if score < PALM_SCORE_THRESH {
            continue;
        }

        let anchor = anchors[i];
        let reg = &regressors[i * PALM_REGRESSOR_LEN..(i + 1) * PALM_REGRESSOR_LEN];
        let cx = anchor[0] + reg[0] / size;
        let cy = anchor[1] + reg[1] / size;
        let w = reg[2] / size;
        let h = reg[3] / size;

        let mut keypoints = [(0.0, 0.0); 7];
        for (k, kp) in keypoints.iter_mut().enumerate() {
            *kp = (
                (anchor[0] + reg[4 + k * 2] / size) as f64,
                (anchor[1] + reg[4 + k * 2 + 1] / size) as f64,
            );
        }

        palms.push(Palm {
            bbox: BoundingBox::from_center(cx as f64, cy as f64, w as f64, h as f64),
            score: score as f64,
            keypoints,
        });
    }
    Ok(palms)
}

// ---------------------------------------------------------------------------
// Rotated region of interest
// ---------------------------------------------------------------------------

/// Square crop region in source pixels, rotated by `rotation` radians.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Roi {
    cx: f64,
    cy: f64,
    size: f64,
    rotation: f64,
}

impl Roi {
    /// Builds the hand ROI from a palm: oriented wrist → middle finger,
    /// shifted toward the fingers and expanded to a square.
    fn from_palm(palm: &Palm) -> Self {
        let (x0, y0) = palm.keypoints[WRIST_KEYPOINT];
        let (x1, y1) = palm.keypoints[MIDDLE_FINGER_KEYPOINT];
        let rotation = normalize_radians(PI / 2.0 - (-(y1 - y0)).atan2(x1 - x0));

        let (w, h) = (palm.bbox.width(), palm.bbox.height());
        let (cx, cy) = palm.bbox.center();
        let (sin, cos) = rotation.sin_cos();
        let x_shift = -h * ROI_SHIFT_Y * sin;
        let y_shift = h * ROI_SHIFT_Y * cos;

        Self {
            cx: cx + x_shift,
            cy: cy + y_shift,
            size: w.max(h) * ROI_SCALE,
            rotation,
        }
    }

    /// Maps a point in crop pixels (`0..input_size`) to source pixels.
    fn to_source(&self, u: f64, v: f64, input_size: u32) -> (f64, f64) {
        let dx = (u / input_size as f64 - 0.5) * self.size;
        let dy = (v / input_size as f64 - 0.5) * self.size;
        let (sin, cos) = self.rotation.sin_cos();
        (
            self.cx + dx * cos - dy * sin,
            self.cy + dx * sin + dy * cos,
        )
    }
}

fn normalize_radians(angle: f64) -> f64 {
    angle - 2.0 * PI * ((angle + PI) / (2.0 * PI)).floor()
}

/// Samples the rotated ROI into an `input_size` square NCHW tensor in
/// `[0, 1]`. Pixels outside the frame are black.
fn crop_roi(frame: &Frame, roi: &Roi, input_size: u32) -> Array4<f32> {
    let s = input_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, s, s));
    let src = frame.as_ndarray();
    let (fw, fh) = (frame.width() as f64, frame.height() as f64);

    for v in 0..s {
        for u in 0..s {
            let (x, y) = roi.to_source(u as f64 + 0.5, v as f64 + 0.5, input_size);
            if x < 0.0 || y < 0.0 || x >= fw || y >= fh {
                continue;
            }
            let (sx, sy) = (x as usize, y as usize);
            for c in 0..3 {
                tensor[[0, c, v, u]] = src[[sy, sx, c]] as f32 / 255.0;
            }
        }
    }
    tensor
}

/// Projects raw landmark output (x, y, z per keypoint in crop pixels) to
/// points normalized to the source frame.
fn project_landmarks(
    raw: &[f32],
    roi: &Roi,
    input_size: u32,
    frame_w: f64,
    frame_h: f64,
) -> Vec<Point> {
    raw.chunks_exact(3)
        .take(NUM_LANDMARKS)
        .map(|lm| {
            let (x, y) = roi.to_source(lm[0] as f64, lm[1] as f64, input_size);
            Point::new((x / frame_w).clamp(0.0, 1.0), (y / frame_h).clamp(0.0, 1.0))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
