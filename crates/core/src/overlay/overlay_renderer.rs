use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::detection::domain::hand_landmarker::HAND_CONNECTIONS;
use crate::pipeline::coordinate_remapper::{RemappedDetection, RemappedHand};
use crate::shared::frame::{ChannelOrder, Frame};

use super::glyphs::{draw_text, text_height};

/// Overlay colors, given in RGB.
pub const BOX_COLOR: [u8; 3] = [0, 255, 0];
pub const KEYPOINT_COLOR: [u8; 3] = [255, 255, 0];
pub const CONNECTION_COLOR: [u8; 3] = [0, 255, 255];
pub const HAND_LABEL_COLOR: [u8; 3] = [255, 255, 0];

const KEYPOINT_RADIUS: i32 = 3;
const BOX_LABEL_SCALE: u32 = 2;
const HAND_LABEL_SCALE: u32 = 3;
const HAND_LABEL_POSITION: (i32, i32) = (10, 10);
/// Gap between a box's top edge and its label.
const LABEL_GAP: i32 = 4;

/// Draws detections and hand skeletons onto full-resolution frames.
#[derive(Debug, Default)]
pub struct OverlayRenderer;

impl OverlayRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Draws everything in place. Frames that are not 3-channel are left
    /// untouched.
    pub fn render(&self, frame: &mut Frame, detections: &[RemappedDetection], hands: &[RemappedHand]) {
        if detections.is_empty() && hands.is_empty() {
            return;
        }
        let palette = Palette::for_order(frame.channel_order());
        let drawn = frame.with_image_mut(|image| {
            for detection in detections {
                draw_detection(image, detection, &palette);
            }
            for hand in hands {
                draw_hand(image, hand, &palette);
            }
            // Only the last hand's label stays visible at the fixed position.
            if let Some(hand) = hands.last() {
                let (x, y) = HAND_LABEL_POSITION;
                draw_text(
                    image,
                    x,
                    y,
                    HAND_LABEL_SCALE,
                    palette.hand_label,
                    &format!("{} Hand", hand.handedness),
                );
            }
        });
        if drawn.is_none() {
            log::debug!("Skipping overlay for {}-channel frame", frame.channels());
        }
    }
}

/// Overlay colors converted to the frame's byte order.
struct Palette {
    bbox: Rgb<u8>,
    keypoint: Rgb<u8>,
    connection: Rgb<u8>,
    hand_label: Rgb<u8>,
}

impl Palette {
    fn for_order(order: ChannelOrder) -> Self {
        let convert = |[r, g, b]: [u8; 3]| match order {
            ChannelOrder::Rgb => Rgb([r, g, b]),
            ChannelOrder::Bgr => Rgb([b, g, r]),
        };
        Self {
            bbox: convert(BOX_COLOR),
            keypoint: convert(KEYPOINT_COLOR),
            connection: convert(CONNECTION_COLOR),
            hand_label: convert(HAND_LABEL_COLOR),
        }
    }
}

fn draw_detection(image: &mut RgbImage, detection: &RemappedDetection, palette: &Palette) {
    let (x1, y1, x2, y2) = detection.bbox.to_pixels();
    let (w, h) = ((x2 - x1).max(0) as u32, (y2 - y1).max(0) as u32);

    // 2 px border: outer rectangle plus one inset by a pixel
    if w >= 1 && h >= 1 {
        draw_hollow_rect_mut(image, Rect::at(x1, y1).of_size(w, h), palette.bbox);
    }
    if w >= 3 && h >= 3 {
        draw_hollow_rect_mut(image, Rect::at(x1 + 1, y1 + 1).of_size(w - 2, h - 2), palette.bbox);
    }

    let label = format!("{} {:.2}", detection.label, detection.confidence);
    let mut label_y = y1 - LABEL_GAP - text_height(BOX_LABEL_SCALE) as i32;
    if label_y < 0 {
        label_y = y1 + 2;
    }
    draw_text(image, x1, label_y, BOX_LABEL_SCALE, palette.bbox, &label);
}

fn draw_hand(image: &mut RgbImage, hand: &RemappedHand, palette: &Palette) {
    for &(a, b) in HAND_CONNECTIONS.iter() {
        let (Some(p0), Some(p1)) = (hand.keypoints.get(a), hand.keypoints.get(b)) else {
            continue;
        };
        draw_thick_line(
            image,
            (p0.x as f32, p0.y as f32),
            (p1.x as f32, p1.y as f32),
            palette.connection,
        );
    }
    for point in &hand.keypoints {
        draw_filled_circle_mut(image, point.to_pixel(), KEYPOINT_RADIUS, palette.keypoint);
    }
}

/// 2 px line: the segment plus a copy offset across its minor axis.
fn draw_thick_line(image: &mut RgbImage, start: (f32, f32), end: (f32, f32), color: Rgb<u8>) {
    draw_line_segment_mut(image, start, end, color);
    let (dx, dy) = ((end.0 - start.0).abs(), (end.1 - start.1).abs());
    let (ox, oy) = if dx >= dy { (0.0, 1.0) } else { (1.0, 0.0) };
    draw_line_segment_mut(
        image,
        (start.0 + ox, start.1 + oy),
        (end.0 + ox, end.1 + oy),
        color,
    );
}
