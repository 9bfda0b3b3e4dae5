use ndarray::Array4;

use crate::shared::frame::Frame;

/// Geometry of a letterbox resize, used to map model coordinates back onto
/// the source frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f64,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    /// Maps a point in model-input pixels to source-frame pixels.
    pub fn to_source(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }
}

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Aspect ratio is preserved and the borders are filled with `pad_value`.
/// Returns an NCHW float32 tensor normalized to `[0, 1]` and the geometry
/// needed to undo the transform.
pub fn letterbox(frame: &Frame, target_size: u32, pad_value: f32) -> (Array4<f32>, Letterbox) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).clamp(1, target_size);
    let new_h = ((fh * scale).round() as u32).clamp(1, target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let mut tensor = Array4::<f32>::from_elem(
        (1, 3, target_size as usize, target_size as usize),
        pad_value,
    );

    let src = frame.as_ndarray(); // [H, W, C] u8
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbor resize + copy into padded region
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, Letterbox { scale, pad_x, pad_y })
}

/// Reorders an NCHW tensor to NHWC for models that take channels last.
pub fn to_nhwc(tensor: Array4<f32>) -> Array4<f32> {
    tensor.permuted_axes([0, 2, 3, 1]).as_standard_layout().to_owned()
}

/// True if a model input shape `[N, C, H, W]` is channels-first.
pub fn is_channels_first(shape: &[i64]) -> bool {
    shape.len() == 4 && shape[1] == 3
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_letterbox_preserves_aspect_ratio() {
        // scale = min(640/200, 640/100) = 3.2 → 640x320, pad_y = 160
        let frame = Frame::new(vec![128u8; 200 * 100 * 3], 200, 100, 3, 0);
        let (tensor, lb) = letterbox(&frame, 640, 114.0 / 255.0);

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_relative_eq!(lb.scale, 3.2, epsilon = 1e-9);
        assert_eq!(lb.pad_x, 0);
        assert_eq!(lb.pad_y, 160);
    }

    #[test]
    fn test_letterbox_values_and_padding() {
        let frame = Frame::new(vec![255u8; 100 * 50 * 3], 100, 50, 3, 0);
        let (tensor, lb) = letterbox(&frame, 640, 114.0 / 255.0);

        let (y, x) = (lb.pad_y as usize + 1, lb.pad_x as usize + 1);
        assert!((tensor[[0, 0, y, x]] - 1.0).abs() < 0.01);
        assert!((tensor[[0, 0, 0, 0]] - 114.0 / 255.0).abs() < 0.01);
    }

    #[test]
    fn test_to_source_inverts_letterbox() {
        let frame = Frame::new(vec![0u8; 320 * 240 * 3], 320, 240, 3, 0);
        let (_, lb) = letterbox(&frame, 640, 0.0);
        // scale 2.0, 640x480 content, pad_y 80
        let (x, y) = lb.to_source(100.0 * 2.0, 50.0 * 2.0 + 80.0);
        assert_relative_eq!(x, 100.0, epsilon = 1e-9);
        assert_relative_eq!(y, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_to_nhwc_moves_channels_last() {
        let frame = Frame::new(vec![10, 20, 30], 1, 1, 3, 0);
        let (tensor, _) = letterbox(&frame, 2, 0.0);
        let nhwc = to_nhwc(tensor);
        assert_eq!(nhwc.shape(), &[1, 2, 2, 3]);
        assert!(nhwc.as_slice().is_some());
        assert!((nhwc[[0, 0, 0, 2]] - 30.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_is_channels_first() {
        assert!(is_channels_first(&[1, 3, 192, 192]));
        assert!(!is_channels_first(&[1, 192, 192, 3]));
    }
}
