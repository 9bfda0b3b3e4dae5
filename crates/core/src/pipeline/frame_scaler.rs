use std::borrow::Cow;

use image::imageops::{self, FilterType};
use thiserror::Error;

use crate::shared::frame::Frame;

/// Bounded-resolution view of a frame for inference.
///
/// Borrows the original when no downscale was needed. `scale` is the
/// factor from original to working pixels and never exceeds 1.
#[derive(Debug)]
pub struct WorkingFrame<'a> {
    pub frame: Cow<'a, Frame>,
    pub scale: f64,
}

impl WorkingFrame<'_> {
    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    pub fn is_downscaled(&self) -> bool {
        matches!(self.frame, Cow::Owned(_))
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScaleError {
    #[error("cannot downscale {width}x{height} frame with {channels} channels")]
    UnsupportedChannels { width: u32, height: u32, channels: u8 },
}

/// Scale factor that fits `width x height` inside the bounds, capped at 1.
pub fn scale_factor(width: u32, height: u32, max_width: u32, max_height: u32) -> f64 {
    let sw = max_width as f64 / width.max(1) as f64;
    let sh = max_height as f64 / height.max(1) as f64;
    sw.min(sh).min(1.0)
}

/// Produces the working frame: aspect ratio kept, both sides within the
/// bounds, linear filtering, at least one pixel per side.
///
/// Oversized frames that are not 3-channel cannot be resized and are
/// rejected rather than passed through unbounded.
pub fn scale(frame: &Frame, max_width: u32, max_height: u32) -> Result<WorkingFrame<'_>, ScaleError> {
    let factor = scale_factor(frame.width(), frame.height(), max_width, max_height);
    if factor >= 1.0 {
        return Ok(WorkingFrame {
            frame: Cow::Borrowed(frame),
            scale: 1.0,
        });
    }

    let image = frame.as_image().ok_or(ScaleError::UnsupportedChannels {
        width: frame.width(),
        height: frame.height(),
        channels: frame.channels(),
    })?;

    let new_w = ((frame.width() as f64 * factor).floor() as u32).max(1);
    let new_h = ((frame.height() as f64 * factor).floor() as u32).max(1);
    let resized = imageops::resize(&image, new_w, new_h, FilterType::Triangle);

    Ok(WorkingFrame {
        frame: Cow::Owned(Frame::from_image(
            resized,
            frame.channel_order(),
            frame.index(),
        )),
        scale: factor,
    })
}
