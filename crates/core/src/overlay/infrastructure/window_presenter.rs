use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use minifb::{Key, KeyRepeat, Window, WindowOptions};

use crate::overlay::domain::frame_presenter::{FramePresenter, PresentError};
use crate::shared::frame::{ChannelOrder, Frame};

/// Shows frames in a native window sized to the camera resolution.
///
/// Escape, `q`, or closing the window raises the shared cancel flag; the
/// session loop observes it after the current frame.
pub struct WindowPresenter {
    title: String,
    window: Option<Window>,
    buffer: Vec<u32>,
    cancel: Arc<AtomicBool>,
}

impl WindowPresenter {
    pub fn new(title: &str, cancel: Arc<AtomicBool>) -> Self {
        Self {
            title: title.to_string(),
            window: None,
            buffer: Vec::new(),
            cancel,
        }
    }

    fn window_for(&mut self, width: usize, height: usize) -> Result<&mut Window, PresentError> {
        if self.window.is_none() {
            let options = WindowOptions {
                resize: true,
                ..WindowOptions::default()
            };
            let window = Window::new(&self.title, width, height, options)?;
            log::info!("Opened preview window {width}x{height}");
            self.window = Some(window);
        }
        self.window
            .as_mut()
            .ok_or_else(|| PresentError::from("preview window unavailable"))
    }
}

impl FramePresenter for WindowPresenter {
    fn present(&mut self, frame: &Frame) -> Result<(), PresentError> {
        if frame.channels() != 3 {
            return Err(format!("cannot display {}-channel frame", frame.channels()).into());
        }
        let (width, height) = (frame.width() as usize, frame.height() as usize);
        fill_argb(&mut self.buffer, frame);

        let cancel = Arc::clone(&self.cancel);
        let buffer = std::mem::take(&mut self.buffer);
        let window = self.window_for(width, height)?;
        let updated = window.update_with_buffer(&buffer, width, height);
        let quit = !window.is_open()
            || window.is_key_down(Key::Escape)
            || window.is_key_pressed(Key::Q, KeyRepeat::No);
        self.buffer = buffer;
        updated?;

        if quit {
            log::info!("Stop requested from preview window");
            cancel.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.window.take().is_some() {
            log::debug!("Closed preview window");
        }
    }
}

/// Packs 3-channel pixels into minifb's `0RGB` words.
fn fill_argb(buffer: &mut Vec<u32>, frame: &Frame) {
    let (r, b) = match frame.channel_order() {
        ChannelOrder::Rgb => (0, 2),
        ChannelOrder::Bgr => (2, 0),
    };
    buffer.clear();
    buffer.extend(
        frame
            .data()
            .chunks_exact(3)
            .map(|px| (px[r] as u32) << 16 | (px[1] as u32) << 8 | px[b] as u32),
    );
}
