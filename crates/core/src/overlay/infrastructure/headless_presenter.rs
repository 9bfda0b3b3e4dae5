use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::overlay::domain::frame_presenter::{FramePresenter, PresentError};
use crate::shared::frame::Frame;

/// Presenter for runs without a display. Counts frames and can request a
/// stop once a frame budget is reached.
pub struct HeadlessPresenter {
    presented: usize,
    limit: Option<(usize, Arc<AtomicBool>)>,
}

impl HeadlessPresenter {
    pub fn new() -> Self {
        Self {
            presented: 0,
            limit: None,
        }
    }

    /// Raises `cancel` after `frames` frames have been presented.
    pub fn stop_after(mut self, frames: usize, cancel: Arc<AtomicBool>) -> Self {
        self.limit = Some((frames, cancel));
        self
    }

    pub fn presented(&self) -> usize {
        self.presented
    }
}

impl Default for HeadlessPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl FramePresenter for HeadlessPresenter {
    fn present(&mut self, _frame: &Frame) -> Result<(), PresentError> {
        self.presented += 1;
        if let Some((limit, cancel)) = &self.limit {
            if self.presented >= *limit {
                cancel.store(true, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        log::debug!("Headless presenter closed after {} frames", self.presented);
    }
}
