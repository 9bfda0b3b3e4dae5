use crate::shared::frame::Frame;

pub type PresentError = Box<dyn std::error::Error + Send + Sync>;

/// Displays annotated frames.
///
/// Presenters do not decide when the session stops; a window presenter
/// reports a quit request through the session's cancellation flag.
pub trait FramePresenter {
    fn present(&mut self, frame: &Frame) -> Result<(), PresentError>;

    /// Releases display resources. Safe to call more than once.
    fn close(&mut self);
}
