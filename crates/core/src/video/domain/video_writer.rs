use std::path::Path;

use crate::shared::camera_info::CameraInfo;
use crate::shared::frame::Frame;

pub type WriterError = Box<dyn std::error::Error + Send + Sync>;

/// Abstracts video encoding so the session can record without depending on
/// a specific codec library.
pub trait VideoWriter: Send {
    /// Prepares an output at `path` sized and timed from the camera stream.
    fn open(&mut self, path: &Path, info: &CameraInfo) -> Result<(), WriterError>;

    fn write(&mut self, frame: &Frame) -> Result<(), WriterError>;

    /// Flushes pending packets and finalizes the container. Safe to call
    /// more than once.
    fn close(&mut self) -> Result<(), WriterError>;
}
