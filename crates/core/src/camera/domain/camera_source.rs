use std::time::Duration;

use thiserror::Error;

use crate::shared::camera_info::CameraInfo;
use crate::shared::frame::Frame;

/// Lifecycle of a camera handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraState {
    Closed,
    Open,
    Grabbing,
    Stopped,
}

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no industrial camera found")]
    NoDeviceFound,
    #[error("could not open camera {index}: {reason}")]
    CameraUnavailable { index: usize, reason: String },
    #[error("grab timed out after {timeout_ms} ms")]
    GrabTimeout { timeout_ms: u64 },
    #[error("grab failed: {0}")]
    GrabFailed(String),
    #[error("camera is {state:?}, expected {expected:?}")]
    InvalidState {
        state: CameraState,
        expected: CameraState,
    },
}

impl CameraError {
    /// True for errors that mean no usable device exists, as opposed to a
    /// device that failed mid-stream.
    pub fn is_device_unavailable(&self) -> bool {
        matches!(
            self,
            CameraError::NoDeviceFound | CameraError::CameraUnavailable { .. }
        )
    }
}

/// Result of a successful acquisition call.
#[derive(Debug)]
pub enum Acquired {
    Frame(Frame),
    /// The device stopped producing frames. A normal termination signal.
    EndOfStream,
}

/// Uniform contract over camera backends.
///
/// Call order is `open → start → next_frame* → stop → close`. `close` must
/// be safe to call in any state, including after a failed grab, and must
/// release the device.
pub trait CameraSource: Send {
    fn open(&mut self, index: usize) -> Result<CameraInfo, CameraError>;

    fn start(&mut self) -> Result<(), CameraError>;

    /// Blocks for at most `timeout` waiting for the next frame.
    fn next_frame(&mut self, timeout: Duration) -> Result<Acquired, CameraError>;

    fn stop(&mut self);

    fn close(&mut self);

    fn state(&self) -> CameraState;

    /// Stream properties, available once open.
    fn info(&self) -> Option<&CameraInfo>;
}

/// Returns `InvalidState` unless `state` equals `expected`.
pub fn require_state(state: CameraState, expected: CameraState) -> Result<(), CameraError> {
    if state == expected {
        Ok(())
    } else {
        Err(CameraError::InvalidState { state, expected })
    }
}
