use std::fmt;

/// Which acquisition backend produced a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraBackend {
    /// Basler pylon industrial camera.
    Industrial,
    /// System capture device (v4l2 / avfoundation) through libavdevice.
    Generic,
}

impl fmt::Display for CameraBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraBackend::Industrial => write!(f, "industrial"),
            CameraBackend::Generic => write!(f, "generic"),
        }
    }
}

/// Stream properties reported by a camera once it is open.
///
/// `fps` is the effective rate callers should use for encoding and timing.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub backend: CameraBackend,
    pub device: String,
}
