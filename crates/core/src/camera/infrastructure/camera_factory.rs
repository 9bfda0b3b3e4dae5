use crate::camera::domain::camera_source::{CameraError, CameraSource};
use crate::shared::camera_info::CameraBackend;
use crate::shared::settings::BackendPreference;

use super::ffmpeg_camera::FfmpegCamera;

/// Creates the camera for `preference`, probing for industrial cameras once.
///
/// `Auto` prefers the industrial backend when the SDK is compiled in and
/// reports at least one device, and otherwise falls back to the generic
/// capture device. Logs which backend is selected.
pub fn create_camera(preference: BackendPreference) -> Result<Box<dyn CameraSource>, CameraError> {
    let probed = match preference {
        BackendPreference::Generic => false,
        _ => industrial_available(),
    };
    let backend = select_backend(preference, probed)?;
    log::info!("Using {backend} camera backend");

    match backend {
        CameraBackend::Generic => Ok(Box::new(FfmpegCamera::new())),
        CameraBackend::Industrial => industrial_camera(),
    }
}

/// Decides the backend from the preference and the probe result.
pub fn select_backend(
    preference: BackendPreference,
    industrial_probed: bool,
) -> Result<CameraBackend, CameraError> {
    match preference {
        BackendPreference::Generic => Ok(CameraBackend::Generic),
        BackendPreference::Industrial if industrial_probed => Ok(CameraBackend::Industrial),
        BackendPreference::Industrial => Err(CameraError::NoDeviceFound),
        BackendPreference::Auto if industrial_probed => Ok(CameraBackend::Industrial),
        BackendPreference::Auto => {
            log::info!("No industrial camera available, falling back to generic capture");
            Ok(CameraBackend::Generic)
        }
    }
}

/// Returns true if the industrial SDK is compiled in and sees a device.
pub fn industrial_available() -> bool {
    #[cfg(feature = "pylon")]
    {
        super::pylon_camera::count_devices().is_some_and(|count| count > 0)
    }
    #[cfg(not(feature = "pylon"))]
    {
        log::debug!("Built without industrial camera support");
        false
    }
}

#[cfg(feature = "pylon")]
fn industrial_camera() -> Result<Box<dyn CameraSource>, CameraError> {
    Ok(Box::new(super::pylon_camera::PylonCamera::new()))
}

#[cfg(not(feature = "pylon"))]
fn industrial_camera() -> Result<Box<dyn CameraSource>, CameraError> {
    Err(CameraError::NoDeviceFound)
}
