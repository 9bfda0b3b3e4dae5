use std::time::Duration;

use pylon_cxx::{GrabOptions, GrabResult, InstantCamera, NodeMap, Pylon, TimeoutHandling, TlFactory};

use crate::camera::domain::camera_source::{
    require_state, Acquired, CameraError, CameraSource, CameraState,
};
use crate::camera::infrastructure::pixel_format::{self, PixelFormat};
use crate::shared::camera_info::{CameraBackend, CameraInfo};
use crate::shared::constants::DEFAULT_INDUSTRIAL_FPS;
use crate::shared::frame::Frame;

/// Basler industrial camera driven through the pylon SDK.
///
/// The sensor is configured for its full area. Frames arrive in the
/// camera's native pixel format and are converted to RGB.
pub struct PylonCamera {
    runtime: &'static Pylon,
    camera: Option<InstantCamera<'static>>,
    grab_result: Option<GrabResult>,
    pixel_format: PixelFormat,
    info: Option<CameraInfo>,
    state: CameraState,
    frame_index: usize,
}

// Safety: the camera handle is only driven from the thread that owns the
// PylonCamera; pylon handles are not shared.
unsafe impl Send for PylonCamera {}

/// Returns the number of attached industrial cameras, or `None` when the
/// SDK reports an error.
pub fn count_devices() -> Option<usize> {
    let pylon = Pylon::new();
    let count = TlFactory::instance(&pylon)
        .enumerate_devices()
        .map(|devices| devices.len())
        .ok();
    count
}

impl PylonCamera {
    pub fn new() -> Self {
        // Cameras borrow the runtime for their whole life; one runtime is
        // leaked per camera and lives until process exit.
        let runtime: &'static Pylon = Box::leak(Box::new(Pylon::new()));
        Self {
            runtime,
            camera: None,
            grab_result: None,
            pixel_format: PixelFormat::Rgb8,
            info: None,
            state: CameraState::Closed,
            frame_index: 0,
        }
    }
}

impl Default for PylonCamera {
    fn default() -> Self {
        Self::new()
    }
}

fn unavailable(index: usize, e: impl std::fmt::Display) -> CameraError {
    CameraError::CameraUnavailable {
        index,
        reason: e.to_string(),
    }
}

impl CameraSource for PylonCamera {
    fn open(&mut self, index: usize) -> Result<CameraInfo, CameraError> {
        require_state(self.state, CameraState::Closed)?;

        let factory = TlFactory::instance(self.runtime);
        let devices = factory
            .enumerate_devices()
            .map_err(|e| unavailable(index, e))?;
        log::info!("Detected {} industrial camera(s)", devices.len());
        if devices.is_empty() {
            return Err(CameraError::NoDeviceFound);
        }
        let chosen = index.min(devices.len() - 1);
        if chosen != index {
            log::warn!("Camera index {index} out of range, using {chosen}");
        }

        let camera = factory
            .create_device(&devices[chosen])
            .map_err(|e| unavailable(chosen, e))?;
        camera.open().map_err(|e| unavailable(chosen, e))?;

        let (width, height) = match configure_full_sensor(&camera) {
            Ok(size) => size,
            Err(e) => {
                let _ = camera.close();
                return Err(unavailable(chosen, e));
            }
        };

        let native_format = camera
            .enum_node("PixelFormat")
            .and_then(|node| node.value())
            .unwrap_or_default();
        let Some(format) = PixelFormat::from_genicam(&native_format) else {
            let _ = camera.close();
            return Err(unavailable(
                chosen,
                format!("unsupported pixel format {native_format:?}"),
            ));
        };

        let fps = camera
            .float_node("ResultingFrameRate")
            .and_then(|node| node.value())
            .ok()
            .filter(|fps| *fps > 0.0)
            .unwrap_or(DEFAULT_INDUSTRIAL_FPS);

        let device = camera
            .device_info()
            .model_name()
            .unwrap_or_else(|_| format!("industrial camera {chosen}"));
        let info = CameraInfo {
            width,
            height,
            fps,
            backend: CameraBackend::Industrial,
            device,
        };
        log::info!(
            "Opened {} ({}x{} {native_format} @ {:.1} fps)",
            info.device,
            info.width,
            info.height,
            info.fps
        );

        self.grab_result = Some(GrabResult::new().map_err(|e| unavailable(chosen, e))?);
        self.camera = Some(camera);
        self.pixel_format = format;
        self.info = Some(info.clone());
        self.state = CameraState::Open;
        self.frame_index = 0;
        Ok(info)
    }

    fn start(&mut self) -> Result<(), CameraError> {
        if !matches!(self.state, CameraState::Open | CameraState::Stopped) {
            return Err(CameraError::InvalidState {
                state: self.state,
                expected: CameraState::Open,
            });
        }
        let camera = self.camera.as_ref().ok_or(CameraError::InvalidState {
            state: CameraState::Closed,
            expected: CameraState::Open,
        })?;
        camera
            .start_grabbing(&GrabOptions::default())
            .map_err(|e| CameraError::GrabFailed(e.to_string()))?;
        self.state = CameraState::Grabbing;
        Ok(())
    }

    fn next_frame(&mut self, timeout: Duration) -> Result<Acquired, CameraError> {
        require_state(self.state, CameraState::Grabbing)?;
        let (Some(camera), Some(grab_result)) = (self.camera.as_ref(), self.grab_result.as_mut())
        else {
            return Err(CameraError::InvalidState {
                state: CameraState::Closed,
                expected: CameraState::Grabbing,
            });
        };

        if !camera.is_grabbing() {
            return Ok(Acquired::EndOfStream);
        }

        let timeout_ms = timeout.as_millis().min(u32::MAX as u128) as u32;
        let ready = camera
            .retrieve_result(timeout_ms, grab_result, TimeoutHandling::Return)
            .map_err(|e| CameraError::GrabFailed(e.to_string()))?;
        if !ready {
            return Err(CameraError::GrabTimeout {
                timeout_ms: timeout_ms as u64,
            });
        }

        let succeeded = grab_result
            .grab_succeeded()
            .map_err(|e| CameraError::GrabFailed(e.to_string()))?;
        if !succeeded {
            let reason = grab_result
                .error_description()
                .unwrap_or_else(|e| e.to_string());
            return Err(CameraError::GrabFailed(reason));
        }

        let width = grab_result
            .width()
            .map_err(|e| CameraError::GrabFailed(e.to_string()))?;
        let height = grab_result
            .height()
            .map_err(|e| CameraError::GrabFailed(e.to_string()))?;
        let buffer = grab_result
            .buffer()
            .map_err(|e| CameraError::GrabFailed(e.to_string()))?;
        let rgb = pixel_format::to_rgb(buffer, width, height, self.pixel_format)
            .map_err(CameraError::GrabFailed)?;

        let frame = Frame::new(rgb, width, height, 3, self.frame_index);
        self.frame_index += 1;
        Ok(Acquired::Frame(frame))
    }

    fn stop(&mut self) {
        if let Some(camera) = &self.camera {
            if camera.is_grabbing() {
                if let Err(e) = camera.stop_grabbing() {
                    log::warn!("Failed to stop grabbing: {e}");
                }
            }
        }
        if self.state == CameraState::Grabbing {
            self.state = CameraState::Stopped;
        }
    }

    fn close(&mut self) {
        self.stop();
        self.grab_result = None;
        if let Some(camera) = self.camera.take() {
            if let Err(e) = camera.close() {
                log::warn!("Failed to close industrial camera: {e}");
            }
            log::debug!("Released industrial camera");
        }
        self.state = CameraState::Closed;
    }

    fn state(&self) -> CameraState {
        self.state
    }

    fn info(&self) -> Option<&CameraInfo> {
        self.info.as_ref()
    }
}

impl Drop for PylonCamera {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sets the region of interest to the whole sensor and returns its size.
fn configure_full_sensor(camera: &InstantCamera<'_>) -> Result<(u32, u32), pylon_cxx::PylonError> {
    let mut width_node = camera.integer_node("Width")?;
    let max_width = width_node.max()?;
    width_node.set_value(max_width)?;

    let mut height_node = camera.integer_node("Height")?;
    let max_height = height_node.max()?;
    height_node.set_value(max_height)?;

    Ok((width_node.value()? as u32, height_node.value()? as u32))
}
