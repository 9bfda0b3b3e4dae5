pub mod camera_factory;
pub mod ffmpeg_camera;
pub mod pixel_format;
#[cfg(feature = "pylon")]
pub mod pylon_camera;
