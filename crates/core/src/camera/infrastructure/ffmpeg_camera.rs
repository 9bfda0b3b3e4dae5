use std::ffi::CString;
use std::ptr;
use std::time::{Duration, Instant};

use ffmpeg_next::ffi;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video;

use crate::camera::domain::camera_source::{
    require_state, Acquired, CameraError, CameraSource, CameraState,
};
use crate::shared::camera_info::{CameraBackend, CameraInfo};
use crate::shared::constants::DEFAULT_GENERIC_FPS;
use crate::shared::frame::Frame;

/// Generic system camera read through libavdevice (v4l2 on Linux,
/// avfoundation on macOS).
///
/// Decoded frames are converted to RGB24. Resolution and frame rate are
/// whatever the device reports.
pub struct FfmpegCamera {
    device: Option<CaptureDevice>,
    info: Option<CameraInfo>,
    state: CameraState,
    frame_index: usize,
}

// Safety: FfmpegCamera is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegCamera {}

struct CaptureDevice {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: Option<(scaling::Context, (Pixel, u32, u32))>,
    stream_index: usize,
    drained: bool,
}

impl FfmpegCamera {
    pub fn new() -> Self {
        Self {
            device: None,
            info: None,
            state: CameraState::Closed,
            frame_index: 0,
        }
    }
}

impl Default for FfmpegCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraSource for FfmpegCamera {
    fn open(&mut self, index: usize) -> Result<CameraInfo, CameraError> {
        require_state(self.state, CameraState::Closed)?;
        let unavailable = |reason: String| CameraError::CameraUnavailable { index, reason };

        ffmpeg_next::init().map_err(|e| unavailable(e.to_string()))?;
        ffmpeg_next::device::register_all();

        let (format, url) = capture_input(index)
            .ok_or_else(|| unavailable("no capture device support on this platform".into()))?;
        log::debug!("Opening {url} with input format {}", format.name());

        let ictx = open_nonblocking(&url, &format).map_err(|e| unavailable(e.to_string()))?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| unavailable("device has no video stream".into()))?;
        let stream_index = stream.index();
        let fps = rational_fps(stream.avg_frame_rate())
            .or_else(|| rational_fps(stream.rate()))
            .unwrap_or(DEFAULT_GENERIC_FPS);

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| unavailable(e.to_string()))?;
        let decoder = codec_ctx
            .decoder()
            .video()
            .map_err(|e| unavailable(e.to_string()))?;

        let info = CameraInfo {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            backend: CameraBackend::Generic,
            device: url,
        };
        log::info!(
            "Opened {} ({}x{} @ {:.1} fps)",
            info.device,
            info.width,
            info.height,
            info.fps
        );

        self.device = Some(CaptureDevice {
            ictx,
            decoder,
            scaler: None,
            stream_index,
            drained: false,
        });
        self.info = Some(info.clone());
        self.state = CameraState::Open;
        self.frame_index = 0;
        Ok(info)
    }

    fn start(&mut self) -> Result<(), CameraError> {
        match self.state {
            CameraState::Open | CameraState::Stopped => {
                self.state = CameraState::Grabbing;
                Ok(())
            }
            state => Err(CameraError::InvalidState {
                state,
                expected: CameraState::Open,
            }),
        }
    }

    fn next_frame(&mut self, timeout: Duration) -> Result<Acquired, CameraError> {
        require_state(self.state, CameraState::Grabbing)?;
        let device = self.device.as_mut().ok_or(CameraError::InvalidState {
            state: CameraState::Closed,
            expected: CameraState::Grabbing,
        })?;

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = device.receive(self.frame_index)? {
                self.frame_index += 1;
                return Ok(Acquired::Frame(frame));
            }
            if device.drained {
                return Ok(Acquired::EndOfStream);
            }
            if Instant::now() >= deadline {
                return Err(CameraError::GrabTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }

            let mut packet = ffmpeg_next::Packet::empty();
            match classify_read(packet.read(&mut device.ictx)) {
                ReadOutcome::Packet => {
                    if packet.stream() != device.stream_index {
                        continue;
                    }
                    if let Err(e) = device.decoder.send_packet(&packet) {
                        log::debug!("Dropping undecodable packet: {e}");
                    }
                }
                ReadOutcome::EndOfStream => {
                    let _ = device.decoder.send_eof();
                    device.drained = true;
                }
                ReadOutcome::WouldBlock => std::thread::sleep(POLL_INTERVAL),
                ReadOutcome::Failed(message) => return Err(CameraError::GrabFailed(message)),
            }
        }
    }

    fn stop(&mut self) {
        if self.state == CameraState::Grabbing {
            self.state = CameraState::Stopped;
        }
    }

    fn close(&mut self) {
        if self.device.take().is_some() {
            log::debug!("Released capture device");
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

impl CaptureDevice {
    fn receive(&mut self, index: usize) -> Result<Option<Frame>, CameraError> {
        let mut decoded = Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let (width, height) = (decoded.width(), decoded.height());
        let key = (decoded.format(), width, height);
        if self.scaler.as_ref().map(|(_, k)| *k) != Some(key) {
            let ctx = scaling::Context::get(
                decoded.format(),
                width,
                height,
                Pixel::RGB24,
                width,
                height,
                scaling::Flags::BILINEAR,
            )
            .map_err(|e| CameraError::GrabFailed(e.to_string()))?;
            self.scaler = Some((ctx, key));
        }
        let Some((scaler, _)) = self.scaler.as_mut() else {
            return Ok(None);
        };

        let mut rgb_frame = Video::empty();
        scaler
            .run(&decoded, &mut rgb_frame)
            .map_err(|e| CameraError::GrabFailed(e.to_string()))?;

        let pixels = extract_rgb_pixels(&rgb_frame, width, height);
        Ok(Some(Frame::new(pixels, width, height, 3, index)))
    }
}

/// Sleep between reads while a non-blocking device has no packet ready.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, PartialEq, Eq)]
enum ReadOutcome {
    Packet,
    EndOfStream,
    WouldBlock,
    Failed(String),
}

fn classify_read(result: Result<(), ffmpeg_next::Error>) -> ReadOutcome {
    match result {
        Ok(()) => ReadOutcome::Packet,
        Err(ffmpeg_next::Error::Eof) => ReadOutcome::EndOfStream,
        Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
            ReadOutcome::WouldBlock
        }
        Err(e) => ReadOutcome::Failed(e.to_string()),
    }
}

/// Opens the capture device with `AVFMT_FLAG_NONBLOCK` set before
/// `avformat_open_input`, so demuxers such as v4l2 open the device
/// non-blocking and reads return `EAGAIN` instead of waiting on a stalled
/// device.
fn open_nonblocking(
    url: &str,
    format: &ffmpeg_next::format::format::Input,
) -> Result<ffmpeg_next::format::context::Input, ffmpeg_next::Error> {
    let path = CString::new(url).map_err(|_| ffmpeg_next::Error::InvalidData)?;
    unsafe {
        let mut ps = ffi::avformat_alloc_context();
        if ps.is_null() {
            return Err(ffmpeg_next::Error::Other {
                errno: ffmpeg_next::util::error::ENOMEM,
            });
        }
        (*ps).flags |= ffi::AVFMT_FLAG_NONBLOCK as std::os::raw::c_int;

        // avformat_open_input frees the context on failure.
        let ret = ffi::avformat_open_input(&mut ps, path.as_ptr(), format.as_ptr() as _, ptr::null_mut());
        if ret < 0 {
            return Err(ffmpeg_next::Error::from(ret));
        }
        let ret = ffi::avformat_find_stream_info(ps, ptr::null_mut());
        if ret < 0 {
            ffi::avformat_close_input(&mut ps);
            return Err(ffmpeg_next::Error::from(ret));
        }
        Ok(ffmpeg_next::format::context::Input::wrap(ps))
    }
}

/// Capture input format and device URL for camera `index` on this platform.
fn capture_input(index: usize) -> Option<(ffmpeg_next::format::format::Input, String)> {
    let (names, url): (&[&str], String) = if cfg!(target_os = "linux") {
        (&["video4linux2", "v4l2"], format!("/dev/video{index}"))
    } else if cfg!(target_os = "macos") {
        (&["avfoundation"], format!("{index}:none"))
    } else {
        return None;
    };

    ffmpeg_next::device::input::video()
        .find(|format| format.name().split(',').any(|n| names.contains(&n)))
        .map(|format| (format, url))
}

fn rational_fps(rate: ffmpeg_next::Rational) -> Option<f64> {
    if rate.numerator() > 0 && rate.denominator() > 0 {
        Some(rate.numerator() as f64 / rate.denominator() as f64)
    } else {
        None
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer.
///
/// ffmpeg frames may have padding bytes at the end of each row (stride > width*3).
fn extract_rgb_pixels(rgb_frame: &Video, width: u32, height: u32) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_bytes = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + row_bytes]);
    }
    pixels
}
