use std::path::Path;

use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video;
use ffmpeg_next::Rational;

use crate::shared::camera_info::CameraInfo;
use crate::shared::frame::{ChannelOrder, Frame};
use crate::video::domain::video_writer::{VideoWriter, WriterError};

/// Encodes annotated frames to MPEG-4 through ffmpeg-next.
pub struct FfmpegWriter {
    output: Option<Output>,
    frame_count: usize,
}

struct Output {
    octx: ffmpeg_next::format::context::Output,
    encoder: ffmpeg_next::codec::encoder::video::Encoder,
    /// Converter from the incoming channel order to YUV420P.
    scaler: Option<(scaling::Context, Pixel)>,
    width: u32,
    height: u32,
    time_base: Rational,
}

// Safety: FfmpegWriter is owned by a single recorder thread at a time.
// The raw pointers inside ffmpeg types are never shared.
unsafe impl Send for FfmpegWriter {}

impl FfmpegWriter {
    pub fn new() -> Self {
        Self {
            output: None,
            frame_count: 0,
        }
    }

    pub fn frames_written(&self) -> usize {
        self.frame_count
    }
}

impl Default for FfmpegWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Integer frame rate for the encoder time base. Non-positive rates fall
/// back to 30.
fn encoder_fps(fps: f64) -> i32 {
    let fps = fps.round() as i32;
    if fps <= 0 {
        30
    } else {
        fps
    }
}

fn source_pixel(order: ChannelOrder) -> Pixel {
    match order {
        ChannelOrder::Rgb => Pixel::RGB24,
        ChannelOrder::Bgr => Pixel::BGR24,
    }
}

impl VideoWriter for FfmpegWriter {
    fn open(&mut self, path: &Path, info: &CameraInfo) -> Result<(), WriterError> {
        ffmpeg_next::init()?;
        if self.output.is_some() {
            self.close()?;
        }

        let mut octx = ffmpeg_next::format::output(path)?;
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4)
            .ok_or("MPEG4 encoder not found")?;
        let mut ost = octx.add_stream(Some(codec))?;

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        encoder_ctx.set_width(info.width);
        encoder_ctx.set_height(info.height);
        encoder_ctx.set_format(Pixel::YUV420P);

        let fps = encoder_fps(info.fps);
        let time_base = Rational(1, fps);
        encoder_ctx.set_time_base(time_base);
        encoder_ctx.set_frame_rate(Some(Rational(fps, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder_ctx.open_with(ffmpeg_next::Dictionary::new())?;
        ost.set_parameters(&encoder);
        octx.write_header()?;

        log::info!(
            "Recording {}x{} at {fps} fps to {}",
            info.width,
            info.height,
            path.display()
        );

        self.output = Some(Output {
            octx,
            encoder,
            scaler: None,
            width: info.width,
            height: info.height,
            time_base,
        });
        self.frame_count = 0;
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<(), WriterError> {
        let out = self.output.as_mut().ok_or("FfmpegWriter: not opened")?;
        if frame.channels() != 3 || frame.width() != out.width || frame.height() != out.height {
            return Err(format!(
                "frame {}x{}x{} does not match recording {}x{}x3",
                frame.width(),
                frame.height(),
                frame.channels(),
                out.width,
                out.height
            )
            .into());
        }

        let pixel = source_pixel(frame.channel_order());
        let mut src = Video::new(pixel, out.width, out.height);
        let stride = src.stride(0);
        let row_bytes = out.width as usize * 3;
        let data = src.data_mut(0);
        for (row, chunk) in frame.data().chunks_exact(row_bytes).enumerate() {
            let start = row * stride;
            data[start..start + row_bytes].copy_from_slice(chunk);
        }

        if out.scaler.as_ref().map(|(_, p)| *p) != Some(pixel) {
            let ctx = scaling::Context::get(
                pixel,
                out.width,
                out.height,
                Pixel::YUV420P,
                out.width,
                out.height,
                scaling::Flags::BILINEAR,
            )?;
            out.scaler = Some((ctx, pixel));
        }
        let mut yuv = Video::empty();
        if let Some((scaler, _)) = out.scaler.as_mut() {
            scaler.run(&src, &mut yuv)?;
        }
        yuv.set_pts(Some(self.frame_count as i64));

        out.encoder.send_frame(&yuv)?;
        out.drain_packets()?;
        self.frame_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), WriterError> {
        let Some(mut out) = self.output.take() else {
            return Ok(());
        };
        out.encoder.send_eof()?;
        out.drain_packets()?;
        out.octx.write_trailer()?;
        log::debug!("Recording closed after {} frames", self.frame_count);
        Ok(())
    }
}

impl Output {
    fn drain_packets(&mut self) -> Result<(), WriterError> {
        let ost_time_base = self
            .octx
            .stream(0)
            .ok_or("output stream missing")?
            .time_base();
        let mut encoded = ffmpeg_next::Packet::empty();
        while self.encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(0);
            encoded.rescale_ts(self.time_base, ost_time_base);
            encoded.write_interleaved(&mut self.octx)?;
        }
        Ok(())
    }
}
