use std::path::{Path, PathBuf};

use crate::presentation::domain::frame_presenter::{FramePresenter, SegmentationOutput};
use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;

const FALLBACK_FPS: i32 = 30;

fn encode_error(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Presentation(format!("video encoding failed: {e}"))
}

/// Open encoder state, created from the first composited frame.
struct Encoding {
    octx: ffmpeg_next::format::context::Output,
    encoder: ffmpeg_next::codec::encoder::video::Encoder,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    time_base: ffmpeg_next::Rational,
}

/// Encodes the composited view into an MPEG-4 video file with ffmpeg-next.
pub struct FfmpegVideoPresenter {
    output_path: PathBuf,
    fps: i32,
    encoding: Option<Encoding>,
    frame_count: usize,
    closed: bool,
}

// Safety: the presenter is only driven from one thread at a time; the raw
// ffmpeg pointers it owns are never shared.
unsafe impl Send for FfmpegVideoPresenter {}

impl FfmpegVideoPresenter {
    /// `fps` of 0 or less (unknown, typical for cameras) falls back to 30.
    pub fn new(output_path: &Path, fps: f64) -> Self {
        let fps = fps.round() as i32;
        Self {
            output_path: output_path.to_path_buf(),
            fps: if fps <= 0 { FALLBACK_FPS } else { fps },
            encoding: None,
            frame_count: 0,
            closed: false,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn open(&self, width: u32, height: u32) -> Result<Encoding, PipelineError> {
        ffmpeg_next::init().map_err(encode_error)?;
        if let Some(parent) = self.output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut octx = ffmpeg_next::format::output(&self.output_path).map_err(encode_error)?;
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4)
            .ok_or_else(|| encode_error("MPEG4 encoder not found"))?;
        let mut ost = octx.add_stream(Some(codec)).map_err(encode_error)?;

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(encode_error)?;
        encoder_ctx.set_width(width);
        encoder_ctx.set_height(height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, self.fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(self.fps, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder_ctx
            .open_with(ffmpeg_next::Dictionary::new())
            .map_err(encode_error)?;
        ost.set_parameters(&encoder);
        octx.write_header().map_err(encode_error)?;
        let time_base = octx
            .stream(0)
            .map(|s| s.time_base())
            .ok_or_else(|| encode_error("output stream missing"))?;

        let scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::format::Pixel::YUV420P,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(encode_error)?;

        log::info!(
            "Encoding {}x{} @ {} fps to {}",
            width,
            height,
            self.fps,
            self.output_path.display()
        );
        Ok(Encoding {
            octx,
            encoder,
            scaler,
            width,
            height,
            time_base,
        })
    }
}

impl Encoding {
    fn drain(&mut self, fps: i32) -> Result<(), PipelineError> {
        let mut encoded = ffmpeg_next::Packet::empty();
        while self.encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(0);
            encoded.rescale_ts(ffmpeg_next::Rational(1, fps), self.time_base);
            encoded
                .write_interleaved(&mut self.octx)
                .map_err(encode_error)?;
        }
        Ok(())
    }

    fn write(&mut self, frame: &Frame, pts: i64, fps: i32) -> Result<(), PipelineError> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(PipelineError::ShapeMismatch {
                expected: (self.width, self.height),
                actual: frame.dimensions(),
            });
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::new(
            ffmpeg_next::format::Pixel::RGB24,
            self.width,
            self.height,
        );
        let stride = rgb_frame.stride(0);
        let row_len = self.width as usize * 3;
        let data = rgb_frame.data_mut(0);
        for (row, src) in frame.data().chunks_exact(row_len).enumerate() {
            let dst_start = row * stride;
            data[dst_start..dst_start + row_len].copy_from_slice(src);
        }

        let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler
            .run(&rgb_frame, &mut yuv_frame)
            .map_err(encode_error)?;
        yuv_frame.set_pts(Some(pts));

        self.encoder.send_frame(&yuv_frame).map_err(encode_error)?;
        self.drain(fps)
    }

    fn finish(&mut self, fps: i32) -> Result<(), PipelineError> {
        self.encoder.send_eof().map_err(encode_error)?;
        self.drain(fps)?;
        self.octx.write_trailer().map_err(encode_error)
    }
}

impl FramePresenter for FfmpegVideoPresenter {
    fn present(&mut self, output: &SegmentationOutput) -> Result<(), PipelineError> {
        if self.closed {
            return Err(PipelineError::Presentation(
                "video presenter is closed".to_string(),
            ));
        }
        let frame = &output.composited;
        if frame.channels() != 3 {
            return Err(PipelineError::Presentation(format!(
                "video output needs RGB frames, got {} channel(s)",
                frame.channels()
            )));
        }
        if self.encoding.is_none() {
            self.encoding = Some(self.open(frame.width(), frame.height())?);
        }
        let pts = self.frame_count as i64;
        let fps = self.fps;
        if let Some(encoding) = self.encoding.as_mut() {
            encoding.write(frame, pts, fps)?;
        }
        self.frame_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(mut encoding) = self.encoding.take() {
            encoding.finish(self.fps)?;
            log::info!(
                "Wrote {} frame(s) to {}",
                self.frame_count,
                self.output_path.display()
            );
        }
        Ok(())
    }
}

impl Drop for FfmpegVideoPresenter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to finalize {}: {e}", self.output_path.display());
        }
    }
}
