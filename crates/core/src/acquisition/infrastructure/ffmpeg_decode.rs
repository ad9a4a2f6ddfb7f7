use std::path::{Path, PathBuf};

use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::StreamMetadata;

/// Demux + decode + RGB conversion state shared by the ffmpeg-backed sources.
///
/// The scaler is built from the first decoded frame rather than from codec
/// parameters because capture devices (MJPEG webcams in particular) often
/// report no pixel format until data arrives.
pub(super) struct DecodeState {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: Option<ffmpeg_next::software::scaling::Context>,
    video_stream_index: usize,
    flushing: bool,
}

pub(super) fn unavailable(locator: &Path, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::SourceUnavailable(format!("{}: {e}", locator.display()))
}

impl DecodeState {
    /// Opens a container file.
    pub(super) fn open_file(path: &Path) -> Result<(Self, StreamMetadata), PipelineError> {
        ffmpeg_next::init().map_err(|e| unavailable(path, e))?;
        let ictx = ffmpeg_next::format::input(&path).map_err(|e| unavailable(path, e))?;
        Self::from_input(ictx, path.to_path_buf())
    }

    /// Wraps an already opened demuxer (files or capture devices).
    pub(super) fn from_input(
        ictx: ffmpeg_next::format::context::Input,
        locator: PathBuf,
    ) -> Result<(Self, StreamMetadata), PipelineError> {
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| unavailable(&locator, "no video stream found"))?;

        let video_stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| unavailable(&locator, e))?;
        let decoder = codec_ctx
            .decoder()
            .video()
            .map_err(|e| unavailable(&locator, e))?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let metadata = StreamMetadata {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            total_frames: stream.frames().max(0) as usize,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            source_path: Some(locator),
        };

        Ok((
            Self {
                ictx,
                decoder,
                scaler: None,
                video_stream_index,
                flushing: false,
            },
            metadata,
        ))
    }

    /// Decodes the next picture.
    ///
    /// `Ok(None)` means the demuxer returned no more packets. With
    /// `flush_on_eof` the decoder is drained first, so every buffered picture
    /// of a file is delivered before `None`.
    pub(super) fn pull(
        &mut self,
        index: usize,
        flush_on_eof: bool,
    ) -> Result<Option<Frame>, PipelineError> {
        loop {
            if let Some(frame) = self.try_receive(index)? {
                return Ok(Some(frame));
            }
            if self.flushing {
                return Ok(None);
            }

            let Some((stream, packet)) = self.ictx.packets().next() else {
                if !flush_on_eof {
                    return Ok(None);
                }
                let _ = self.decoder.send_eof();
                self.flushing = true;
                continue;
            };

            if stream.index() != self.video_stream_index {
                continue;
            }

            if let Err(e) = self.decoder.send_packet(&packet) {
                log::debug!("Dropping undecodable packet: {e}");
                continue;
            }
        }
    }

    fn try_receive(&mut self, index: usize) -> Result<Option<Frame>, PipelineError> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let width = decoded.width();
        let height = decoded.height();
        if self.scaler.is_none() {
            let scaler = ffmpeg_next::software::scaling::Context::get(
                decoded.format(),
                width,
                height,
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
                ffmpeg_next::software::scaling::Flags::BILINEAR,
            )
            .map_err(|e| PipelineError::Decode(e.to_string()))?;
            self.scaler = Some(scaler);
        }
        let Some(scaler) = self.scaler.as_mut() else {
            return Ok(None);
        };

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        scaler
            .run(&decoded, &mut rgb_frame)
            .map_err(|e| PipelineError::Decode(e.to_string()))?;

        let pixels = extract_rgb_pixels(&rgb_frame, width, height);
        Frame::try_new(pixels, width, height, 3, index).map(Some)
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer.
///
/// ffmpeg frames may have padding bytes at the end of each row (stride > width*3).
/// This function strips that padding to produce a tightly-packed pixel buffer.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
