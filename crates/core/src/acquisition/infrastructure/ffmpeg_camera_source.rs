use std::path::PathBuf;

use super::ffmpeg_decode::{unavailable, DecodeState};
use crate::acquisition::domain::frame_source::{FrameSource, ReadOutcome, SourceKind};
use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::StreamMetadata;

#[cfg(target_os = "linux")]
const CAPTURE_FORMAT: &str = "video4linux2,v4l2";
#[cfg(target_os = "macos")]
const CAPTURE_FORMAT: &str = "avfoundation";
#[cfg(target_os = "windows")]
const CAPTURE_FORMAT: &str = "dshow";
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const CAPTURE_FORMAT: &str = "";

/// Device path or name for a camera index on the current platform.
pub fn camera_locator(index: u32) -> String {
    if cfg!(target_os = "linux") {
        format!("/dev/video{index}")
    } else if cfg!(target_os = "windows") {
        format!("video={index}")
    } else {
        index.to_string()
    }
}

/// Live capture through ffmpeg's input devices (v4l2, avfoundation, dshow).
///
/// Read failures are reported as [`ReadOutcome::Unavailable`]; a device
/// that disappears ends the stream with [`ReadOutcome::EndOfStream`].
pub struct FfmpegCameraSource {
    locator: String,
    state: Option<DecodeState>,
    metadata: StreamMetadata,
    emitted: usize,
}

// Safety: the source is only driven from one thread at a time; the raw
// ffmpeg pointers it owns are never shared.
unsafe impl Send for FfmpegCameraSource {}

impl FfmpegCameraSource {
    pub fn open(index: u32) -> Result<Self, PipelineError> {
        Self::open_device(&camera_locator(index))
    }

    pub fn open_device(locator: &str) -> Result<Self, PipelineError> {
        let path = PathBuf::from(locator);
        ffmpeg_next::init().map_err(|e| unavailable(&path, e))?;
        ffmpeg_next::device::register_all();

        let format = ffmpeg_next::device::input::video()
            .find(|f| f.name() == CAPTURE_FORMAT)
            .ok_or_else(|| {
                unavailable(
                    &path,
                    format!("capture backend '{CAPTURE_FORMAT}' is not available"),
                )
            })?;

        let ictx = ffmpeg_next::format::open_with(&path, &format, ffmpeg_next::Dictionary::new())
            .map_err(|e| unavailable(&path, e))?
            .input();

        let (state, mut metadata) = DecodeState::from_input(ictx, path)?;
        metadata.total_frames = 0;
        log::info!(
            "Opened camera {locator} ({}x{}, {:.2} fps)",
            metadata.width,
            metadata.height,
            metadata.fps
        );

        Ok(Self {
            locator: locator.to_string(),
            state: Some(state),
            metadata,
            emitted: 0,
        })
    }
}

/// Maps one decoder pull to a live outcome. The demuxer only stops yielding
/// packets at true end of stream (device gone); decode errors are transient.
fn read_outcome(pulled: Result<Option<Frame>, PipelineError>, locator: &str) -> ReadOutcome {
    match pulled {
        Ok(Some(frame)) => ReadOutcome::Frame(frame),
        Ok(None) => {
            log::info!("Camera {locator} stopped producing frames");
            ReadOutcome::EndOfStream
        }
        Err(e) => {
            log::warn!("Camera {locator} read failed: {e}");
            ReadOutcome::Unavailable
        }
    }
}

impl FrameSource for FfmpegCameraSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Live
    }

    fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    fn next(&mut self) -> Result<ReadOutcome, PipelineError> {
        let Some(state) = self.state.as_mut() else {
            return Ok(ReadOutcome::EndOfStream);
        };
        let outcome = read_outcome(state.pull(self.emitted, false), &self.locator);
        if matches!(outcome, ReadOutcome::Frame(_)) {
            self.emitted += 1;
        }
        Ok(outcome)
    }

    fn reset(&mut self) -> Result<(), PipelineError> {
        Err(PipelineError::NotSeekable)
    }

    fn close(&mut self) {
        if self.state.take().is_some() {
            log::info!("Released camera {}", self.locator);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_locator_uses_index() {
        let locator = camera_locator(2);
        assert!(locator.ends_with('2'));
    }

    #[test]
    fn test_decoded_frame_passes_through() {
        let outcome = read_outcome(Ok(Some(Frame::zeros(2, 2, 3, 4))), "cam");
        assert!(matches!(outcome, ReadOutcome::Frame(f) if f.index() == 4));
    }

    #[test]
    fn test_demuxer_end_is_end_of_stream() {
        assert!(matches!(read_outcome(Ok(None), "cam"), ReadOutcome::EndOfStream));
    }

    #[test]
    fn test_decode_error_is_transient() {
        let failed = Err(PipelineError::Decode("corrupt packet".to_string()));
        assert!(matches!(read_outcome(failed, "cam"), ReadOutcome::Unavailable));
    }

    #[test]
    fn test_missing_device_is_unavailable() {
        let result = FfmpegCameraSource::open_device("/nonexistent/video99");
        assert!(matches!(result, Err(PipelineError::SourceUnavailable(_))));
    }
}
