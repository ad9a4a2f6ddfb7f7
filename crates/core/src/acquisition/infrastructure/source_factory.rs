use std::path::Path;

use crate::acquisition::domain::frame_source::{FrameSource, SourceKind};
use crate::shared::error::PipelineError;

use super::ffmpeg_camera_source::FfmpegCameraSource;
use super::ffmpeg_file_source::FfmpegFileSource;
use super::image_sequence_source::ImageSequenceSource;

/// Opens the frame source for `kind`.
///
/// File sources need a locator: a directory is played as an image sequence,
/// anything else is handed to ffmpeg. Live sources open camera `camera_index`
/// and ignore the locator.
pub fn open_source(
    kind: SourceKind,
    locator: Option<&Path>,
    camera_index: u32,
) -> Result<Box<dyn FrameSource>, PipelineError> {
    match kind {
        SourceKind::Live => {
            log::info!("Opening camera {camera_index}");
            Ok(Box::new(FfmpegCameraSource::open(camera_index)?))
        }
        SourceKind::File => {
            let path = locator.ok_or_else(|| {
                PipelineError::SourceUnavailable("no file given for a file source".to_string())
            })?;
            if !path.exists() {
                return Err(PipelineError::SourceUnavailable(format!(
                    "{} does not exist",
                    path.display()
                )));
            }
            if path.is_dir() {
                log::info!("Opening image sequence {}", path.display());
                Ok(Box::new(ImageSequenceSource::open(path)?))
            } else {
                log::info!("Opening video {}", path.display());
                Ok(Box::new(FfmpegFileSource::open(path)?))
            }
        }
    }
}
