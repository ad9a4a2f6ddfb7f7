use std::fs;
use std::path::{Path, PathBuf};

use crate::acquisition::domain::frame_source::{FrameSource, ReadOutcome, SourceKind};
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;
use crate::shared::video_metadata::StreamMetadata;

/// File-backed source over a directory of still images, played in file
/// name order.
///
/// The first image is decoded at construction to validate the directory and
/// fix the stream dimensions. An image that fails to decode later is skipped
/// with a warning, mirroring how a container decoder drops a bad packet.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    cursor: usize,
    emitted: usize,
    metadata: StreamMetadata,
    closed: bool,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> Result<Self, PipelineError> {
        let paths = list_images(dir)?;
        let first = paths.first().ok_or_else(|| {
            PipelineError::SourceUnavailable(format!("no images found in {}", dir.display()))
        })?;
        let (width, height) = image::image_dimensions(first).map_err(|e| {
            PipelineError::SourceUnavailable(format!("{}: {e}", first.display()))
        })?;

        let metadata = StreamMetadata {
            width,
            height,
            fps: 0.0,
            total_frames: paths.len(),
            codec: "image".to_string(),
            source_path: Some(dir.to_path_buf()),
        };
        log::debug!(
            "Opened image sequence {} ({} frames, {width}x{height})",
            dir.display(),
            paths.len()
        );

        Ok(Self {
            paths,
            cursor: 0,
            emitted: 0,
            metadata,
            closed: false,
        })
    }

    fn decode(&self, path: &Path) -> Result<Frame, PipelineError> {
        let img = image::open(path)
            .map_err(|e| PipelineError::Decode(format!("{}: {e}", path.display())))?
            .to_rgb8();
        let (w, h) = img.dimensions();
        if (w, h) != (self.metadata.width, self.metadata.height) {
            return Err(PipelineError::ShapeMismatch {
                expected: (self.metadata.width, self.metadata.height),
                actual: (w, h),
            });
        }
        Ok(Frame::new(img.into_raw(), w, h, 3, self.emitted))
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| PipelineError::SourceUnavailable(format!("{}: {e}", dir.display())))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image(p))
        .collect();
    paths.sort();
    Ok(paths)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    fn next(&mut self) -> Result<ReadOutcome, PipelineError> {
        if self.closed {
            return Ok(ReadOutcome::EndOfStream);
        }
        let Some(path) = self.paths.get(self.cursor).cloned() else {
            return Ok(ReadOutcome::EndOfStream);
        };
        self.cursor += 1;

        match self.decode(&path) {
            Ok(frame) => {
                self.emitted += 1;
                Ok(ReadOutcome::Frame(frame))
            }
            Err(PipelineError::Decode(msg)) => {
                log::warn!("Skipping undecodable image: {msg}");
                Ok(ReadOutcome::Unavailable)
            }
            Err(e) => Err(e),
        }
    }

    fn reset(&mut self) -> Result<(), PipelineError> {
        if self.closed {
            return Err(PipelineError::SourceUnavailable(
                "image sequence is closed".to_string(),
            ));
        }
        self.cursor = 0;
        self.emitted = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_sequence(dir: &Path, count: usize, width: u32, height: u32) {
        for i in 0..count {
            let value = (i * 20) as u8;
            let img = image::RgbImage::from_pixel(width, height, image::Rgb([value, value, value]));
            img.save(dir.join(format!("frame_{i:03}.png"))).unwrap();
        }
    }

    fn pull(source: &mut ImageSequenceSource) -> Option<Frame> {
        match source.next().unwrap() {
            ReadOutcome::Frame(f) => Some(f),
            _ => None,
        }
    }

    #[test]
    fn test_ten_frame_sequence_loops_back_to_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path(), 10, 16, 12);

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        for expected in 0..10 {
            let frame = pull(&mut source).unwrap();
            assert_eq!(frame.index(), expected);
        }
        assert!(matches!(source.next().unwrap(), ReadOutcome::EndOfStream));

        source.reset().unwrap();
        let frame = pull(&mut source).unwrap();
        assert_eq!(frame.index(), 0);
        assert_eq!(frame.data()[0], 0);
    }

    #[test]
    fn test_frames_are_sorted_by_name_and_rgb() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path(), 3, 8, 8);

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        let values: Vec<u8> = (0..3).map(|_| pull(&mut source).unwrap().data()[0]).collect();
        assert_eq!(values, vec![0, 20, 40]);

        source.reset().unwrap();
        let frame = pull(&mut source).unwrap();
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.data().len(), 8 * 8 * 3);
    }

    #[test]
    fn test_metadata_matches_first_image() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path(), 4, 20, 10);
        let source = ImageSequenceSource::open(dir.path()).unwrap();
        assert_eq!(source.metadata().width, 20);
        assert_eq!(source.metadata().height, 10);
        assert_eq!(source.metadata().total_frames, 4);
        assert!(source.is_seekable());
    }

    #[test]
    fn test_empty_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let result = ImageSequenceSource::open(dir.path());
        assert!(matches!(result, Err(PipelineError::SourceUnavailable(_))));
    }

    #[test]
    fn test_missing_directory_is_unavailable() {
        let result = ImageSequenceSource::open(Path::new("/nonexistent/frames"));
        assert!(matches!(result, Err(PipelineError::SourceUnavailable(_))));
    }

    #[test]
    fn test_corrupt_image_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path(), 2, 8, 8);
        fs::write(dir.path().join("frame_001.png"), b"not a png").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert!(pull(&mut source).is_some());
        assert!(matches!(source.next().unwrap(), ReadOutcome::Unavailable));
        assert!(matches!(source.next().unwrap(), ReadOutcome::EndOfStream));
    }

    #[test]
    fn test_mismatched_dimensions_fail() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path(), 1, 8, 8);
        image::RgbImage::new(4, 4)
            .save(dir.path().join("frame_999.png"))
            .unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert!(pull(&mut source).is_some());
        assert!(matches!(
            source.next(),
            Err(PipelineError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_close_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path(), 1, 8, 8);
        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        source.close();
        source.close();
        assert!(matches!(source.next().unwrap(), ReadOutcome::EndOfStream));
        assert!(source.reset().is_err());
    }
}
