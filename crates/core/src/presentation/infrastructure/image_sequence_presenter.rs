use std::fs;
use std::path::{Path, PathBuf};

use crate::presentation::domain::frame_presenter::{FramePresenter, SegmentationOutput};
use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;
use crate::shared::mask::Mask;

pub const VIEW_DIRS: [&str; 4] = ["original", "background", "mask", "segmented"];

/// Writes every `every`-th output as four PNG files, one per view
/// directory under `output_dir`.
pub struct ImageSequencePresenter {
    output_dir: PathBuf,
    every: usize,
    seen: usize,
    written: usize,
}

impl ImageSequencePresenter {
    /// Creates the view directories up front so permission problems surface
    /// before the first frame.
    pub fn new(output_dir: &Path, every: usize) -> Result<Self, PipelineError> {
        if every == 0 {
            return Err(PipelineError::InvalidConfig(
                "snapshot interval must be at least 1".to_string(),
            ));
        }
        for dir in VIEW_DIRS {
            fs::create_dir_all(output_dir.join(dir))?;
        }
        log::info!(
            "Writing snapshots to {} every {every} frame(s)",
            output_dir.display()
        );
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            every,
            seen: 0,
            written: 0,
        })
    }

    pub fn written(&self) -> usize {
        self.written
    }

    fn path(&self, view: &str, index: usize) -> PathBuf {
        self.output_dir.join(view).join(format!("frame_{index:06}.png"))
    }
}

fn save_frame(path: &Path, frame: &Frame) -> Result<(), PipelineError> {
    let (w, h) = frame.dimensions();
    let data = frame.data().to_vec();
    let result = match frame.channels() {
        3 => image::RgbImage::from_raw(w, h, data).map(|img| img.save(path)),
        1 => image::GrayImage::from_raw(w, h, data).map(|img| img.save(path)),
        c => {
            return Err(PipelineError::Presentation(format!(
                "cannot save a {c}-channel frame as PNG"
            )))
        }
    };
    match result {
        Some(saved) => saved.map_err(|e| PipelineError::Presentation(format!("{}: {e}", path.display()))),
        None => Err(PipelineError::Presentation(
            "frame data does not match its dimensions".to_string(),
        )),
    }
}

fn save_mask(path: &Path, mask: &Mask) -> Result<(), PipelineError> {
    let img = image::GrayImage::from_raw(mask.width(), mask.height(), mask.data().to_vec())
        .ok_or_else(|| PipelineError::Presentation("mask data does not match its dimensions".to_string()))?;
    img.save(path)
        .map_err(|e| PipelineError::Presentation(format!("{}: {e}", path.display())))
}

impl FramePresenter for ImageSequencePresenter {
    fn present(&mut self, output: &SegmentationOutput) -> Result<(), PipelineError> {
        let due = self.seen % self.every == 0;
        self.seen += 1;
        if !due {
            return Ok(());
        }

        let index = output.index();
        save_frame(&self.path(VIEW_DIRS[0], index), &output.frame)?;
        save_frame(&self.path(VIEW_DIRS[1], index), &output.background)?;
        save_mask(&self.path(VIEW_DIRS[2], index), &output.mask)?;
        save_frame(&self.path(VIEW_DIRS[3], index), &output.composited)?;
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}
