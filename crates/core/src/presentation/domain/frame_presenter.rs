use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;
use crate::shared::mask::Mask;

/// The four views produced by one pipeline iteration.
#[derive(Clone, Debug)]
pub struct SegmentationOutput {
    pub frame: Frame,
    pub background: Frame,
    pub mask: Mask,
    pub composited: Frame,
}

impl SegmentationOutput {
    pub fn index(&self) -> usize {
        self.frame.index()
    }
}

/// Receives every processed iteration: display, encode, persist or discard.
pub trait FramePresenter: Send {
    fn present(&mut self, output: &SegmentationOutput) -> Result<(), PipelineError>;

    /// Flushes and releases resources. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), PipelineError>;
}

/// Discards everything; for headless runs.
#[derive(Debug, Default)]
pub struct NullPresenter {
    presented: usize,
}

impl NullPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> usize {
        self.presented
    }
}

impl FramePresenter for NullPresenter {
    fn present(&mut self, _output: &SegmentationOutput) -> Result<(), PipelineError> {
        self.presented += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Forwards each output to several presenters in order.
///
/// `present` stops at the first failure. `close` closes every presenter and
/// reports the first error.
pub struct FanOutPresenter {
    targets: Vec<Box<dyn FramePresenter>>,
}

impl FanOutPresenter {
    pub fn new(targets: Vec<Box<dyn FramePresenter>>) -> Self {
        Self { targets }
    }
}

impl FramePresenter for FanOutPresenter {
    fn present(&mut self, output: &SegmentationOutput) -> Result<(), PipelineError> {
        for target in &mut self.targets {
            target.present(output)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        let mut first_err = None;
        for target in &mut self.targets {
            if let Err(e) = target.close() {
                log::warn!("Presenter failed to close: {e}");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
