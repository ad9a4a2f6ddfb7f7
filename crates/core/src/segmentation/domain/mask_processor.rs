use crate::segmentation::domain::morphology::{close, open};
use crate::shared::constants::DEFAULT_KERNEL_SIZE;
use crate::shared::error::PipelineError;
use crate::shared::mask::{Mask, BACKGROUND, FOREGROUND};

/// Cleans raw model masks with a morphological open then close.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaskProcessor {
    kernel_size: usize,
}

impl MaskProcessor {
    pub fn new(kernel_size: usize) -> Result<Self, PipelineError> {
        if kernel_size == 0 || kernel_size % 2 == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "kernel size must be odd and positive, got {kernel_size}"
            )));
        }
        Ok(Self { kernel_size })
    }

    /// Binarizes (only 255 stays foreground, so shadows are dropped), then
    /// opens to remove speckle and closes to fill small holes.
    pub fn clean(&self, mask: &Mask) -> Mask {
        let binary = Mask::new(
            mask.data()
                .iter()
                .map(|&v| if v == FOREGROUND { FOREGROUND } else { BACKGROUND })
                .collect(),
            mask.width(),
            mask.height(),
        );
        close(&open(&binary, self.kernel_size), self.kernel_size)
    }
}

impl Default for MaskProcessor {
    fn default() -> Self {
        Self {
            kernel_size: DEFAULT_KERNEL_SIZE,
        }
    }
}

/// One-shot form of [`MaskProcessor::clean`].
pub fn clean(mask: &Mask, kernel_size: usize) -> Result<Mask, PipelineError> {
    Ok(MaskProcessor::new(kernel_size)?.clean(mask))
}
