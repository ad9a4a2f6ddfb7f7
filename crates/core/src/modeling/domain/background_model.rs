use crate::modeling::domain::model_config::Algorithm;
use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;
use crate::shared::mask::Mask;

/// Domain interface for a per-pixel statistical background model.
///
/// `apply` both classifies and learns, so implementations are stateful and
/// take `&mut self`. The first applied frame fixes the shape every later
/// frame must have.
pub trait BackgroundModel: Send {
    fn algorithm(&self) -> Algorithm;

    /// Updates the model with `frame` and returns the raw mask: 0 for
    /// background, 255 for foreground and, when shadow detection is on,
    /// 127 for shadow.
    fn apply(&mut self, frame: &Frame) -> Result<Mask, PipelineError>;

    /// Current background belief, shaped like the applied frames.
    fn estimate(&self) -> Result<Frame, PipelineError>;
}
