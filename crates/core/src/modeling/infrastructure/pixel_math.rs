//! Helpers shared by the per-pixel model implementations.

use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;

/// Shape captured from the first applied frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) struct Geometry {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
}

impl Geometry {
    pub fn of(frame: &Frame) -> Self {
        Self {
            width: frame.width(),
            height: frame.height(),
            channels: frame.channels() as usize,
        }
    }

    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn check(&self, frame: &Frame) -> Result<(), PipelineError> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(PipelineError::ShapeMismatch {
                expected: (self.width, self.height),
                actual: frame.dimensions(),
            });
        }
        if frame.channels() as usize != self.channels {
            return Err(PipelineError::InvalidConfig(format!(
                "model was initialized with {} channels, got {}",
                self.channels,
                frame.channels()
            )));
        }
        Ok(())
    }
}

pub(super) fn not_applied() -> PipelineError {
    PipelineError::InvalidConfig("model has not been applied".to_string())
}

/// Learning rate `1 / min(scale * frames_seen, history)`.
pub(super) fn adaptive_rate(frames_seen: usize, history: usize, scale: usize) -> f32 {
    let window = (scale * frames_seen).min(history).max(1);
    1.0 / window as f32
}

pub(super) fn squared_distance(pixel: &[u8], mean: &[f32]) -> f32 {
    pixel
        .iter()
        .zip(mean)
        .map(|(&p, &m)| {
            let d = m - p as f32;
            d * d
        })
        .sum()
}

/// Darker-version-of-the-background test.
///
/// The pixel is a shadow of `mean` when its brightness ratio `a` lies in
/// `[tau, 1]` and the chromatic distance to `a * mean` stays below
/// `threshold * a^2`.
pub(super) fn is_shadow_of(pixel: &[u8], mean: &[f32], threshold: f32, tau: f32) -> bool {
    let mut numerator = 0.0f32;
    let mut denominator = 0.0f32;
    for (&p, &m) in pixel.iter().zip(mean) {
        numerator += p as f32 * m;
        denominator += m * m;
    }
    if denominator <= 0.0 || numerator > denominator || numerator < tau * denominator {
        return false;
    }

    let a = numerator / denominator;
    let dist2a: f32 = pixel
        .iter()
        .zip(mean)
        .map(|(&p, &m)| {
            let d = a * m - p as f32;
            d * d
        })
        .sum();
    dist2a < threshold * a * a
}

/// Swaps the `width`-wide records `a` and `b` of a flat per-mode array.
pub(super) fn swap_records<T>(data: &mut [T], width: usize, a: usize, b: usize) {
    for j in 0..width {
        data.swap(a * width + j, b * width + j);
    }
}

/// Copies record `from` over record `to` in a flat per-mode array.
pub(super) fn copy_record<T: Copy>(data: &mut [T], width: usize, from: usize, to: usize) {
    data.copy_within(from * width..(from + 1) * width, to * width);
}

pub(super) fn to_sample(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
