use crate::modeling::domain::background_model::BackgroundModel;
use crate::modeling::domain::model_config::Algorithm;
use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;
use crate::shared::mask::{Mask, BACKGROUND, FOREGROUND};

use super::pixel_math::{not_applied, Geometry};

const QUANTIZATION_LEVELS: u32 = 16;
/// Four bits per channel must fit a `u32` feature id.
const MAX_CHANNELS: u8 = 8;
const MAX_FEATURES: usize = 64;
const LEARNING_RATE: f32 = 0.025;
const BACKGROUND_PRIOR: f32 = 0.8;
const DECISION_THRESHOLD: f32 = 0.8;
/// Half-width of the box window applied to the foreground posterior.
const SMOOTHING_RADIUS: usize = 3;

/// Per-pixel Bayesian classifier over quantized color histograms
/// (Godbehere, Matsukawa & Goldberg).
///
/// The first `initialization_frames` frames only train the histograms and
/// yield an all-background mask.
pub struct GmgModel {
    initialization_frames: usize,
    frames_seen: usize,
    histograms: Option<Histograms>,
}

/// Up to [`MAX_FEATURES`] `(feature, weight)` pairs per pixel.
struct Histograms {
    geometry: Geometry,
    features: Vec<u32>,
    weights: Vec<f32>,
    used: Vec<u8>,
}

impl GmgModel {
    pub fn new(initialization_frames: usize) -> Self {
        Self {
            initialization_frames,
            frames_seen: 0,
            histograms: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.frames_seen >= self.initialization_frames
    }
}

fn quantize(pixel: &[u8]) -> u32 {
    pixel.iter().fold(0u32, |id, &v| {
        id * QUANTIZATION_LEVELS + (v as u32 * QUANTIZATION_LEVELS / 256)
    })
}

fn dequantize(feature: u32, out: &mut [u8]) {
    let step = 256 / QUANTIZATION_LEVELS;
    let mut rest = feature;
    for o in out.iter_mut().rev() {
        *o = ((rest % QUANTIZATION_LEVELS) * step + step / 2) as u8;
        rest /= QUANTIZATION_LEVELS;
    }
}

impl Histograms {
    fn new(geometry: Geometry) -> Self {
        let slots = geometry.pixels() * MAX_FEATURES;
        Self {
            geometry,
            features: vec![0; slots],
            weights: vec![0.0; slots],
            used: vec![0; geometry.pixels()],
        }
    }

    fn slots(&mut self, i: usize) -> (&mut [u32], &mut [f32], usize) {
        let base = i * MAX_FEATURES;
        (
            &mut self.features[base..base + MAX_FEATURES],
            &mut self.weights[base..base + MAX_FEATURES],
            self.used[i] as usize,
        )
    }

    fn weight_of(&self, i: usize, feature: u32) -> f32 {
        let base = i * MAX_FEATURES;
        let used = self.used[i] as usize;
        self.features[base..base + used]
            .iter()
            .position(|&f| f == feature)
            .map(|k| self.weights[base + k])
            .unwrap_or(0.0)
    }

    /// Adds `amount` to `feature`, evicting the lightest feature when full.
    /// Returns true when an eviction happened.
    fn insert(&mut self, i: usize, feature: u32, amount: f32) -> bool {
        let (features, weights, used) = self.slots(i);
        if let Some(k) = features[..used].iter().position(|&f| f == feature) {
            weights[k] += amount;
            return false;
        }
        if used < MAX_FEATURES {
            features[used] = feature;
            weights[used] = amount;
            self.used[i] += 1;
            return false;
        }
        let lightest = (0..used)
            .min_by(|&a, &b| weights[a].total_cmp(&weights[b]))
            .unwrap_or(0);
        features[lightest] = feature;
        weights[lightest] = amount;
        true
    }

    fn scale(&mut self, i: usize, factor: f32) {
        let (_, weights, used) = self.slots(i);
        for w in &mut weights[..used] {
            *w *= factor;
        }
    }

    fn normalize(&mut self, i: usize) {
        let (_, weights, used) = self.slots(i);
        let total: f32 = weights[..used].iter().sum();
        if total > 0.0 {
            for w in &mut weights[..used] {
                *w /= total;
            }
        }
    }

    fn dominant(&self, i: usize) -> Option<u32> {
        let base = i * MAX_FEATURES;
        let used = self.used[i] as usize;
        (0..used)
            .max_by(|&a, &b| self.weights[base + a].total_cmp(&self.weights[base + b]))
            .map(|k| self.features[base + k])
    }
}

/// Mean over the in-image part of a `(2r+1)`-wide square window.
fn box_smooth(values: &[f32], width: usize, height: usize, radius: usize) -> Vec<f32> {
    let pass = |src: &[f32], horizontal: bool| -> Vec<f32> {
        let mut dst = vec![0.0; src.len()];
        for y in 0..height {
            for x in 0..width {
                let (pos, len) = if horizontal { (x, width) } else { (y, height) };
                let lo = pos.saturating_sub(radius);
                let hi = (pos + radius).min(len - 1);
                let mut sum = 0.0;
                for p in lo..=hi {
                    sum += if horizontal {
                        src[y * width + p]
                    } else {
                        src[p * width + x]
                    };
                }
                dst[y * width + x] = sum / (hi - lo + 1) as f32;
            }
        }
        dst
    };
    pass(&pass(values, true), false)
}

impl BackgroundModel for GmgModel {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Gmg
    }

    fn apply(&mut self, frame: &Frame) -> Result<Mask, PipelineError> {
        if frame.channels() > MAX_CHANNELS {
            return Err(PipelineError::InvalidConfig(format!(
                "GMG supports at most {MAX_CHANNELS} channels, got {}",
                frame.channels()
            )));
        }
        let histograms = self
            .histograms
            .get_or_insert_with(|| Histograms::new(Geometry::of(frame)));
        histograms.geometry.check(frame)?;
        let c = histograms.geometry.channels;
        let (width, height) = (frame.width() as usize, frame.height() as usize);

        let training = self.frames_seen < self.initialization_frames;
        self.frames_seen += 1;

        if training {
            let finishing = self.frames_seen == self.initialization_frames;
            for (i, pixel) in frame.data().chunks_exact(c).enumerate() {
                histograms.insert(i, quantize(pixel), 1.0);
                if finishing {
                    histograms.normalize(i);
                }
            }
            if finishing {
                log::debug!("GMG initialized after {} frames", self.frames_seen);
            }
            return Ok(Mask::background(frame.width(), frame.height()));
        }

        let mut posterior = Vec::with_capacity(width * height);
        for (i, pixel) in frame.data().chunks_exact(c).enumerate() {
            let feature = quantize(pixel);
            let likelihood = histograms.weight_of(i, feature);
            let evidence =
                likelihood * BACKGROUND_PRIOR + (1.0 - likelihood) * (1.0 - BACKGROUND_PRIOR);
            let background = if evidence > 0.0 {
                likelihood * BACKGROUND_PRIOR / evidence
            } else {
                0.0
            };
            posterior.push(1.0 - background);

            histograms.scale(i, 1.0 - LEARNING_RATE);
            if histograms.insert(i, feature, LEARNING_RATE) {
                histograms.normalize(i);
            }
        }

        let smoothed = box_smooth(&posterior, width, height, SMOOTHING_RADIUS);
        let data = smoothed
            .iter()
            .map(|&p| if p > DECISION_THRESHOLD { FOREGROUND } else { BACKGROUND })
            .collect();
        Ok(Mask::new(data, frame.width(), frame.height()))
    }

    /// Color of each pixel's heaviest histogram bin.
    fn estimate(&self) -> Result<Frame, PipelineError> {
        let histograms = self.histograms.as_ref().ok_or_else(not_applied)?;
        let g = histograms.geometry;
        let mut data = vec![0u8; g.pixels() * g.channels];
        for (i, out) in data.chunks_exact_mut(g.channels).enumerate() {
            if let Some(feature) = histograms.dominant(i) {
                dequantize(feature, out);
            }
        }
        Ok(Frame::new(
            data,
            g.width,
            g.height,
            g.channels as u8,
            self.frames_seen.saturating_sub(1),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modeling::infrastructure::test_scenes::{solid, square};
    use approx::assert_relative_eq;

    #[test]
    fn test_training_frames_yield_empty_masks() {
        let mut model = GmgModel::new(5);
        for i in 0..5 {
            let frame = square(20, 20, 10, 250, (i, i), 6);
            let mask = model.apply(&frame).unwrap();
            assert_eq!(mask.foreground_count(), 0);
        }
        assert!(model.is_initialized());
    }

    #[test]
    fn test_static_scene_after_training_is_background() {
        let mut model = GmgModel::new(5);
        for _ in 0..5 {
            model.apply(&solid(16, 16, 60)).unwrap();
        }
        let mask = model.apply(&solid(16, 16, 60)).unwrap();
        assert_eq!(mask.foreground_count(), 0);
    }

    #[test]
    fn test_new_object_detected_with_smoothed_border() {
        let mut model = GmgModel::new(10);
        for _ in 0..10 {
            model.apply(&solid(120, 90, 30)).unwrap();
        }
        let mask = model.apply(&square(120, 90, 30, 220, (30, 15), 60)).unwrap();

        let count = mask.foreground_count();
        assert!(
            (2_880..=3_600).contains(&count),
            "expected most of the 3600 object pixels, got {count}"
        );
        assert_eq!(mask.get(60, 45), FOREGROUND);
        assert_eq!(mask.get(5, 5), BACKGROUND);
    }

    #[test]
    fn test_isolated_pixel_is_smoothed_away() {
        let mut model = GmgModel::new(3);
        for _ in 0..3 {
            model.apply(&solid(20, 20, 30)).unwrap();
        }
        let mask = model.apply(&square(20, 20, 30, 220, (10, 10), 1)).unwrap();
        assert_eq!(mask.foreground_count(), 0);
    }

    #[test]
    fn test_quantize_roundtrip_lands_in_bin_center() {
        let mut out = [0u8; 3];
        dequantize(quantize(&[0, 130, 255]), &mut out);
        assert_eq!(out, [8, 136, 248]);
    }

    #[test]
    fn test_box_smooth_ignores_outside() {
        let values = vec![1.0; 9];
        let smoothed = box_smooth(&values, 3, 3, 1);
        for v in smoothed {
            assert_relative_eq!(v, 1.0);
        }
    }

    #[test]
    fn test_estimate_reports_dominant_color() {
        let mut model = GmgModel::new(4);
        model.apply(&solid(5, 5, 200)).unwrap();
        let background = model.estimate().unwrap();
        assert_eq!(background.data()[0], 200);
    }

    #[test]
    fn test_estimate_before_apply_fails() {
        assert!(matches!(
            GmgModel::new(4).estimate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_too_many_channels_rejected() {
        let mut model = GmgModel::new(4);
        let wide = Frame::new(vec![255; 2 * 2 * 9], 2, 2, 9, 0);
        assert!(matches!(model.apply(&wide), Err(PipelineError::InvalidConfig(_))));
        assert!(matches!(model.estimate(), Err(PipelineError::InvalidConfig(_))));

        let eight = Frame::new(vec![255; 2 * 2 * 8], 2, 2, 8, 0);
        assert!(model.apply(&eight).is_ok());
        assert_eq!(quantize(&[255; 8]), u32::MAX);
    }

    #[test]
    fn test_shape_change_rejected() {
        let mut model = GmgModel::new(4);
        model.apply(&solid(5, 5, 0)).unwrap();
        assert!(matches!(
            model.apply(&solid(6, 5, 0)),
            Err(PipelineError::ShapeMismatch { .. })
        ));
    }
}
