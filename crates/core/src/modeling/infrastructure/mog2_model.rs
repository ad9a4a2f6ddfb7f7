use crate::modeling::domain::background_model::BackgroundModel;
use crate::modeling::domain::model_config::Algorithm;
use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;
use crate::shared::mask::{Mask, BACKGROUND, FOREGROUND, SHADOW};

use super::pixel_math::{
    adaptive_rate, copy_record, is_shadow_of, not_applied, squared_distance, swap_records,
    to_sample, Geometry,
};

const MAX_MODES: usize = 5;
/// Squared Mahalanobis distance under which a sample updates a mode.
const FIT_THRESHOLD: f32 = 9.0;
/// Squared Mahalanobis distance under which a sample is explained by a
/// background mode.
const BACKGROUND_THRESHOLD: f32 = 16.0;
const BACKGROUND_RATIO: f32 = 0.9;
const VARIANCE_INIT: f32 = 15.0;
const VARIANCE_MIN: f32 = 4.0;
const VARIANCE_MAX: f32 = 5.0 * VARIANCE_INIT;
const COMPLEXITY_REDUCTION: f32 = 0.05;
const SHADOW_TAU: f32 = 0.5;

/// Adaptive Gaussian mixture (Zivkovic), with per-pixel mode count and an
/// optional shadow label.
pub struct Mog2Model {
    history: usize,
    detect_shadows: bool,
    frames_seen: usize,
    mixture: Option<Mixture>,
}

/// Modes of pixel `i` occupy slots `i * MAX_MODES ..`, kept sorted by
/// descending weight.
struct Mixture {
    geometry: Geometry,
    weights: Vec<f32>,
    variances: Vec<f32>,
    means: Vec<f32>,
    used: Vec<u8>,
}

impl Mog2Model {
    pub fn new(history: usize, detect_shadows: bool) -> Self {
        Self {
            history,
            detect_shadows,
            frames_seen: 0,
            mixture: None,
        }
    }
}

impl Mixture {
    fn new(geometry: Geometry) -> Self {
        let slots = geometry.pixels() * MAX_MODES;
        Self {
            geometry,
            weights: vec![0.0; slots],
            variances: vec![0.0; slots],
            means: vec![0.0; slots * geometry.channels],
            used: vec![0; geometry.pixels()],
        }
    }

    fn update(&mut self, i: usize, pixel: &[u8], alpha: f32, detect_shadows: bool) -> u8 {
        let c = self.geometry.channels;
        let base = i * MAX_MODES;
        let weights = &mut self.weights[base..base + MAX_MODES];
        let variances = &mut self.variances[base..base + MAX_MODES];
        let means = &mut self.means[base * c..(base + MAX_MODES) * c];
        let mut used = self.used[i] as usize;

        let prune = -alpha * COMPLEXITY_REDUCTION;
        let alpha1 = 1.0 - alpha;
        let mut background = false;
        let mut fits = false;
        let mut total = 0.0f32;

        for mode in 0..used {
            let mut weight = alpha1 * weights[mode] + prune;
            let mut slot = mode;

            if !fits {
                let var = variances[mode];
                let dist2 = squared_distance(pixel, &means[mode * c..(mode + 1) * c]);

                if total < BACKGROUND_RATIO && dist2 < BACKGROUND_THRESHOLD * var {
                    background = true;
                }

                if dist2 < FIT_THRESHOLD * var {
                    fits = true;
                    weight += alpha;
                    let k = alpha / weight;
                    for (m, &p) in means[mode * c..(mode + 1) * c].iter_mut().zip(pixel) {
                        *m += k * (p as f32 - *m);
                    }
                    variances[mode] = (var + k * (dist2 - var)).clamp(VARIANCE_MIN, VARIANCE_MAX);

                    while slot > 0 && weight >= weights[slot - 1] {
                        weights.swap(slot, slot - 1);
                        variances.swap(slot, slot - 1);
                        swap_records(means, c, slot, slot - 1);
                        slot -= 1;
                    }
                }
            }

            if weight < -prune {
                weight = 0.0;
            }
            weights[slot] = weight;
            total += weight;
        }

        // Drop pruned modes.
        let mut kept = 0;
        for mode in 0..used {
            if weights[mode] > 0.0 {
                if kept != mode {
                    weights[kept] = weights[mode];
                    variances[kept] = variances[mode];
                    copy_record(means, c, mode, kept);
                }
                kept += 1;
            }
        }
        used = kept;

        if total > 0.0 {
            let scale = 1.0 / total;
            for w in &mut weights[..used] {
                *w *= scale;
            }
        }

        if !fits {
            let slot = if used == MAX_MODES {
                MAX_MODES - 1
            } else {
                used += 1;
                used - 1
            };
            if used == 1 {
                weights[slot] = 1.0;
            } else {
                weights[slot] = alpha;
                for w in &mut weights[..used - 1] {
                    *w *= alpha1;
                }
            }
            for (m, &p) in means[slot * c..(slot + 1) * c].iter_mut().zip(pixel) {
                *m = p as f32;
            }
            variances[slot] = VARIANCE_INIT;

            let mut at = slot;
            while at > 0 && alpha >= weights[at - 1] {
                weights.swap(at, at - 1);
                variances.swap(at, at - 1);
                swap_records(means, c, at, at - 1);
                at -= 1;
            }
        }

        self.used[i] = used as u8;

        if background {
            BACKGROUND
        } else if detect_shadows && casts_shadow(weights, variances, means, c, used, pixel) {
            SHADOW
        } else {
            FOREGROUND
        }
    }

    fn background_pixel(&self, i: usize, out: &mut [u8]) {
        let c = self.geometry.channels;
        let base = i * MAX_MODES;
        let mut acc = vec![0.0f32; c];
        let mut total = 0.0f32;
        for mode in 0..self.used[i] as usize {
            let w = self.weights[base + mode];
            let mean = &self.means[(base + mode) * c..(base + mode + 1) * c];
            for (a, &m) in acc.iter_mut().zip(mean) {
                *a += w * m;
            }
            total += w;
            if total > BACKGROUND_RATIO {
                break;
            }
        }
        if total > 0.0 {
            for (o, a) in out.iter_mut().zip(&acc) {
                *o = to_sample(a / total);
            }
        }
    }
}

fn casts_shadow(
    weights: &[f32],
    variances: &[f32],
    means: &[f32],
    c: usize,
    used: usize,
    pixel: &[u8],
) -> bool {
    let mut total = 0.0f32;
    for mode in 0..used {
        let mean = &means[mode * c..(mode + 1) * c];
        if is_shadow_of(pixel, mean, BACKGROUND_THRESHOLD * variances[mode], SHADOW_TAU) {
            return true;
        }
        total += weights[mode];
        if total > BACKGROUND_RATIO {
            return false;
        }
    }
    false
}

impl BackgroundModel for Mog2Model {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Mog2
    }

    fn apply(&mut self, frame: &Frame) -> Result<Mask, PipelineError> {
        let mixture = self
            .mixture
            .get_or_insert_with(|| Mixture::new(Geometry::of(frame)));
        mixture.geometry.check(frame)?;

        self.frames_seen += 1;
        let alpha = adaptive_rate(self.frames_seen, self.history, 2);
        let c = mixture.geometry.channels;

        let data: Vec<u8> = frame
            .data()
            .chunks_exact(c)
            .enumerate()
            .map(|(i, pixel)| mixture.update(i, pixel, alpha, self.detect_shadows))
            .collect();
        Ok(Mask::new(data, frame.width(), frame.height()))
    }

    fn estimate(&self) -> Result<Frame, PipelineError> {
        let mixture = self.mixture.as_ref().ok_or_else(not_applied)?;
        let g = mixture.geometry;
        let mut data = vec![0u8; g.pixels() * g.channels];
        for (i, out) in data.chunks_exact_mut(g.channels).enumerate() {
            mixture.background_pixel(i, out);
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
    use crate::modeling::infrastructure::test_scenes::{count_value, solid, square};
    use crate::segmentation::domain::mask_processor::clean;

    #[test]
    fn test_static_scene_converges_to_background() {
        let mut model = Mog2Model::new(20, true);
        let frame = solid(16, 12, 90);
        let mut last = None;
        for _ in 0..10 {
            last = Some(model.apply(&frame).unwrap());
        }
        assert_eq!(last.unwrap().foreground_count(), 0);
    }

    #[test]
    fn test_moving_square_is_foreground() {
        let (w, h) = (320, 240);
        let mut model = Mog2Model::new(50, true);
        let empty = solid(w, h, 30);
        for _ in 0..50 {
            model.apply(&empty).unwrap();
        }

        let mut mask = None;
        for step in 0..3 {
            let frame = square(w, h, 30, 220, (step * 40, 20), 200);
            mask = Some(model.apply(&frame).unwrap());
        }

        let cleaned = clean(&mask.unwrap(), 3).unwrap();
        let count = cleaned.foreground_count();
        assert!(
            (39_000..=41_000).contains(&count),
            "expected about 40000 foreground pixels, got {count}"
        );
    }

    #[test]
    fn test_darker_object_is_labelled_shadow() {
        let mut model = Mog2Model::new(50, true);
        for _ in 0..30 {
            model.apply(&solid(20, 20, 100)).unwrap();
        }
        let mask = model.apply(&square(20, 20, 100, 70, (5, 5), 10)).unwrap();
        assert_eq!(count_value(&mask, SHADOW), 100);
        assert_eq!(count_value(&mask, FOREGROUND), 0);
    }

    #[test]
    fn test_shadow_detection_disabled_reports_foreground() {
        let mut model = Mog2Model::new(50, false);
        for _ in 0..30 {
            model.apply(&solid(20, 20, 100)).unwrap();
        }
        let mask = model.apply(&square(20, 20, 100, 70, (5, 5), 10)).unwrap();
        assert_eq!(count_value(&mask, SHADOW), 0);
        assert_eq!(count_value(&mask, FOREGROUND), 100);
    }

    #[test]
    fn test_estimate_tracks_dominant_mode() {
        let mut model = Mog2Model::new(50, true);
        for _ in 0..20 {
            model.apply(&solid(8, 8, 140)).unwrap();
        }
        model.apply(&square(8, 8, 140, 10, (0, 0), 2)).unwrap();

        let background = model.estimate().unwrap();
        assert_eq!(background.dimensions(), (8, 8));
        assert!(background.data().iter().all(|&v| (139..=141).contains(&v)));
    }

    #[test]
    fn test_estimate_before_apply_fails() {
        let model = Mog2Model::new(50, true);
        assert!(matches!(model.estimate(), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_shape_change_rejected() {
        let mut model = Mog2Model::new(50, true);
        model.apply(&solid(8, 8, 0)).unwrap();
        assert!(matches!(
            model.apply(&solid(4, 8, 0)),
            Err(PipelineError::ShapeMismatch { .. })
        ));
    }
}
