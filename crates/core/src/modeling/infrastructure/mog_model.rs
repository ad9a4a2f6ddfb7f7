use crate::modeling::domain::background_model::BackgroundModel;
use crate::modeling::domain::model_config::Algorithm;
use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;
use crate::shared::mask::{Mask, BACKGROUND, FOREGROUND};

use super::pixel_math::{adaptive_rate, not_applied, squared_distance, swap_records, to_sample, Geometry};

const MIXTURES: usize = 5;
const BACKGROUND_RATIO: f32 = 0.7;
const NOISE_SIGMA: f32 = 15.0;
const MIN_VARIANCE: f32 = NOISE_SIGMA * NOISE_SIGMA;
/// A sample matches a component within 2.5 standard deviations.
const MATCH_THRESHOLD: f32 = 2.5 * 2.5;
const INITIAL_WEIGHT: f32 = 0.05;

/// Fixed-size Gaussian mixture (KaewTraKulPong & Bowden).
///
/// Components are ranked by `weight / sigma`; the leading components whose
/// weights add up past [`BACKGROUND_RATIO`] model the background. Shadows are
/// not modelled.
pub struct MogModel {
    history: usize,
    frames_seen: usize,
    mixture: Option<Mixture>,
}

struct Mixture {
    geometry: Geometry,
    weights: Vec<f32>,
    /// Per-channel variances, `channels` entries per component.
    variances: Vec<f32>,
    means: Vec<f32>,
    used: Vec<u8>,
}

impl MogModel {
    pub fn new(history: usize) -> Self {
        Self {
            history,
            frames_seen: 0,
            mixture: None,
        }
    }
}

fn sort_key(weight: f32, variances: &[f32]) -> f32 {
    weight / variances.iter().sum::<f32>().sqrt()
}

/// Number of leading components that make up the background.
fn background_components(weights: &[f32]) -> usize {
    let mut total = 0.0;
    for (k, &w) in weights.iter().enumerate() {
        total += w;
        if total > BACKGROUND_RATIO {
            return k + 1;
        }
    }
    weights.len()
}

impl Mixture {
    fn new(geometry: Geometry) -> Self {
        let slots = geometry.pixels() * MIXTURES;
        Self {
            geometry,
            weights: vec![0.0; slots],
            variances: vec![0.0; slots * geometry.channels],
            means: vec![0.0; slots * geometry.channels],
            used: vec![0; geometry.pixels()],
        }
    }

    fn update(&mut self, i: usize, pixel: &[u8], alpha: f32) -> u8 {
        let c = self.geometry.channels;
        let base = i * MIXTURES;
        let weights = &mut self.weights[base..base + MIXTURES];
        let variances = &mut self.variances[base * c..(base + MIXTURES) * c];
        let means = &mut self.means[base * c..(base + MIXTURES) * c];
        let mut used = self.used[i] as usize;

        let hit = (0..used).find(|&k| {
            let d2 = squared_distance(pixel, &means[k * c..(k + 1) * c]);
            let var: f32 = variances[k * c..(k + 1) * c].iter().sum();
            d2 < MATCH_THRESHOLD * var
        });

        for (k, w) in weights[..used].iter_mut().enumerate() {
            *w = (1.0 - alpha) * *w + if hit == Some(k) { alpha } else { 0.0 };
        }

        let mut tracked = match hit {
            Some(k) => {
                for ch in 0..c {
                    let idx = k * c + ch;
                    let diff = pixel[ch] as f32 - means[idx];
                    means[idx] += alpha * diff;
                    variances[idx] = (variances[idx] + alpha * (diff * diff - variances[idx])).max(MIN_VARIANCE);
                }
                k
            }
            None => {
                // Replace the least probable component, or grow.
                let k = if used < MIXTURES {
                    used += 1;
                    used - 1
                } else {
                    MIXTURES - 1
                };
                weights[k] = INITIAL_WEIGHT;
                for ch in 0..c {
                    means[k * c + ch] = pixel[ch] as f32;
                    variances[k * c + ch] = MIN_VARIANCE;
                }
                k
            }
        };

        let total: f32 = weights[..used].iter().sum();
        if total > 0.0 {
            for w in &mut weights[..used] {
                *w /= total;
            }
        }

        for a in 1..used {
            let mut b = a;
            while b > 0
                && sort_key(weights[b], &variances[b * c..(b + 1) * c])
                    > sort_key(weights[b - 1], &variances[(b - 1) * c..b * c])
            {
                weights.swap(b, b - 1);
                swap_records(variances, c, b, b - 1);
                swap_records(means, c, b, b - 1);
                if tracked == b {
                    tracked = b - 1;
                } else if tracked == b - 1 {
                    tracked = b;
                }
                b -= 1;
            }
        }

        self.used[i] = used as u8;

        if tracked < background_components(&weights[..used]) {
            BACKGROUND
        } else {
            FOREGROUND
        }
    }

    fn background_pixel(&self, i: usize, out: &mut [u8]) {
        let c = self.geometry.channels;
        let base = i * MIXTURES;
        let used = self.used[i] as usize;
        let weights = &self.weights[base..base + used];
        let count = background_components(weights);

        let total: f32 = weights[..count].iter().sum();
        if total <= 0.0 {
            return;
        }
        for (ch, o) in out.iter_mut().enumerate() {
            let sum: f32 = (0..count)
                .map(|k| weights[k] * self.means[(base + k) * c + ch])
                .sum();
            *o = to_sample(sum / total);
        }
    }
}

impl BackgroundModel for MogModel {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Mog
    }

    fn apply(&mut self, frame: &Frame) -> Result<Mask, PipelineError> {
        let mixture = self
            .mixture
            .get_or_insert_with(|| Mixture::new(Geometry::of(frame)));
        mixture.geometry.check(frame)?;

        self.frames_seen += 1;
        let alpha = adaptive_rate(self.frames_seen, self.history, 1);
        let c = mixture.geometry.channels;

        let data: Vec<u8> = frame
            .data()
            .chunks_exact(c)
            .enumerate()
            .map(|(i, pixel)| mixture.update(i, pixel, alpha))
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
