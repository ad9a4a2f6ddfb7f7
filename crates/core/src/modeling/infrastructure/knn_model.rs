use crate::modeling::domain::background_model::BackgroundModel;
use crate::modeling::domain::model_config::Algorithm;
use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;
use crate::shared::mask::{Mask, BACKGROUND, FOREGROUND, SHADOW};

use super::pixel_math::{adaptive_rate, copy_record, is_shadow_of, not_applied, to_sample, Geometry};

const SAMPLES_PER_BANK: usize = 7;
/// Short, mid and long term banks.
const BANKS: usize = 3;
const SAMPLES: usize = SAMPLES_PER_BANK * BANKS;
const NEIGHBOURS: usize = 3;
const DISTANCE_THRESHOLD: f32 = 400.0;
const SHADOW_TAU: f32 = 0.5;

const SHORT: usize = 0;
const MID: usize = 1;
const LONG: usize = 2;

/// Non-parametric K-nearest-neighbours model (Zivkovic & van der Heijden).
///
/// Each pixel keeps three banks of recent samples. The short bank is
/// refreshed from the incoming frame, the mid bank from the short one and the
/// long bank from the mid one, each at a rate that approximates the
/// exponential forgetting curve for the current learning rate.
pub struct KnnModel {
    history: usize,
    detect_shadows: bool,
    frames_seen: usize,
    counters: [usize; BANKS],
    bank: Option<SampleBank>,
}

struct SampleBank {
    geometry: Geometry,
    samples: Vec<u8>,
    included: Vec<bool>,
    /// Next slot to overwrite in each bank, per pixel.
    cursors: Vec<[u8; BANKS]>,
}

/// Refresh periods, in frames, of the short, mid and long banks.
fn refresh_periods(alpha: f32) -> [usize; BANKS] {
    let decay = (1.0 - alpha as f64).ln();
    let span = |keep: f64| -> i64 {
        if decay.is_finite() && decay < 0.0 {
            (keep.ln() / decay) as i64
        } else {
            0
        }
    };
    let k_short = span(0.7) + 1;
    let k_mid = span(0.4) - k_short + 1;
    let k_long = span(0.1) - k_short - k_mid + 1;
    [k_short, k_mid, k_long].map(|k| k.max(0) as usize / SAMPLES_PER_BANK + 1)
}

/// Spreads the refresh of neighbouring pixels over the period.
fn phase(i: usize, period: usize) -> usize {
    ((i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32) as usize % period
}

fn sample_distance(pixel: &[u8], sample: &[u8]) -> f32 {
    pixel
        .iter()
        .zip(sample)
        .map(|(&p, &s)| {
            let d = p as f32 - s as f32;
            d * d
        })
        .sum()
}

impl SampleBank {
    fn seeded(frame: &Frame) -> Self {
        let geometry = Geometry::of(frame);
        let c = geometry.channels;
        let mut samples = Vec::with_capacity(geometry.pixels() * SAMPLES * c);
        for pixel in frame.data().chunks_exact(c) {
            for _ in 0..SAMPLES {
                samples.extend_from_slice(pixel);
            }
        }
        Self {
            geometry,
            samples,
            included: vec![true; geometry.pixels() * SAMPLES],
            cursors: vec![[0; BANKS]; geometry.pixels()],
        }
    }

    fn classify(&self, i: usize, pixel: &[u8], detect_shadows: bool) -> (u8, bool) {
        let c = self.geometry.channels;
        let samples = &self.samples[i * SAMPLES * c..(i + 1) * SAMPLES * c];
        let included = &self.included[i * SAMPLES..(i + 1) * SAMPLES];

        let mut near = 0;
        let mut near_included = 0;
        for (sample, &inc) in samples.chunks_exact(c).zip(included) {
            if sample_distance(pixel, sample) < DISTANCE_THRESHOLD {
                near += 1;
                if inc {
                    near_included += 1;
                    if near_included >= NEIGHBOURS {
                        return (BACKGROUND, true);
                    }
                }
            }
        }
        let include = near >= NEIGHBOURS;

        if detect_shadows {
            let mut shadows = 0;
            let mut mean = vec![0.0f32; c];
            for (sample, &inc) in samples.chunks_exact(c).zip(included) {
                if !inc {
                    continue;
                }
                for (m, &s) in mean.iter_mut().zip(sample) {
                    *m = s as f32;
                }
                if is_shadow_of(pixel, &mean, DISTANCE_THRESHOLD, SHADOW_TAU) {
                    shadows += 1;
                    if shadows >= NEIGHBOURS {
                        return (SHADOW, include);
                    }
                }
            }
        }
        (FOREGROUND, include)
    }

    fn refresh(&mut self, i: usize, pixel: &[u8], include: bool, due: [bool; BANKS]) {
        let c = self.geometry.channels;
        let slot = |bank: usize, cursor: u8| i * SAMPLES + bank * SAMPLES_PER_BANK + cursor as usize;
        let cursors = &mut self.cursors[i];

        if due[LONG] {
            let from = slot(MID, cursors[MID]);
            let to = slot(LONG, cursors[LONG]);
            copy_record(&mut self.samples, c, from, to);
            self.included[to] = self.included[from];
            cursors[LONG] = (cursors[LONG] + 1) % SAMPLES_PER_BANK as u8;
        }
        if due[MID] {
            let from = slot(SHORT, cursors[SHORT]);
            let to = slot(MID, cursors[MID]);
            copy_record(&mut self.samples, c, from, to);
            self.included[to] = self.included[from];
            cursors[MID] = (cursors[MID] + 1) % SAMPLES_PER_BANK as u8;
        }
        if due[SHORT] {
            let to = slot(SHORT, cursors[SHORT]);
            self.samples[to * c..(to + 1) * c].copy_from_slice(pixel);
            self.included[to] = include;
            cursors[SHORT] = (cursors[SHORT] + 1) % SAMPLES_PER_BANK as u8;
        }
    }

    fn background_pixel(&self, i: usize, out: &mut [u8]) {
        let c = self.geometry.channels;
        let samples = &self.samples[i * SAMPLES * c..(i + 1) * SAMPLES * c];
        let included = &self.included[i * SAMPLES..(i + 1) * SAMPLES];
        let any_included = included.iter().any(|&inc| inc);

        let mut acc = vec![0.0f32; c];
        let mut count = 0usize;
        for (sample, &inc) in samples.chunks_exact(c).zip(included) {
            if inc || !any_included {
                for (a, &s) in acc.iter_mut().zip(sample) {
                    *a += s as f32;
                }
                count += 1;
            }
        }
        for (o, a) in out.iter_mut().zip(&acc) {
            *o = to_sample(a / count.max(1) as f32);
        }
    }
}

impl KnnModel {
    pub fn new(history: usize, detect_shadows: bool) -> Self {
        Self {
            history,
            detect_shadows,
            frames_seen: 0,
            counters: [0; BANKS],
            bank: None,
        }
    }
}

impl BackgroundModel for KnnModel {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Knn
    }

    fn apply(&mut self, frame: &Frame) -> Result<Mask, PipelineError> {
        let bank = self.bank.get_or_insert_with(|| SampleBank::seeded(frame));
        bank.geometry.check(frame)?;

        self.frames_seen += 1;
        let periods = refresh_periods(adaptive_rate(self.frames_seen, self.history, 2));
        for (counter, &period) in self.counters.iter_mut().zip(&periods) {
            if *counter >= period {
                *counter = 0;
            }
        }

        let c = bank.geometry.channels;
        let mut data = Vec::with_capacity(bank.geometry.pixels());
        for (i, pixel) in frame.data().chunks_exact(c).enumerate() {
            let (label, include) = bank.classify(i, pixel, self.detect_shadows);
            let due = [SHORT, MID, LONG].map(|b| self.counters[b] == phase(i, periods[b]));
            bank.refresh(i, pixel, include, due);
            data.push(label);
        }

        for counter in &mut self.counters {
            *counter += 1;
        }
        Ok(Mask::new(data, frame.width(), frame.height()))
    }

    fn estimate(&self) -> Result<Frame, PipelineError> {
        let bank = self.bank.as_ref().ok_or_else(not_applied)?;
        let g = bank.geometry;
        let mut data = vec![0u8; g.pixels() * g.channels];
        for (i, out) in data.chunks_exact_mut(g.channels).enumerate() {
            bank.background_pixel(i, out);
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
