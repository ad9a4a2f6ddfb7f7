use std::collections::BTreeMap;
use std::time::Instant;

/// Observer for driver events: progress, per-stage timings and metrics.
///
/// The driver reports through this trait only, so a caller can route run
/// information to the console, a test recorder or nowhere.
pub trait PipelineLogger: Send {
    /// `current` counts frames of the current pass over the source; `total`
    /// is the pass length, or 0 for live sources.
    fn progress(&mut self, current: usize, total: usize);

    /// Duration of one named stage for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Point-in-time value, e.g. the foreground ratio of a cleaned mask.
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// Called once when the run ends. Default: no-op.
    fn summary(&self) {}
}

pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Running aggregate of a stream of samples. Constant size, so a file
/// source looping for hours does not grow it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunningStat {
    pub count: usize,
    pub total: f64,
    pub min: f64,
    pub max: f64,
}

impl RunningStat {
    fn first(value: f64) -> Self {
        Self {
            count: 1,
            total: value,
            min: value,
            max: value,
        }
    }

    fn push(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn mean(&self) -> f64 {
        self.total / self.count.max(1) as f64
    }
}

fn record(map: &mut BTreeMap<String, RunningStat>, key: &str, value: f64) {
    match map.get_mut(key) {
        Some(stat) => stat.push(value),
        None => {
            map.insert(key.to_string(), RunningStat::first(value));
        }
    }
}

/// Console logger for CLI runs.
///
/// Progress goes through `log::info!` every `throttle_frames` frames and at
/// the end of each pass. Rewinds are detected from `current` restarting at
/// 1, so the summary can report how many passes a looping file made.
pub struct StdoutPipelineLogger {
    throttle_frames: usize,
    stages: BTreeMap<String, RunningStat>,
    metrics: BTreeMap<String, RunningStat>,
    started: Instant,
    frames_seen: usize,
    passes: usize,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            stages: BTreeMap::new(),
            metrics: BTreeMap::new(),
            started: Instant::now(),
            frames_seen: 0,
            passes: 0,
        }
    }

    pub fn stage(&self, name: &str) -> Option<&RunningStat> {
        self.stages.get(name)
    }

    pub fn metric_stat(&self, name: &str) -> Option<&RunningStat> {
        self.metrics.get(name)
    }

    pub fn frames_seen(&self) -> usize {
        self.frames_seen
    }

    pub fn passes(&self) -> usize {
        self.passes
    }

    /// End-of-run report, or `None` before the first frame.
    pub fn summary_string(&self) -> Option<String> {
        if self.frames_seen == 0 {
            return None;
        }
        let wall_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let pass_note = if self.passes > 1 {
            format!(", {} passes", self.passes)
        } else {
            String::new()
        };
        let mut out = vec![format!(
            "Segmentation summary ({} frames{pass_note}, {:.1}s):",
            self.frames_seen,
            wall_ms / 1000.0
        )];

        for (name, stat) in &self.stages {
            let share = if wall_ms > 0.0 {
                stat.total / wall_ms * 100.0
            } else {
                0.0
            };
            out.push(format!(
                "  {name:8} mean {:6.2}ms  max {:7.2}ms  ({share:4.1}% of wall time)",
                stat.mean(),
                stat.max
            ));
        }
        for (name, stat) in &self.metrics {
            out.push(format!(
                "  {name}: mean {:.3}  min {:.3}  max {:.3}",
                stat.mean(),
                stat.min,
                stat.max
            ));
        }
        if wall_ms > 0.0 {
            let fps = self.frames_seen as f64 * 1000.0 / wall_ms;
            out.push(format!("  {fps:.1} frames/s"));
        }
        Some(out.join("\n"))
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, current: usize, total: usize) {
        self.frames_seen += 1;
        if current <= 1 {
            self.passes += 1;
        }
        let pass_done = total > 0 && current == total;
        if current % self.throttle_frames != 0 && !pass_done {
            return;
        }
        if total > 0 {
            log::info!(
                "Pass {}: frame {current}/{total} ({:.0}%)",
                self.passes,
                current as f64 / total as f64 * 100.0
            );
        } else {
            log::info!("Frames processed: {}", self.frames_seen);
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        record(&mut self.stages, stage, duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        record(&mut self.metrics, name, value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n{text}");
        }
    }
}
