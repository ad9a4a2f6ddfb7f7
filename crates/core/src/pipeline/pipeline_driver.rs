use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::acquisition::domain::frame_source::{FrameSource, ReadOutcome};
use crate::modeling::domain::background_model::BackgroundModel;
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::presentation::domain::frame_presenter::{FramePresenter, SegmentationOutput};
use crate::segmentation::domain::frame_compositor::compose;
use crate::segmentation::domain::mask_processor::MaskProcessor;
use crate::shared::error::PipelineError;
use crate::shared::frame::Frame;
use crate::shared::settings::PipelineSettings;

/// Lifecycle of a [`PipelineDriver`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Initializing,
    Running,
    /// Rewinding a file-backed source after it ran out.
    Looping,
    /// Releasing resources after an unrecoverable error.
    Draining,
    Terminated,
}

/// Why a run ended without error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    /// A source that cannot rewind reported end of stream.
    SourceExhausted,
    FrameLimit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_processed: usize,
    pub loops: usize,
    pub transient_failures: usize,
    pub reason: StopReason,
}

#[derive(Default)]
struct Counters {
    frames: usize,
    since_rewind: usize,
    loops: usize,
    transient: usize,
}

impl Counters {
    fn finish(&self, reason: StopReason) -> RunSummary {
        RunSummary {
            frames_processed: self.frames,
            loops: self.loops,
            transient_failures: self.transient,
            reason,
        }
    }
}

/// Drives one source through a background model, mask cleanup and
/// compositing into a presenter.
///
/// The driver owns every collaborator. Frames are processed strictly one at
/// a time; cancellation is checked between iterations. File sources loop
/// until cancelled or until the frame limit is hit, live sources end when
/// they stop producing. Whatever the outcome, the source and presenter are
/// closed exactly once.
pub struct PipelineDriver {
    source: Box<dyn FrameSource>,
    model: Box<dyn BackgroundModel>,
    processor: MaskProcessor,
    presenter: Box<dyn FramePresenter>,
    logger: Box<dyn PipelineLogger>,
    cancelled: Arc<AtomicBool>,
    retry_delay: Duration,
    max_frames: Option<usize>,
    state: DriverState,
    released: bool,
}

impl PipelineDriver {
    pub fn new(
        source: Box<dyn FrameSource>,
        model: Box<dyn BackgroundModel>,
        presenter: Box<dyn FramePresenter>,
        settings: &PipelineSettings,
    ) -> Result<Self, PipelineError> {
        settings.validate()?;
        Ok(Self {
            source,
            model,
            processor: MaskProcessor::new(settings.kernel_size)?,
            presenter,
            logger: Box::new(NullPipelineLogger),
            cancelled: Arc::new(AtomicBool::new(false)),
            retry_delay: Duration::from_millis(settings.transient_retry_delay_ms),
            max_frames: settings.max_frames,
            state: DriverState::Initializing,
            released: false,
        })
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Shares an externally owned cancellation flag (e.g. a Ctrl-C handler).
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = flag;
        self
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Processes frames until cancellation, exhaustion, the frame limit or
    /// an error. A driver runs once.
    pub fn run(&mut self) -> Result<RunSummary, PipelineError> {
        if self.state != DriverState::Initializing {
            return Err(PipelineError::InvalidConfig(
                "pipeline driver can only run once".to_string(),
            ));
        }
        self.transition(DriverState::Running);

        match self.run_loop() {
            Ok(summary) => {
                let released = self.release();
                self.transition(DriverState::Terminated);
                released?;
                self.logger.info(&format!(
                    "Pipeline finished ({:?}): {} frames, {} loops, {} transient read failures",
                    summary.reason,
                    summary.frames_processed,
                    summary.loops,
                    summary.transient_failures
                ));
                self.logger.summary();
                Ok(summary)
            }
            Err(e) => {
                log::error!("Pipeline failed: {e}");
                self.transition(DriverState::Draining);
                if let Err(release_err) = self.release() {
                    log::warn!("Release after failure also failed: {release_err}");
                }
                self.transition(DriverState::Terminated);
                self.logger.summary();
                Err(e)
            }
        }
    }

    /// Closes the source and the presenter. Later calls do nothing.
    pub fn release(&mut self) -> Result<(), PipelineError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.source.close();
        self.presenter.close()
    }

    fn transition(&mut self, next: DriverState) {
        match next {
            DriverState::Looping => log::debug!("Pipeline state: {:?} -> {next:?}", self.state),
            _ => log::info!("Pipeline state: {:?} -> {next:?}", self.state),
        }
        self.state = next;
    }

    fn run_loop(&mut self) -> Result<RunSummary, PipelineError> {
        let total = self.source.metadata().total_frames;
        let mut counters = Counters::default();

        loop {
            if self.cancelled.load(Ordering::Relaxed) {
                return Ok(counters.finish(StopReason::Cancelled));
            }

            match self.source.next()? {
                ReadOutcome::Frame(frame) => {
                    self.process(frame)?;
                    counters.frames += 1;
                    counters.since_rewind += 1;
                    self.logger.progress(counters.since_rewind, total);

                    if self.max_frames.is_some_and(|max| counters.frames >= max) {
                        return Ok(counters.finish(StopReason::FrameLimit));
                    }
                }
                ReadOutcome::Unavailable => {
                    counters.transient += 1;
                    log::debug!("Frame unavailable, retrying in {:?}", self.retry_delay);
                    if !self.retry_delay.is_zero() {
                        std::thread::sleep(self.retry_delay);
                    }
                }
                ReadOutcome::EndOfStream => {
                    if !self.source.is_seekable() {
                        return Ok(counters.finish(StopReason::SourceExhausted));
                    }
                    if counters.since_rewind == 0 {
                        return Err(PipelineError::SourceUnavailable(
                            "stream produced no frames after rewind".to_string(),
                        ));
                    }
                    self.transition(DriverState::Looping);
                    self.source.reset()?;
                    counters.loops += 1;
                    self.logger.info(&format!(
                        "Source exhausted after {} frames, rewinding (loop {})",
                        counters.since_rewind, counters.loops
                    ));
                    counters.since_rewind = 0;
                    self.transition(DriverState::Running);
                }
            }
        }
    }

    fn process(&mut self, frame: Frame) -> Result<(), PipelineError> {
        let t = Instant::now();
        let raw = self.model.apply(&frame)?;
        self.logger.timing("apply", elapsed_ms(t));

        let t = Instant::now();
        let mask = self.processor.clean(&raw);
        self.logger.timing("clean", elapsed_ms(t));

        let t = Instant::now();
        let background = self.model.estimate()?;
        let composited = compose(&frame, &mask)?;
        self.logger.timing("compose", elapsed_ms(t));
        self.logger.metric("foreground_ratio", mask.foreground_ratio());

        let output = SegmentationOutput {
            frame,
            background,
            mask,
            composited,
        };
        let t = Instant::now();
        self.presenter.present(&output)?;
        self.logger.timing("present", elapsed_ms(t));
        Ok(())
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

impl Drop for PipelineDriver {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("Failed to release pipeline resources: {e}");
        }
    }
}
