use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::presentation::domain::frame_presenter::{FramePresenter, SegmentationOutput};
use crate::shared::error::PipelineError;

/// Runs an inner presenter on its own thread behind a bounded queue.
///
/// When the queue is full the oldest pending output is discarded, so
/// `present` never waits on a slow consumer. A failure of the inner
/// presenter stops the worker; later `present` calls fail and `close`
/// returns the original error.
pub struct ThreadedPresenter {
    sender: Option<Sender<SegmentationOutput>>,
    /// Our handle on the queue, used to evict the oldest entry.
    evictor: Receiver<SegmentationOutput>,
    worker: Option<JoinHandle<Result<(), PipelineError>>>,
    failed: Arc<AtomicBool>,
    dropped: usize,
}

impl ThreadedPresenter {
    pub fn spawn(
        mut inner: Box<dyn FramePresenter>,
        capacity: usize,
    ) -> Result<Self, PipelineError> {
        if capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "presenter queue capacity must be at least 1".to_string(),
            ));
        }
        let (sender, receiver) = crossbeam_channel::bounded::<SegmentationOutput>(capacity);
        let evictor = receiver.clone();
        let failed = Arc::new(AtomicBool::new(false));
        let worker_failed = Arc::clone(&failed);

        let worker = std::thread::Builder::new()
            .name("presenter".to_string())
            .spawn(move || {
                for output in receiver.iter() {
                    if let Err(e) = inner.present(&output) {
                        log::error!("Presenter failed on frame {}: {e}", output.index());
                        worker_failed.store(true, Ordering::Release);
                        if let Err(close_err) = inner.close() {
                            log::warn!("Presenter close after failure also failed: {close_err}");
                        }
                        return Err(e);
                    }
                }
                inner.close()
            })?;

        Ok(Self {
            sender: Some(sender),
            evictor,
            worker: Some(worker),
            failed,
            dropped: 0,
        })
    }

    /// Outputs discarded because the queue was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl FramePresenter for ThreadedPresenter {
    fn present(&mut self, output: &SegmentationOutput) -> Result<(), PipelineError> {
        if self.failed.load(Ordering::Acquire) {
            return Err(PipelineError::Presentation(
                "presenter thread stopped after an error".to_string(),
            ));
        }
        let sender = self.sender.as_ref().ok_or_else(|| {
            PipelineError::Presentation("threaded presenter is closed".to_string())
        })?;

        let mut pending = output.clone();
        loop {
            match sender.try_send(pending) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(back)) => {
                    pending = back;
                    if let Ok(oldest) = self.evictor.try_recv() {
                        self.dropped += 1;
                        log::debug!("Presenter queue full, dropped frame {}", oldest.index());
                    }
                }
                Err(TrySendError::Disconnected(_)) => {
                    return Err(PipelineError::Presentation(
                        "presenter thread is gone".to_string(),
                    ))
                }
            }
        }
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        drop(self.sender.take());
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        if self.dropped > 0 {
            log::info!("Presenter dropped {} frame(s) to keep up", self.dropped);
        }
        match worker.join() {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Presentation(
                "presenter thread panicked".to_string(),
            )),
        }
    }
}

impl Drop for ThreadedPresenter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Threaded presenter closed with error: {e}");
        }
    }
}
