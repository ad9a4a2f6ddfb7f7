use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::acquisition::domain::frame_source::{FrameSource, SourceKind};
use crate::acquisition::infrastructure::source_factory::open_source;
use crate::modeling::domain::model_config::ModelConfig;
use crate::modeling::infrastructure::model_factory::create_model;
use crate::presentation::domain::frame_presenter::FramePresenter;
use crate::shared::error::PipelineError;
use crate::shared::settings::PipelineSettings;
use crate::shared::video_metadata::StreamMetadata;

use super::pipeline_driver::{PipelineDriver, RunSummary};
use super::pipeline_logger::PipelineLogger;

/// Everything needed to build a segmentation run.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub source_kind: SourceKind,
    /// Video file or image directory; required for file sources.
    pub locator: Option<PathBuf>,
    pub camera_index: u32,
    pub model: ModelConfig,
    pub settings: PipelineSettings,
}

/// Builds the presenter once the stream shape is known.
pub type PresenterFactory<'a> =
    Box<dyn FnOnce(&StreamMetadata) -> Result<Box<dyn FramePresenter>, PipelineError> + 'a>;

/// Wires a request into a ready [`PipelineDriver`] and runs it.
///
/// Everything is opened eagerly in `new`; if any step fails whatever was
/// already opened is released and no pipeline exists. This is a single-use
/// struct.
pub struct SegmentStreamUseCase {
    driver: Option<PipelineDriver>,
    cancelled: Arc<AtomicBool>,
}

impl SegmentStreamUseCase {
    pub fn new(
        request: PipelineRequest,
        logger: Box<dyn PipelineLogger>,
        build_presenter: PresenterFactory<'_>,
    ) -> Result<Self, PipelineError> {
        request.settings.validate()?;
        let source = open_source(
            request.source_kind,
            request.locator.as_deref(),
            request.camera_index,
        )?;
        Self::with_source(source, &request.model, &request.settings, logger, build_presenter)
    }

    /// Like [`SegmentStreamUseCase::new`] for a source that is already open.
    pub fn with_source(
        mut source: Box<dyn FrameSource>,
        model: &ModelConfig,
        settings: &PipelineSettings,
        logger: Box<dyn PipelineLogger>,
        build_presenter: PresenterFactory<'_>,
    ) -> Result<Self, PipelineError> {
        if let Err(e) = settings.validate() {
            source.close();
            return Err(e);
        }
        let presenter = match build_presenter(source.metadata()) {
            Ok(presenter) => presenter,
            Err(e) => {
                source.close();
                return Err(e);
            }
        };

        let meta = source.metadata();
        log::info!(
            "Segmenting {} source {}x{} @ {:.2} fps with {} (history {}, shadows {}, kernel {})",
            source.kind(),
            meta.width,
            meta.height,
            meta.fps,
            model.algorithm(),
            model.history(),
            if model.shadows_enabled() { "on" } else { "off" },
            settings.kernel_size
        );
        if model.detect_shadows() && !model.shadows_enabled() {
            log::info!("{} has no shadow detection; flag ignored", model.algorithm());
        }

        let background = create_model(model);
        let driver = PipelineDriver::new(source, background, presenter, settings)?.with_logger(logger);
        let cancelled = driver.cancel_handle();
        Ok(Self {
            driver: Some(driver),
            cancelled,
        })
    }

    /// Flag that stops the run after the current iteration once set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn execute(&mut self) -> Result<RunSummary, PipelineError> {
        let mut driver = self.driver.take().ok_or_else(|| {
            PipelineError::InvalidConfig("pipeline already executed".to_string())
        })?;
        driver.run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::infrastructure::memory_frame_source::MemoryFrameSource;
    use crate::modeling::domain::model_config::Algorithm;
    use crate::modeling::infrastructure::test_scenes::{solid, square};
    use crate::pipeline::pipeline_driver::StopReason;
    use crate::pipeline::pipeline_logger::{NullPipelineLogger, StdoutPipelineLogger};
    use crate::presentation::domain::frame_presenter::{NullPresenter, SegmentationOutput};
    use crate::presentation::infrastructure::image_sequence_presenter::ImageSequencePresenter;
    use crate::shared::frame::Frame;
    use rstest::rstest;
    use std::sync::Mutex;

    fn frames(count: usize) -> Vec<Frame> {
        (0..count).map(|i| Frame::zeros(16, 12, 3, i)).collect()
    }

    fn null_presenter<'a>() -> PresenterFactory<'a> {
        Box::new(|_: &StreamMetadata| Ok(Box::new(NullPresenter::new()) as Box<dyn FramePresenter>))
    }

    struct CountingPresenter {
        presented: Arc<Mutex<Vec<usize>>>,
    }

    impl FramePresenter for CountingPresenter {
        fn present(&mut self, output: &SegmentationOutput) -> Result<(), PipelineError> {
            self.presented.lock().unwrap().push(output.index());
            Ok(())
        }

        fn close(&mut self) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    fn settings(max_frames: Option<usize>) -> PipelineSettings {
        PipelineSettings {
            transient_retry_delay_ms: 0,
            max_frames,
            ..PipelineSettings::default()
        }
    }

    #[rstest]
    #[case(Algorithm::Mog)]
    #[case(Algorithm::Mog2)]
    #[case(Algorithm::Gmg)]
    #[case(Algorithm::Knn)]
    fn test_every_algorithm_runs_a_looping_clip(#[case] algorithm: Algorithm) {
        let source = MemoryFrameSource::new(frames(4), SourceKind::File).unwrap();
        let presented = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&presented);
        let model = ModelConfig::new(algorithm, 50, true).unwrap();

        let mut use_case = SegmentStreamUseCase::with_source(
            Box::new(source),
            &model,
            &settings(Some(10)),
            Box::new(StdoutPipelineLogger::new(5)),
            Box::new(move |_: &StreamMetadata| {
                Ok(Box::new(CountingPresenter { presented: sink }) as Box<dyn FramePresenter>)
            }),
        )
        .unwrap();

        let summary = use_case.execute().unwrap();
        assert_eq!(summary.reason, StopReason::FrameLimit);
        assert_eq!(summary.loops, 2);
        assert_eq!(*presented.lock().unwrap(), vec![0, 1, 2, 3, 0, 1, 2, 3, 0, 1]);
    }

    struct MaskPresenter {
        masks: Arc<Mutex<Vec<(bool, usize)>>>,
    }

    impl FramePresenter for MaskPresenter {
        fn present(&mut self, output: &SegmentationOutput) -> Result<(), PipelineError> {
            self.masks
                .lock()
                .unwrap()
                .push((output.mask.is_binary(), output.mask.foreground_count()));
            Ok(())
        }

        fn close(&mut self) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    /// A 200x200 white square entering a learned black 320x240 scene and moving
    /// 40 px per frame stays close to its full area of 40000 pixels: each
    /// covered pixel is a fresh mode whose weight trails the background's.
    /// Slower motion over the same pixels is absorbed sooner.
    #[test]
    fn test_mog2_segments_moving_square_end_to_end() {
        let (w, h) = (320, 240);
        let mut clip: Vec<Frame> = (0..50).map(|_| solid(w, h, 0)).collect();
        clip.extend((0..3).map(|step| square(w, h, 0, 255, (step * 40, 20), 200)));

        let masks = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&masks);
        let mut use_case = SegmentStreamUseCase::with_source(
            Box::new(MemoryFrameSource::new(clip, SourceKind::Live).unwrap()),
            &ModelConfig::new(Algorithm::Mog2, 50, true).unwrap(),
            &settings(None),
            Box::new(NullPipelineLogger),
            Box::new(move |_: &StreamMetadata| {
                Ok(Box::new(MaskPresenter { masks: sink }) as Box<dyn FramePresenter>)
            }),
        )
        .unwrap();

        let summary = use_case.execute().unwrap();
        assert_eq!(summary.reason, StopReason::SourceExhausted);
        assert_eq!(summary.frames_processed, 53);

        let masks = masks.lock().unwrap();
        assert!(masks.iter().all(|&(binary, _)| binary));
        assert!(masks[10..50].iter().all(|&(_, count)| count == 0));
        let (_, count) = masks[52];
        assert!(
            (39_000..=41_000).contains(&count),
            "expected about 40000 foreground pixels, got {count}"
        );
    }

    #[test]
    fn test_presenter_sees_stream_metadata() {
        let source = MemoryFrameSource::new(frames(2), SourceKind::Live).unwrap();
        let seen = Arc::new(Mutex::new(None));
        let seen_in_factory = Arc::clone(&seen);
        let mut use_case = SegmentStreamUseCase::with_source(
            Box::new(source),
            &ModelConfig::with_defaults(Algorithm::Knn),
            &settings(None),
            Box::new(NullPipelineLogger),
            Box::new(move |meta: &StreamMetadata| {
                *seen_in_factory.lock().unwrap() = Some((meta.width, meta.height));
                Ok(Box::new(NullPresenter::new()) as Box<dyn FramePresenter>)
            }),
        )
        .unwrap();
        assert_eq!(*seen.lock().unwrap(), Some((16, 12)));

        let summary = use_case.execute().unwrap();
        assert_eq!(summary.reason, StopReason::SourceExhausted);
        assert_eq!(summary.frames_processed, 2);
    }

    #[test]
    fn test_execute_twice_fails() {
        let source = MemoryFrameSource::new(frames(1), SourceKind::Live).unwrap();
        let mut use_case = SegmentStreamUseCase::with_source(
            Box::new(source),
            &ModelConfig::with_defaults(Algorithm::Mog),
            &settings(None),
            Box::new(NullPipelineLogger),
            null_presenter(),
        )
        .unwrap();
        use_case.execute().unwrap();
        assert!(matches!(use_case.execute(), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_cancel_handle_stops_run() {
        let source = MemoryFrameSource::new(frames(3), SourceKind::File).unwrap();
        let mut use_case = SegmentStreamUseCase::with_source(
            Box::new(source),
            &ModelConfig::with_defaults(Algorithm::Mog2),
            &settings(None),
            Box::new(NullPipelineLogger),
            null_presenter(),
        )
        .unwrap();
        use_case
            .cancel_handle()
            .store(true, std::sync::atomic::Ordering::Relaxed);
        let summary = use_case.execute().unwrap();
        assert_eq!(summary.reason, StopReason::Cancelled);
        assert_eq!(summary.frames_processed, 0);
    }

    #[test]
    fn test_presenter_failure_aborts_construction() {
        let source = MemoryFrameSource::new(frames(1), SourceKind::File).unwrap();
        let result = SegmentStreamUseCase::with_source(
            Box::new(source),
            &ModelConfig::with_defaults(Algorithm::Mog2),
            &settings(None),
            Box::new(NullPipelineLogger),
            Box::new(|_: &StreamMetadata| Err(PipelineError::Presentation("no display".to_string()))),
        );
        assert!(matches!(result, Err(PipelineError::Presentation(_))));
    }

    #[test]
    fn test_file_request_without_locator_fails() {
        let request = PipelineRequest {
            source_kind: SourceKind::File,
            locator: None,
            camera_index: 0,
            model: ModelConfig::with_defaults(Algorithm::Mog2),
            settings: PipelineSettings::default(),
        };
        let result = SegmentStreamUseCase::new(request, Box::new(NullPipelineLogger), null_presenter());
        assert!(matches!(result, Err(PipelineError::SourceUnavailable(_))));
    }

    #[test]
    fn test_invalid_settings_fail_before_opening_source() {
        let request = PipelineRequest {
            source_kind: SourceKind::File,
            locator: Some(PathBuf::from("/nonexistent/clip.avi")),
            camera_index: 0,
            model: ModelConfig::with_defaults(Algorithm::Mog2),
            settings: PipelineSettings {
                kernel_size: 2,
                ..PipelineSettings::default()
            },
        };
        let result = SegmentStreamUseCase::new(request, Box::new(NullPipelineLogger), null_presenter());
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_image_directory_request_writes_snapshots() {
        let input = tempfile::tempdir().unwrap();
        for i in 0..3 {
            image::RgbImage::from_pixel(16, 12, image::Rgb([i * 40, 10, 10]))
                .save(input.path().join(format!("img_{i}.png")))
                .unwrap();
        }
        let output = tempfile::tempdir().unwrap();
        let out_dir = output.path().to_path_buf();

        let request = PipelineRequest {
            source_kind: SourceKind::File,
            locator: Some(input.path().to_path_buf()),
            camera_index: 0,
            model: ModelConfig::new(Algorithm::Mog2, 10, false).unwrap(),
            settings: settings(Some(3)),
        };
        let mut use_case = SegmentStreamUseCase::new(
            request,
            Box::new(NullPipelineLogger),
            Box::new(move |_: &StreamMetadata| {
                Ok(Box::new(ImageSequencePresenter::new(&out_dir, 1)?) as Box<dyn FramePresenter>)
            }),
        )
        .unwrap();
        let summary = use_case.execute().unwrap();
        assert_eq!(summary.frames_processed, 3);

        for view in ["original", "background", "mask", "segmented"] {
            let count = std::fs::read_dir(output.path().join(view)).unwrap().count();
            assert_eq!(count, 3, "{view}");
        }
    }
}
