use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::Ordering;

use clap::Parser;

use motion_segment_core::acquisition::domain::frame_source::SourceKind;
use motion_segment_core::modeling::domain::model_config::{Algorithm, ModelConfig};
use motion_segment_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use motion_segment_core::pipeline::segment_stream_use_case::{
    PipelineRequest, SegmentStreamUseCase,
};
use motion_segment_core::presentation::domain::frame_presenter::{
    FanOutPresenter, FramePresenter, NullPresenter,
};
use motion_segment_core::presentation::infrastructure::ffmpeg_video_presenter::FfmpegVideoPresenter;
use motion_segment_core::presentation::infrastructure::image_sequence_presenter::ImageSequencePresenter;
use motion_segment_core::presentation::infrastructure::threaded_presenter::ThreadedPresenter;
use motion_segment_core::shared::constants::{
    DEFAULT_CAMERA_INDEX, DEFAULT_DETECT_SHADOWS, DEFAULT_HISTORY,
};
use motion_segment_core::shared::error::PipelineError;
use motion_segment_core::shared::settings::PipelineSettings;
use motion_segment_core::shared::video_metadata::StreamMetadata;

/// Segments moving objects from a camera or a video file.
#[derive(Parser, Debug)]
#[command(name = "motion-segment")]
struct Cli {
    /// Frame source.
    #[arg(long, value_parser = ["camera", "arquivo"])]
    fonte: String,

    /// Background model.
    #[arg(long, value_parser = ["MOG", "MOG2", "GMG", "KNN"])]
    algoritmo: String,

    /// Video file or image directory (required with --fonte arquivo).
    #[arg(long)]
    arquivo: Option<PathBuf>,

    /// Frames of history (initialization frames for GMG).
    #[arg(long, default_value_t = DEFAULT_HISTORY, allow_negative_numbers = true)]
    history: i64,

    /// Label shadows separately (MOG2 and KNN only).
    #[arg(long = "detect_shadows", default_value_t = DEFAULT_DETECT_SHADOWS, action = clap::ArgAction::Set)]
    detect_shadows: bool,

    /// Camera index for --fonte camera.
    #[arg(long, default_value_t = DEFAULT_CAMERA_INDEX)]
    camera: u32,

    /// Morphology kernel size (odd).
    #[arg(long)]
    kernel_size: Option<usize>,

    /// Write PNG snapshots of all four views to this directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Keep every Nth frame when writing snapshots.
    #[arg(long)]
    snapshot_every: Option<usize>,

    /// Encode the segmented view into this video file.
    #[arg(long)]
    output_video: Option<PathBuf>,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<usize>,

    /// JSON settings file; explicit flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let request = build_request(&cli)?;

    let output_dir = cli.output_dir.clone();
    let output_video = cli.output_video.clone();
    let settings = request.settings.clone();
    let logger = Box::new(StdoutPipelineLogger::new(settings.progress_every));

    let mut use_case = SegmentStreamUseCase::new(
        request,
        logger,
        Box::new(move |meta: &StreamMetadata| {
            build_presenter(meta, output_dir.as_deref(), output_video.as_deref(), &settings)
        }),
    )?;

    let cancelled = use_case.cancel_handle();
    ctrlc::set_handler(move || {
        cancelled.store(true, Ordering::Relaxed);
    })?;
    log::info!("Press Ctrl-C to stop");

    let summary = use_case.execute()?;
    log::info!(
        "Processed {} frames ({} loops, stopped: {:?})",
        summary.frames_processed,
        summary.loops,
        summary.reason
    );
    Ok(())
}

fn build_request(cli: &Cli) -> Result<PipelineRequest, Box<dyn std::error::Error>> {
    validate(cli)?;
    let source_kind: SourceKind = cli.fonte.parse()?;
    let algorithm: Algorithm = cli.algoritmo.parse()?;
    let model = ModelConfig::new(algorithm, cli.history, cli.detect_shadows)?;

    Ok(PipelineRequest {
        source_kind,
        locator: cli.arquivo.clone(),
        camera_index: cli.camera,
        model,
        settings: resolve_settings(cli)?,
    })
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.fonte == "arquivo" && cli.arquivo.is_none() {
        return Err("--arquivo is required when --fonte arquivo".into());
    }
    if cli.snapshot_every.is_some() && cli.output_dir.is_none() {
        return Err("--snapshot-every needs --output-dir".into());
    }
    if cli.max_frames == Some(0) {
        return Err("--max-frames must be at least 1".into());
    }
    Ok(())
}

fn resolve_settings(cli: &Cli) -> Result<PipelineSettings, PipelineError> {
    let mut settings = match &cli.config {
        Some(path) => PipelineSettings::load(path)?,
        None => PipelineSettings::default(),
    };
    if let Some(k) = cli.kernel_size {
        settings.kernel_size = k;
    }
    if let Some(every) = cli.snapshot_every {
        settings.snapshot_every = every;
    }
    if cli.max_frames.is_some() {
        settings.max_frames = cli.max_frames;
    }
    settings.validate()?;
    Ok(settings)
}

fn build_presenter(
    meta: &StreamMetadata,
    output_dir: Option<&Path>,
    output_video: Option<&Path>,
    settings: &PipelineSettings,
) -> Result<Box<dyn FramePresenter>, PipelineError> {
    let mut targets: Vec<Box<dyn FramePresenter>> = Vec::new();
    if let Some(dir) = output_dir {
        let snapshots = ImageSequencePresenter::new(dir, settings.snapshot_every)?;
        targets.push(Box::new(ThreadedPresenter::spawn(
            Box::new(snapshots),
            settings.presenter_queue_capacity,
        )?));
    }
    if let Some(path) = output_video {
        // Encoding every frame matters more than latency, so no drop-oldest queue.
        targets.push(Box::new(FfmpegVideoPresenter::new(path, meta.fps)));
    }

    match targets.len() {
        0 => {
            log::info!("No output requested, running headless");
            Ok(Box::new(NullPresenter::new()))
        }
        1 => Ok(targets.remove(0)),
        _ => Ok(Box::new(FanOutPresenter::new(targets))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["motion-segment"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["--fonte", "camera", "--algoritmo", "MOG2"]);
        assert_eq!(cli.history, 500);
        assert!(cli.detect_shadows);
        assert_eq!(cli.camera, 0);

        let request = build_request(&cli).unwrap();
        assert_eq!(request.source_kind, SourceKind::Live);
        assert_eq!(request.model.algorithm(), Algorithm::Mog2);
        assert_eq!(request.settings, PipelineSettings::default());
    }

    #[test]
    fn test_detect_shadows_takes_a_value() {
        let cli = parse(&[
            "--fonte", "arquivo", "--arquivo", "clip.avi", "--algoritmo", "KNN",
            "--detect_shadows", "false",
        ]);
        assert!(!cli.detect_shadows);
        assert!(!build_request(&cli).unwrap().model.shadows_enabled());
    }

    #[test]
    fn test_file_source_needs_path() {
        let cli = parse(&["--fonte", "arquivo", "--algoritmo", "MOG"]);
        assert!(build_request(&cli).is_err());
    }

    fn parse_err(args: &[&str]) -> clap::Error {
        let mut argv = vec!["motion-segment"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap_err()
    }

    #[test]
    fn test_unknown_algorithm_lists_supported() {
        let err = parse_err(&["--fonte", "camera", "--algoritmo", "CNT"]);
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
        let text = err.to_string();
        for name in Algorithm::NAMES {
            assert!(text.contains(name), "{text}");
        }
    }

    #[test]
    fn test_unknown_source_rejected() {
        let err = parse_err(&["--fonte", "webcam", "--algoritmo", "MOG2"]);
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
        let text = err.to_string();
        assert!(text.contains("camera") && text.contains("arquivo"), "{text}");
    }

    #[test]
    fn test_algorithm_names_are_case_sensitive() {
        let err = parse_err(&["--fonte", "camera", "--algoritmo", "mog2"]);
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn test_non_positive_history_rejected() {
        let cli = parse(&["--fonte", "camera", "--algoritmo", "GMG", "--history", "-3"]);
        assert!(build_request(&cli).is_err());
    }

    #[test]
    fn test_flags_override_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"kernel_size": 5, "progress_every": 7}"#).unwrap();

        let cli = parse(&[
            "--fonte", "camera", "--algoritmo", "MOG2",
            "--config", path.to_str().unwrap(),
            "--kernel-size", "7",
        ]);
        let settings = resolve_settings(&cli).unwrap();
        assert_eq!(settings.kernel_size, 7);
        assert_eq!(settings.progress_every, 7);
    }

    #[test]
    fn test_headless_without_outputs() {
        let meta = StreamMetadata {
            width: 8,
            height: 8,
            fps: 0.0,
            total_frames: 0,
            codec: "rawvideo".to_string(),
            source_path: None,
        };
        let presenter = build_presenter(&meta, None, None, &PipelineSettings::default());
        assert!(presenter.is_ok());
    }
}
