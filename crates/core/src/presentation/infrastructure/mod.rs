pub mod ffmpeg_video_presenter;
pub mod image_sequence_presenter;
pub mod threaded_presenter;
