pub mod ffmpeg_camera_source;
mod ffmpeg_decode;
pub mod ffmpeg_file_source;
pub mod image_sequence_source;
pub mod memory_frame_source;
pub mod source_factory;
