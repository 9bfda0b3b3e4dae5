pub mod background_recorder;
pub mod ffmpeg_writer;
