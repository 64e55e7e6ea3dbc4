//! Frame sources: still images, video files and cameras

pub mod feeder;
pub mod ffmpeg;
pub mod progress;

use std::path::PathBuf;

use thiserror::Error;

pub use feeder::{CircleStyle, Frames, InputFeeder, InputType};
pub use ffmpeg::{VideoInfo, VideoWriter};
pub use progress::Progress;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("{0} does not exist.")]
    NotFound(PathBuf),

    #[error("Source: {0} not supported!")]
    FormatNotSupported(String),

    #[error("ffmpeg: {0}")]
    Ffmpeg(String),
}
