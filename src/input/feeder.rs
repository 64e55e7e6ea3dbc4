//! `InputFeeder`: one interface over images, video files and cameras
//!
//! ```no_run
//! use vino_utils::input::InputFeeder;
//!
//! let mut feed = InputFeeder::new("video.mp4", 0)?;
//! for frame in feed.next_frame(true) {
//!     let frame = frame?;
//!     // ...
//! }
//! feed.close();
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::fmt;
use std::path::Path;

use anyhow::Result;
use image::RgbImage;
use tracing::{info, warn};

use super::ffmpeg::{self, FrameReader, VideoWriter};
use super::progress::Progress;
use super::InputError;
use crate::config::InputConfig;
use crate::draw::{self, Color, Point};
use crate::engine::preprocess::decode_image;

const IMAGE_EXTENSIONS: &[&str] = &["bmp", "gif", "jpeg", "jpg", "png", "tif", "tiff", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &[
    "avi", "flv", "m4v", "mkv", "mov", "mp4", "mpeg", "mpg", "webm", "wmv",
];

pub const DEFAULT_VIDEO_NAME: &str = "output_video.mp4";
const TEXT_SCALE: f32 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    Image,
    Video,
    Camera,
}

impl InputType {
    /// Classify a source string. Cameras are any source mentioning `cam`
    /// that is not a known image or video file.
    pub fn classify(source: &str) -> Result<Self, InputError> {
        let extension = Path::new(source)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match extension.as_deref() {
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => Ok(InputType::Video),
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => Ok(InputType::Image),
            _ if source.to_lowercase().contains("cam") => Ok(InputType::Camera),
            _ => Err(InputError::FormatNotSupported(source.to_string())),
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputType::Image => write!(f, "image"),
            InputType::Video => write!(f, "video"),
            InputType::Camera => write!(f, "cam"),
        }
    }
}

/// Look of the circle drawn by [`InputFeeder::draw_circle`]
#[derive(Debug, Clone, Copy)]
pub struct CircleStyle {
    pub radius: i32,
    pub color: Color,
    pub thickness: i32,
}

impl Default for CircleStyle {
    fn default() -> Self {
        Self {
            radius: 100,
            color: draw::GREEN,
            thickness: 5,
        }
    }
}

enum Capture {
    Image(RgbImage),
    Stream(FrameReader),
    Closed,
}

pub struct InputFeeder {
    source: String,
    input_type: InputType,
    width: u32,
    height: u32,
    fps: f64,
    video_len: u64,
    progress_every: u64,
    capture: Capture,
}

impl InputFeeder {
    /// Open `source` with default capture settings. `cam_index` selects the
    /// camera device when the source names a camera.
    pub fn new(source: &str, cam_index: u32) -> Result<Self> {
        let config = InputConfig {
            cam_index,
            ..InputConfig::default()
        };
        Self::with_config(source, &config)
    }

    pub fn with_config(source: &str, config: &InputConfig) -> Result<Self> {
        Self::check_file_exists(source)?;
        let input_type = InputType::classify(source).map_err(|e| {
            warn!("{}", e);
            e
        })?;

        let mut feeder = Self {
            source: source.to_string(),
            input_type,
            width: 0,
            height: 0,
            fps: 0.0,
            video_len: 0,
            progress_every: config.progress_every,
            capture: Capture::Closed,
        };

        match input_type {
            InputType::Image => {
                let bytes = std::fs::read(source)?;
                let image = decode_image(&bytes)?.to_rgb8();
                (feeder.width, feeder.height) = image.dimensions();
                feeder.video_len = 1;
                feeder.capture = Capture::Image(image);
            }
            InputType::Video => {
                let info = ffmpeg::probe(Path::new(source))?;
                feeder.width = info.width;
                feeder.height = info.height;
                feeder.fps = info.fps;
                feeder.video_len = info.frame_count;
                feeder.capture = Capture::Stream(FrameReader::open_video(
                    Path::new(source),
                    info.width,
                    info.height,
                )?);
            }
            InputType::Camera => {
                feeder.width = config.camera_width;
                feeder.height = config.camera_height;
                feeder.fps = config.camera_fps as f64;
                feeder.capture = Capture::Stream(FrameReader::open_camera(
                    config.cam_index,
                    config.camera_width,
                    config.camera_height,
                    config.camera_fps,
                )?);
            }
        }

        info!("Loaded input source type: {}", input_type);
        Ok(feeder)
    }

    fn check_file_exists(source: &str) -> Result<(), InputError> {
        if source.contains("cam") {
            return Ok(());
        }
        if !Path::new(source).exists() {
            return Err(InputError::NotFound(source.into()));
        }
        Ok(())
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn input_type(&self) -> InputType {
        self.input_type
    }

    pub fn source_width(&self) -> u32 {
        self.width
    }

    pub fn source_height(&self) -> u32 {
        self.height
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Frame count; zero for cameras and for videos that do not record it
    pub fn video_len(&self) -> u64 {
        self.video_len
    }

    /// `(height, width)`
    pub fn frame_size(&self) -> (u32, u32) {
        (self.height, self.width)
    }

    /// Resize to `(width, height)`, half the source size by default
    pub fn resize(&self, frame: &RgbImage, size: Option<(u32, u32)>) -> RgbImage {
        let (width, height) = size.unwrap_or((self.width / 2, self.height / 2));
        image::imageops::resize(
            frame,
            width.max(1),
            height.max(1),
            image::imageops::FilterType::Triangle,
        )
    }

    /// Draw a circle, centred on the frame by default, and return the
    /// corners of its bounding box
    pub fn draw_circle(
        &self,
        frame: &mut RgbImage,
        centre: Option<Point>,
        style: CircleStyle,
    ) -> (Point, Point) {
        let (cx, cy) = centre.unwrap_or((self.width as i32 / 2, self.height as i32 / 2));
        draw::circle(frame, (cx, cy), style.radius, style.color, style.thickness);
        (
            (cx - style.radius, cy - style.radius),
            (cx + style.radius, cy + style.radius),
        )
    }

    /// Small white text with its bottom-left corner at `position`
    pub fn add_text(text: &str, frame: &mut RgbImage, position: Point) {
        draw::put_text(frame, text, position, TEXT_SCALE, draw::WHITE, 1);
    }

    /// Iterate over frames. Images yield once; streams until exhausted.
    pub fn next_frame(&mut self, progress: bool) -> Frames<'_> {
        let total = match self.input_type {
            InputType::Camera => None,
            _ => Some(self.video_len),
        };
        let progress = progress.then(|| Progress::new(total, self.progress_every));
        Frames {
            feeder: self,
            progress,
            done: false,
        }
    }

    /// Writer at the source's fps and size; `filename` defaults to
    /// `output_video.mp4`
    pub fn write_video(&self, dir: impl AsRef<Path>, filename: Option<&str>) -> Result<VideoWriter> {
        let path = dir.as_ref().join(filename.unwrap_or(DEFAULT_VIDEO_NAME));
        VideoWriter::create(path, (self.width, self.height), self.fps)
    }

    /// Release the capture. Safe to call more than once.
    pub fn close(&mut self) {
        if let Capture::Closed = self.capture {
            return;
        }
        if let Capture::Stream(reader) = &mut self.capture {
            reader.close();
        }
        self.capture = Capture::Closed;
        info!("============ CleanUp! ============");
    }

    fn read(&mut self) -> Result<Option<RgbImage>> {
        match &mut self.capture {
            Capture::Image(image) => Ok(Some(image.clone())),
            Capture::Stream(reader) => reader.read_frame(),
            Capture::Closed => Ok(None),
        }
    }
}

impl Drop for InputFeeder {
    fn drop(&mut self) {
        self.close();
    }
}

/// Iterator returned by [`InputFeeder::next_frame`]
pub struct Frames<'a> {
    feeder: &'a mut InputFeeder,
    progress: Option<Progress>,
    done: bool,
}

impl Frames<'_> {
    fn stop(&mut self) {
        self.done = true;
        if let Some(progress) = &self.progress {
            progress.finish();
        }
    }
}

impl Iterator for Frames<'_> {
    type Item = Result<RgbImage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.feeder.input_type == InputType::Image {
            self.done = true;
        }

        match self.feeder.read() {
            Ok(Some(frame)) => {
                if let Some(progress) = &mut self.progress {
                    progress.update();
                }
                Some(Ok(frame))
            }
            Ok(None) => {
                self.stop();
                None
            }
            Err(e) => {
                self.stop();
                Some(Err(e))
            }
        }
    }
}
