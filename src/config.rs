//! Runtime configuration

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub inference: InferenceConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
    pub models: ModelsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub device: String,
    pub threshold: f32,
    /// Milliseconds to wait for a request; unset blocks until it completes
    pub request_timeout_ms: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Camera device index used when the source names a camera
    pub cam_index: u32,
    pub progress: bool,
    /// Frames between progress log lines
    pub progress_every: u64,
    /// Capture size requested from the camera
    pub camera_width: u32,
    pub camera_height: u32,
    pub camera_fps: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub video_name: String,
    pub image_name: String,
}

/// Default model locations, all without extension
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub face_detection: Option<PathBuf>,
    pub facial_landmarks: Option<PathBuf>,
    pub head_pose: Option<PathBuf>,
    pub gaze: Option<PathBuf>,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_path() -> &'static str {
        "config.toml"
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            device: "CPU".to_string(),
            threshold: 0.60,
            request_timeout_ms: None,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            cam_index: 0,
            progress: true,
            progress_every: 100,
            camera_width: 640,
            camera_height: 480,
            camera_fps: 30,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            video_name: "output_video.mp4".to_string(),
            image_name: "output_image.png".to_string(),
        }
    }
}
