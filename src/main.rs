//! vino-utils
//!
//! Runs OpenVINO models over an image, video file or camera and prints one
//! JSON line per frame. Annotated frames are written when `--output` is set.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use image::RgbImage;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use vino_utils::config::Config;
use vino_utils::engine::{Decoder, Model, ModelSettings, PredictOptions};
use vino_utils::input::{InputFeeder, InputType, VideoWriter};
use vino_utils::models::age_gender::AgeGenderDecoder;
use vino_utils::models::emotions::EmotionsDecoder;
use vino_utils::models::face_detection::FaceDetector;
use vino_utils::models::facial_landmarks::LandmarksDecoder;
use vino_utils::models::head_pose::HeadPoseDecoder;
use vino_utils::models::human_pose::PoseDecoder;
use vino_utils::models::person_detection::PersonDetector;
use vino_utils::models::text_recognition::TextDecoder;
use vino_utils::models::vehicle_attributes::VehicleAttributesDecoder;
use vino_utils::models::{
    Detection, FaceDetection, FaceLandmarks, FacialLandmarks, GazeEstimation, GazeVector,
    HeadPoseAngles, HeadPoseEstimation,
};
use vino_utils::utils::image::save_frame;

#[derive(Parser)]
#[command(
    name = "vino-utils",
    version,
    about = "Run OpenVINO models over images, videos and cameras"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file
    #[arg(long, global = true, default_value = Config::default_path())]
    config: String,

    /// Log at debug level
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Detect faces
    FaceDetection(SingleModel),
    /// Detect people
    PersonDetection(SingleModel),
    /// Estimate age and gender of a face image
    AgeGender(SingleModel),
    /// Recognise the emotion of a face image
    Emotions(SingleModel),
    /// Estimate yaw, pitch and roll of a face image
    HeadPose(SingleModel),
    /// Locate facial landmarks on a face image
    Landmarks(SingleModel),
    /// Recognise vehicle color and type
    VehicleAttributes(SingleModel),
    /// Read a line of text
    TextRecognition(SingleModel),
    /// Locate body keypoints of a single person
    HumanPose(SingleModel),
    /// Face detection, landmarks and head pose feeding gaze estimation
    Gaze(GazeArgs),
}

#[derive(Args)]
struct SingleModel {
    /// Model path without extension
    #[arg(short, long)]
    model: PathBuf,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args)]
struct GazeArgs {
    /// Gaze estimation model path without extension
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Face detection model path without extension
    #[arg(long)]
    face_model: Option<PathBuf>,

    /// Facial landmarks model path without extension
    #[arg(long)]
    landmarks_model: Option<PathBuf>,

    /// Head pose model path without extension
    #[arg(long)]
    head_pose_model: Option<PathBuf>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args)]
struct RunArgs {
    /// Image, video file or `cam`
    #[arg(short, long)]
    input: String,

    /// Target device, e.g. CPU, GPU, MYRIAD
    #[arg(short, long)]
    device: Option<String>,

    /// Detection confidence threshold
    #[arg(short, long)]
    threshold: Option<f32>,

    /// Draw results onto the frames
    #[arg(short = 'b', long, default_value_t = false)]
    show_bbox: bool,

    /// Directory for annotated output
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Disable progress logging
    #[arg(long, default_value_t = false)]
    no_progress: bool,
}

/// Where annotated frames go
enum Sink {
    Discard,
    Image(PathBuf),
    Video(VideoWriter),
}

impl Sink {
    fn open(feed: &InputFeeder, run: &RunArgs, config: &Config) -> Result<Self> {
        let Some(dir) = &run.output else {
            return Ok(Sink::Discard);
        };
        match feed.input_type() {
            InputType::Image => Ok(Sink::Image(dir.join(&config.output.image_name))),
            _ => Ok(Sink::Video(
                feed.write_video(dir, Some(&config.output.video_name))?,
            )),
        }
    }

    fn write(&mut self, frame: &RgbImage) -> Result<()> {
        match self {
            Sink::Discard => Ok(()),
            Sink::Image(path) => save_frame(frame, path),
            Sink::Video(writer) => writer.write(frame),
        }
    }

    fn finish(self) -> Result<()> {
        match self {
            Sink::Discard => {}
            Sink::Image(path) => info!("Saved annotated image to {}", path.display()),
            Sink::Video(mut writer) => {
                writer.finish()?;
                info!(
                    "Saved {} frames to {}",
                    writer.frames_written(),
                    writer.path().display()
                );
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct FrameRecord<'a, T: Serialize> {
    frame: usize,
    inference_ms: f64,
    output: &'a T,
}

fn print_record<T: Serialize>(frame: usize, inference_ms: f64, output: &T) -> Result<()> {
    let record = FrameRecord {
        frame,
        inference_ms,
        output,
    };
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, &record)?;
    writeln!(stdout)?;
    Ok(())
}

fn settings_for(run: &RunArgs, config: &Config, feed: &InputFeeder) -> ModelSettings {
    let mut settings = ModelSettings::from(&config.inference);
    if let Some(device) = &run.device {
        settings.device = device.clone();
    }
    if let Some(threshold) = run.threshold {
        settings.threshold = threshold;
    }
    settings.source_size = Some((feed.source_width(), feed.source_height()));
    settings
}

fn open_feed(run: &RunArgs, config: &Config) -> Result<InputFeeder> {
    let feed = InputFeeder::with_config(&run.input, &config.input)?;
    info!(
        "Input {}x{} at {:.2} fps, {} frames",
        feed.source_width(),
        feed.source_height(),
        feed.fps(),
        feed.video_len()
    );
    Ok(feed)
}

fn run_single<D>(args: &SingleModel, config: &Config) -> Result<()>
where
    D: Decoder,
    D::Output: Serialize,
{
    let run = &args.run;
    let mut feed = open_feed(run, config)?;
    let settings = settings_for(run, config, &feed);
    let mut model = Model::<D>::load(&args.model, &settings)?;
    if let Ok(size) = model.inner().model_size_mb() {
        info!("Model size: {:.2} MB", size);
    }

    let options = PredictOptions {
        show_bbox: run.show_bbox,
        gray_enabled: false,
    };
    let progress = config.input.progress && !run.no_progress;
    let mut sink = Sink::open(&feed, run, config)?;

    for (index, frame) in feed.next_frame(progress).enumerate() {
        let mut frame = frame?;
        let prediction = model.predict(&mut frame, options)?;
        print_record(index, prediction.inference_ms, &prediction.output)?;
        sink.write(&frame)?;
    }

    let stats = model.inner().perf_stats();
    info!(
        "{} requests, mean {:.3} ms, min {:.3} ms, max {:.3} ms",
        stats.count,
        stats.mean_ms(),
        stats.min_ms,
        stats.max_ms
    );
    sink.finish()?;
    feed.close();
    Ok(())
}

#[derive(Serialize)]
struct GazeRecord {
    face: Detection,
    landmarks: FaceLandmarks,
    head_pose: HeadPoseAngles,
    gaze: Option<GazeVector>,
}

fn resolve_model(given: &Option<PathBuf>, configured: &Option<PathBuf>, what: &str) -> Result<PathBuf> {
    match given.as_ref().or(configured.as_ref()) {
        Some(path) => Ok(path.clone()),
        None => bail!(
            "no {} model given; pass it on the command line or set it under [models]",
            what
        ),
    }
}

fn run_gaze(args: &GazeArgs, config: &Config) -> Result<()> {
    let run = &args.run;
    let models = &config.models;
    let face_path = resolve_model(&args.face_model, &models.face_detection, "face detection")?;
    let landmarks_path =
        resolve_model(&args.landmarks_model, &models.facial_landmarks, "facial landmarks")?;
    let head_pose_path = resolve_model(&args.head_pose_model, &models.head_pose, "head pose")?;
    let gaze_path = resolve_model(&args.model, &models.gaze, "gaze estimation")?;

    let mut feed = open_feed(run, config)?;
    let settings = settings_for(run, config, &feed);
    let mut face_model = FaceDetection::load(&face_path, &settings)?;
    let mut landmarks_model = FacialLandmarks::load(&landmarks_path, &settings)?;
    let mut head_pose_model = HeadPoseEstimation::load(&head_pose_path, &settings)?;
    let mut gaze_model = GazeEstimation::load(&gaze_path, &settings)?;

    let draw = PredictOptions {
        show_bbox: run.show_bbox,
        gray_enabled: false,
    };
    let quiet = PredictOptions::default();
    let progress = config.input.progress && !run.no_progress;
    let mut sink = Sink::open(&feed, run, config)?;

    for (index, frame) in feed.next_frame(progress).enumerate() {
        let mut frame = frame?;
        let faces = face_model.predict(&mut frame, quiet)?;
        let mut inference_ms = faces.inference_ms;
        let mut records = Vec::with_capacity(faces.output.len());

        for face in &faces.output {
            let Some(mut crop) = face.crop(&frame) else {
                continue;
            };
            let (dx, dy) = (face.xmin.max(0), face.ymin.max(0));

            let mut clean = crop.clone();
            let head_pose = head_pose_model.predict(&mut clean, quiet)?;
            let landmarks = landmarks_model.predict(&mut crop, draw)?;
            if run.show_bbox {
                head_pose_model.decoder().draw(&head_pose.output, &mut crop);
                image::imageops::replace(&mut frame, &crop, dx as i64, dy as i64);
            }
            inference_ms += head_pose.inference_ms + landmarks.inference_ms;

            let eyes = landmarks.output.eyes.translated(dx, dy);
            let gaze = if eyes.left_eye_image.is_some() && eyes.right_eye_image.is_some() {
                let prediction =
                    gaze_model.predict(&mut frame, &eyes, &head_pose.output, run.show_bbox)?;
                inference_ms += prediction.inference_ms;
                Some(prediction.output)
            } else {
                warn!("Eyes too close to the face border, skipping gaze");
                None
            };

            records.push(GazeRecord {
                face: *face,
                landmarks: landmarks.output,
                head_pose: head_pose.output,
                gaze,
            });
        }

        if run.show_bbox {
            face_model.decoder().draw(&faces.output, &mut frame);
        }
        print_record(index, inference_ms, &records)?;
        sink.write(&frame)?;
    }

    sink.finish()?;
    feed.close();
    Ok(())
}

fn load_config(path: &str) -> Config {
    if !Path::new(path).exists() {
        info!("Using default config ({} not found)", path);
        return Config::default();
    }
    Config::load(path).unwrap_or_else(|e| {
        warn!("Using default config ({})", e);
        Config::default()
    })
}

/// `RUST_LOG` wins over `--verbose` when set
fn log_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_env_filter(log_filter(cli.verbose))
        .with_target(false)
        .init();

    info!("vino-utils v{}", env!("CARGO_PKG_VERSION"));
    let config = load_config(&cli.config);
    info!("  Device: {}", config.inference.device);
    info!("  Threshold: {:.2}", config.inference.threshold);

    match &cli.command {
        Command::FaceDetection(args) => run_single::<FaceDetector>(args, &config),
        Command::PersonDetection(args) => run_single::<PersonDetector>(args, &config),
        Command::AgeGender(args) => run_single::<AgeGenderDecoder>(args, &config),
        Command::Emotions(args) => run_single::<EmotionsDecoder>(args, &config),
        Command::HeadPose(args) => run_single::<HeadPoseDecoder>(args, &config),
        Command::Landmarks(args) => run_single::<LandmarksDecoder>(args, &config),
        Command::VehicleAttributes(args) => run_single::<VehicleAttributesDecoder>(args, &config),
        Command::TextRecognition(args) => run_single::<TextDecoder>(args, &config),
        Command::HumanPose(args) => run_single::<PoseDecoder>(args, &config),
        Command::Gaze(args) => run_gaze(args, &config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn test_log_filter_follows_verbose() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert_eq!(log_filter(true).max_level_hint(), Some(Level::DEBUG.into()));
        assert_eq!(log_filter(false).max_level_hint(), Some(Level::INFO.into()));
    }
}
