//! Video capture and encoding through ffmpeg subprocesses
//!
//! Decoding runs `ffmpeg ... -pix_fmt rgb24 -f rawvideo -` and reads one
//! `width * height * 3` chunk per frame from its stdout. Encoding pipes raw
//! frames into `ffmpeg -f rawvideo -i -` and lets it write the container.

use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use serde::Deserialize;
use tracing::{debug, warn};

use super::InputError;

/// Stream properties reported by ffprobe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Zero when the container does not record it
    pub frame_count: u64,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    #[serde(default)]
    side_data_list: Vec<SideData>,
    #[serde(default)]
    tags: StreamTags,
}

#[derive(Debug, Deserialize)]
struct SideData {
    rotation: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamTags {
    rotate: Option<String>,
}

impl ProbeStream {
    /// Display rotation in degrees, from the display matrix or the older
    /// `rotate` tag
    fn rotation(&self) -> i64 {
        self.side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .or_else(|| self.tags.rotate.as_deref().and_then(|r| r.trim().parse().ok()))
            .map(|r| r.round() as i64)
            .unwrap_or(0)
    }
}

/// Parse an ffprobe rate such as `30000/1001` or `25`
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (fps > 0.0).then_some(fps)
}

fn parse_probe(json: &str) -> Result<VideoInfo> {
    let probe: ProbeOutput = serde_json::from_str(json).context("unreadable ffprobe output")?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no video stream found"))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(anyhow!("video stream has no frame size")),
    };
    // ffmpeg autorotates while decoding, so a quarter turn swaps the frame size
    let (width, height) = if stream.rotation().rem_euclid(180) == 90 {
        (height, width)
    } else {
        (width, height)
    };
    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(0.0);
    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);

    Ok(VideoInfo {
        width,
        height,
        fps,
        frame_count,
    })
}

/// Read stream properties of a video file
pub fn probe(path: &Path) -> Result<VideoInfo> {
    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg("v:0")
        .arg("-show_entries")
        .arg("stream=width,height,r_frame_rate,avg_frame_rate,nb_frames:stream_side_data=rotation:stream_tags=rotate")
        .arg("-of")
        .arg("json")
        .arg(path)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| InputError::Ffmpeg(format!("failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        return Err(InputError::Ffmpeg(format!(
            "ffprobe exited with {} for {}",
            output.status,
            path.display()
        ))
        .into());
    }

    parse_probe(&String::from_utf8_lossy(&output.stdout))
        .with_context(|| format!("probing {}", path.display()))
}

/// Read one rgb24 frame. `Ok(None)` on a clean end of stream.
pub fn read_raw_frame(reader: &mut impl Read, width: u32, height: u32) -> Result<Option<RgbImage>> {
    let mut buffer = vec![0u8; width as usize * height as usize * 3];
    match reader.read_exact(&mut buffer) {
        Ok(()) => Ok(RgbImage::from_raw(width, height, buffer)),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Decoding ffmpeg child producing frames of a fixed size
pub struct FrameReader {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
}

impl FrameReader {
    /// Decode a video file at its native size
    pub fn open_video(path: &Path, width: u32, height: u32) -> Result<Self> {
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(path);
        Self::spawn(cmd, width, height)
    }

    /// Capture from `/dev/video{index}`, scaled to `width x height`
    pub fn open_camera(index: u32, width: u32, height: u32, fps: u32) -> Result<Self> {
        let device = format!("/dev/video{}", index);
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-f")
            .arg("video4linux2")
            .arg("-framerate")
            .arg(fps.to_string())
            .arg("-i")
            .arg(&device)
            .arg("-vf")
            .arg(format!("scale={}:{}", width, height));
        Self::spawn(cmd, width, height)
    }

    fn spawn(mut cmd: Command, width: u32, height: u32) -> Result<Self> {
        cmd.arg("-an")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-f")
            .arg("rawvideo")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        debug!("Spawning {:?}", cmd);
        let mut child = cmd
            .spawn()
            .map_err(|e| InputError::Ffmpeg(format!("failed to start ffmpeg: {}", e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| InputError::Ffmpeg("failed to capture ffmpeg stdout".to_string()))?;

        Ok(Self {
            child,
            stdout,
            width,
            height,
        })
    }

    pub fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        read_raw_frame(&mut self.stdout, self.width, self.height)
    }

    pub fn close(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        self.close();
    }
}

/// H.264 mp4 writer fed with rgb24 frames
pub struct VideoWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    path: PathBuf,
    width: u32,
    height: u32,
    frames: u64,
}

impl VideoWriter {
    pub fn create(path: impl AsRef<Path>, size: (u32, u32), fps: f64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let (width, height) = size;
        let fps = if fps > 0.0 { fps } else { 30.0 };

        let mut child = Command::new("ffmpeg")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-s")
            .arg(format!("{}x{}", width, height))
            .arg("-r")
            .arg(format!("{}", fps))
            .arg("-i")
            .arg("-")
            .arg("-c:v")
            .arg("libx264")
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| InputError::Ffmpeg(format!("failed to start ffmpeg: {}", e)))?;
        let stdin = child.stdin.take();

        Ok(Self {
            child,
            stdin,
            path,
            width,
            height,
            frames: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    /// Frames of another size are resized to the writer's size
    pub fn write(&mut self, frame: &RgbImage) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| InputError::Ffmpeg("video writer already finished".to_string()))?;

        if frame.dimensions() == (self.width, self.height) {
            stdin.write_all(frame.as_raw())?;
        } else {
            let resized = image::imageops::resize(
                frame,
                self.width,
                self.height,
                image::imageops::FilterType::Triangle,
            );
            stdin.write_all(resized.as_raw())?;
        }
        self.frames += 1;
        Ok(())
    }

    /// Close the pipe and wait for the encoder to flush the file
    pub fn finish(&mut self) -> Result<()> {
        if let Some(stdin) = self.stdin.take() {
            drop(stdin);
            let status = self.child.wait()?;
            if !status.success() {
                return Err(InputError::Ffmpeg(format!(
                    "encoder exited with {} writing {}",
                    status,
                    self.path.display()
                ))
                .into());
            }
            debug!("Wrote {} frames to {}", self.frames, self.path.display());
        }
        Ok(())
    }
}

impl Drop for VideoWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!("Failed to finish video: {}", e);
        }
    }
}
