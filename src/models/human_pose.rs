//! Human pose estimation (`human-pose-estimation-0001`)
//!
//! The network has two outputs: part affinity fields (`Mconv7_stage2_L1`,
//! 38 channels) and keypoint heatmaps (`Mconv7_stage2_L2`, 19 channels, the
//! last one being background). Only the heatmaps are used: each keypoint is
//! placed at its heatmap peak and the skeleton is drawn between known pairs.

use std::path::Path;

use anyhow::Result;
use image::RgbImage;
use serde::Serialize;

use crate::draw;
use crate::engine::faults::ModelError;
use crate::engine::model::{Decoder, Model, ModelSettings};
use crate::engine::tensor::{ModelOutputs, OutputTensor};
use crate::utils::math::argmax_with_value;

pub type HumanPoseEstimation = Model<PoseDecoder>;

pub const HEATMAPS_OUTPUT: &str = "Mconv7_stage2_L2";

/// Heatmap peaks below this are treated as absent
pub const KEYPOINT_THRESHOLD: f32 = 0.1;

pub const KEYPOINT_NAMES: [&str; 18] = [
    "nose",
    "neck",
    "right_shoulder",
    "right_elbow",
    "right_wrist",
    "left_shoulder",
    "left_elbow",
    "left_wrist",
    "right_hip",
    "right_knee",
    "right_ankle",
    "left_hip",
    "left_knee",
    "left_ankle",
    "right_eye",
    "left_eye",
    "right_ear",
    "left_ear",
];

pub const SKELETON: [(usize, usize); 17] = [
    (1, 2),
    (1, 5),
    (2, 3),
    (3, 4),
    (5, 6),
    (6, 7),
    (1, 8),
    (8, 9),
    (9, 10),
    (1, 11),
    (11, 12),
    (12, 13),
    (1, 0),
    (0, 14),
    (14, 16),
    (0, 15),
    (15, 17),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Keypoint {
    pub id: usize,
    pub name: &'static str,
    pub x: i32,
    pub y: i32,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Pose {
    pub keypoints: Vec<Keypoint>,
}

impl Pose {
    pub fn keypoint(&self, id: usize) -> Option<&Keypoint> {
        self.keypoints.iter().find(|k| k.id == id)
    }
}

pub struct PoseDecoder {
    threshold: f32,
}

impl Default for PoseDecoder {
    fn default() -> Self {
        Self {
            threshold: KEYPOINT_THRESHOLD,
        }
    }
}

impl PoseDecoder {
    /// Locate the heatmaps by name, then by channel count
    fn heatmaps<'a>(outputs: &'a ModelOutputs) -> Result<&'a OutputTensor> {
        outputs
            .by_name(HEATMAPS_OUTPUT)
            .or_else(|| {
                outputs
                    .iter()
                    .find(|t| t.dims.get(1) == Some(&(KEYPOINT_NAMES.len() as i64 + 1)))
            })
            .ok_or_else(|| {
                ModelError::InvalidModel(format!("missing {} output", HEATMAPS_OUTPUT)).into()
            })
    }

    /// Peak of every keypoint heatmap, scaled to `frame_size` `(w, h)`
    pub fn keypoints(&self, heatmaps: &OutputTensor, frame_size: (u32, u32)) -> Result<Pose> {
        let (channels, map_h, map_w) = match heatmaps.dims.as_slice() {
            [_, c, h, w] if *h > 0 && *w > 0 => (*c as usize, *h as usize, *w as usize),
            dims => {
                return Err(ModelError::InvalidModel(format!(
                    "heatmaps have shape {:?}, expected [N, C, H, W]",
                    dims
                ))
                .into())
            }
        };
        if channels < KEYPOINT_NAMES.len() || heatmaps.data.len() < channels * map_h * map_w {
            return Err(ModelError::InvalidModel(format!(
                "heatmaps have {} channels, expected at least {}",
                channels,
                KEYPOINT_NAMES.len()
            ))
            .into());
        }

        let (frame_w, frame_h) = frame_size;
        let scale_x = frame_w as f32 / map_w as f32;
        let scale_y = frame_h as f32 / map_h as f32;
        let plane = map_h * map_w;

        let mut keypoints = Vec::new();
        for (id, &name) in KEYPOINT_NAMES.iter().enumerate() {
            let map = &heatmaps.data[id * plane..(id + 1) * plane];
            let Some((idx, confidence)) = argmax_with_value(map) else {
                continue;
            };
            if confidence < self.threshold {
                continue;
            }
            let (row, col) = (idx / map_w, idx % map_w);
            keypoints.push(Keypoint {
                id,
                name,
                x: ((col as f32 + 0.5) * scale_x) as i32,
                y: ((row as f32 + 0.5) * scale_y) as i32,
                confidence,
            });
        }

        Ok(Pose { keypoints })
    }
}

impl Decoder for PoseDecoder {
    type Output = Pose;

    // Heatmap peaks use their own threshold, not the detection one
    fn configure(_model_name: &Path, _settings: &ModelSettings) -> Self {
        Self::default()
    }

    fn decode(&self, outputs: &ModelOutputs, frame: &RgbImage) -> Result<Self::Output> {
        let heatmaps = Self::heatmaps(outputs)?;
        let pose = self.keypoints(heatmaps, frame.dimensions())?;
        tracing::debug!("Found {} keypoints", pose.keypoints.len());
        Ok(pose)
    }

    fn draw(&self, output: &Self::Output, frame: &mut RgbImage) {
        for &(a, b) in SKELETON.iter() {
            if let (Some(a), Some(b)) = (output.keypoint(a), output.keypoint(b)) {
                draw::line(frame, (a.x, a.y), (b.x, b.y), draw::BLUE, 2);
            }
        }
        for keypoint in &output.keypoints {
            draw::circle(frame, (keypoint.x, keypoint.y), 4, draw::GREEN, draw::FILLED);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heatmaps(peaks: &[(usize, usize, usize, f32)]) -> OutputTensor {
        let (h, w) = (4, 8);
        let mut data = vec![0.0; 19 * h * w];
        for &(channel, row, col, value) in peaks {
            data[channel * h * w + row * w + col] = value;
        }
        OutputTensor::new(HEATMAPS_OUTPUT, vec![1, 19, h as i64, w as i64], data)
    }

    #[test]
    fn test_keypoints_scaled_to_frame() {
        let maps = heatmaps(&[(0, 1, 2, 0.8), (1, 3, 7, 0.5)]);
        let pose = PoseDecoder::default().keypoints(&maps, (80, 40)).unwrap();
        assert_eq!(pose.keypoints.len(), 2);

        let nose = pose.keypoint(0).unwrap();
        assert_eq!(nose.name, "nose");
        assert_eq!((nose.x, nose.y), (25, 15));

        let neck = pose.keypoint(1).unwrap();
        assert_eq!((neck.x, neck.y), (75, 35));
    }

    #[test]
    fn test_keypoints_below_threshold_dropped() {
        let maps = heatmaps(&[(0, 0, 0, 0.05), (5, 2, 2, 0.3)]);
        let pose = PoseDecoder::default().keypoints(&maps, (80, 40)).unwrap();
        assert_eq!(pose.keypoints.len(), 1);
        assert_eq!(pose.keypoints[0].name, "left_shoulder");
    }

    #[test]
    fn test_heatmaps_found_by_channel_count() {
        let pafs = OutputTensor::new("pafs", vec![1, 38, 1, 1], vec![0.0; 38]);
        let mut maps = heatmaps(&[(0, 0, 0, 0.9)]);
        maps.name = "renamed".to_string();
        let outputs = ModelOutputs::new(vec![pafs, maps]);
        assert_eq!(PoseDecoder::heatmaps(&outputs).unwrap().name, "renamed");
    }

    #[test]
    fn test_bad_shape() {
        let flat = OutputTensor::new(HEATMAPS_OUTPUT, vec![1, 19], vec![0.0; 19]);
        assert!(PoseDecoder::default().keypoints(&flat, (10, 10)).is_err());
    }

    #[test]
    fn test_draw_skeleton() {
        let mut frame = RgbImage::new(80, 40);
        let pose = Pose {
            keypoints: vec![
                Keypoint {
                    id: 0,
                    name: "nose",
                    x: 10,
                    y: 20,
                    confidence: 0.9,
                },
                Keypoint {
                    id: 1,
                    name: "neck",
                    x: 70,
                    y: 20,
                    confidence: 0.9,
                },
            ],
        };
        PoseDecoder::default().draw(&pose, &mut frame);
        assert_eq!(*frame.get_pixel(40, 20), draw::BLUE);
        assert_eq!(*frame.get_pixel(10, 20), draw::GREEN);
    }
}
