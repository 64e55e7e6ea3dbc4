//! Head pose estimation (`head-pose-estimation-adas-0001`)
//!
//! Output layers, each `[1, 1]` in degrees:
//! `angle_y_fc` (yaw), `angle_p_fc` (pitch), `angle_r_fc` (roll).

use std::path::Path;

use anyhow::Result;
use image::RgbImage;
use serde::Serialize;

use crate::draw;
use crate::engine::faults::ModelError;
use crate::engine::model::{Decoder, Model, ModelSettings};
use crate::engine::tensor::ModelOutputs;
use crate::utils::math::deg_to_rad;

pub type HeadPoseEstimation = Model<HeadPoseDecoder>;

/// Length in pixels of the drawn pose axes
const AXIS_LENGTH: f32 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeadPoseAngles {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl HeadPoseAngles {
    pub fn as_array(&self) -> [f32; 3] {
        [self.yaw, self.pitch, self.roll]
    }

    /// Overlay line with the three angles
    pub fn show_text(&self, frame: &mut RgbImage, pos: i32) {
        let ypos = (frame.height() as i32 - pos).abs();
        let text = format!(
            "yaw: {:.2}, pitch: {:.2}, roll: {:.2}",
            self.yaw, self.pitch, self.roll
        );
        draw::put_text(frame, &text, (15, ypos), 1.5, draw::WHITE, 1);
    }
}

/// End points of the pose axes drawn from the frame centre
pub fn pose_axes(angles: &HeadPoseAngles, center: (f32, f32), size: f32) -> [(f32, f32); 3] {
    let yaw = -deg_to_rad(angles.yaw);
    let pitch = deg_to_rad(angles.pitch);
    let roll = deg_to_rad(angles.roll);
    let (tdx, tdy) = center;

    // X axis pointing right
    let x1 = size * (yaw.cos() * roll.cos()) + tdx;
    let y1 = size * (pitch.cos() * roll.sin() + roll.cos() * pitch.sin() * yaw.sin()) + tdy;

    // Y axis pointing down
    let x2 = size * (-yaw.cos() * roll.sin()) + tdx;
    let y2 = size * (pitch.cos() * roll.cos() - pitch.sin() * yaw.sin() * roll.sin()) + tdy;

    // Z axis out of the screen
    let x3 = size * yaw.sin() + tdx;
    let y3 = size * (-yaw.cos() * pitch.sin()) + tdy;

    [(x1, y1), (x2, y2), (x3, y3)]
}

pub struct HeadPoseDecoder {
    axis_length: f32,
}

impl Default for HeadPoseDecoder {
    fn default() -> Self {
        Self {
            axis_length: AXIS_LENGTH,
        }
    }
}

impl Decoder for HeadPoseDecoder {
    type Output = HeadPoseAngles;

    fn configure(_model_name: &Path, _settings: &ModelSettings) -> Self {
        Self::default()
    }

    fn decode(&self, outputs: &ModelOutputs, _frame: &RgbImage) -> Result<Self::Output> {
        if outputs.len() != 3 {
            let msg = format!(
                "head pose model has {} outputs, expected yaw, pitch and roll",
                outputs.len()
            );
            tracing::error!("{}", msg);
            return Err(ModelError::InvalidModel(msg).into());
        }

        let angle = |name: &str, index: usize| -> Result<f32> {
            outputs
                .by_name_or_index(name, index)
                .and_then(|t| t.data.first().copied())
                .ok_or_else(|| ModelError::InvalidModel(format!("empty output {}", name)).into())
        };

        Ok(HeadPoseAngles {
            yaw: angle("angle_y_fc", 0)?,
            pitch: angle("angle_p_fc", 1)?,
            roll: angle("angle_r_fc", 2)?,
        })
    }

    fn draw(&self, output: &Self::Output, frame: &mut RgbImage) {
        let center = (frame.width() as f32 / 2.0, frame.height() as f32 / 2.0);
        let origin = (center.0 as i32, center.1 as i32);
        let [x_axis, y_axis, z_axis] = pose_axes(output, center, self.axis_length);

        let to_point = |p: (f32, f32)| (p.0 as i32, p.1 as i32);
        draw::line(frame, origin, to_point(x_axis), draw::RED, 3);
        draw::line(frame, origin, to_point(y_axis), draw::GREEN, 3);
        draw::line(frame, origin, to_point(z_axis), draw::BLUE, 2);
    }
}
