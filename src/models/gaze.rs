//! Gaze estimation (`gaze-estimation-adas-0002`)
//!
//! Unlike the single-input models this network takes both eye patches and
//! the head pose angles, so it drives the inference request directly
//! instead of going through [`Model`](crate::engine::model::Model).

use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use image::RgbImage;
use ndarray::{arr1, IxDyn};
use serde::Serialize;

use super::facial_landmarks::EyeRegions;
use super::head_pose::HeadPoseAngles;
use crate::draw::{self, Point};
use crate::engine::faults::ModelError;
use crate::engine::model::{InferenceModel, ModelSettings, Prediction};
use crate::engine::preprocess::preprocess_input;
use crate::engine::tensor::{InputBlob, ModelOutputs};

pub const LEFT_EYE_INPUT: &str = "left_eye_image";
pub const RIGHT_EYE_INPUT: &str = "right_eye_image";
pub const HEAD_POSE_INPUT: &str = "head_pose_angles";

/// Pixels per unit of gaze when drawing the arrows
const ARROW_SCALE: f32 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GazeVector {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl GazeVector {
    pub fn show_text(&self, frame: &mut RgbImage, pos: i32) {
        let ypos = (frame.height() as i32 - pos).abs();
        let text = format!(
            "Gaze Vector: x: {:.2}, y: {:.2}, z: {:.2}",
            self.x, self.y, self.z
        );
        draw::put_text(frame, &text, (15, ypos), 1.5, draw::WHITE, 1);
    }

    /// Start of the arrow ending at `eye`
    fn arrow_tail(&self, eye: Point) -> Point {
        (
            eye.0 + (self.x * ARROW_SCALE) as i32,
            eye.1 - (self.y * ARROW_SCALE) as i32,
        )
    }
}

/// Read the gaze vector from the first output
pub fn decode_gaze(outputs: &ModelOutputs) -> Result<GazeVector> {
    let values = outputs
        .by_name_or_index("gaze_vector", 0)
        .map(|t| t.data.as_slice())
        .unwrap_or_default();
    match values {
        [x, y, z, ..] => Ok(GazeVector {
            x: *x,
            y: *y,
            z: *z,
        }),
        _ => Err(ModelError::InvalidModel(format!(
            "gaze output has {} values, expected 3",
            values.len()
        ))
        .into()),
    }
}

/// Arrows from each eye along the gaze direction. Eye points must be in
/// `frame` coordinates.
pub fn draw_output(gaze: &GazeVector, eyes: &EyeRegions, frame: &mut RgbImage) {
    for eye in [eyes.left_eye_point, eyes.right_eye_point] {
        draw::arrowed_line(frame, gaze.arrow_tail(eye), eye, draw::RED, 2, 0.2);
    }
}

pub struct GazeEstimation {
    inner: InferenceModel,
}

impl GazeEstimation {
    pub fn load(model_name: impl AsRef<Path>, settings: &ModelSettings) -> Result<Self> {
        let inner = InferenceModel::load(model_name, settings)?;
        for name in [LEFT_EYE_INPUT, RIGHT_EYE_INPUT, HEAD_POSE_INPUT] {
            inner.input(name)?;
        }
        Ok(Self { inner })
    }

    pub fn inner(&self) -> &InferenceModel {
        &self.inner
    }

    /// Estimate gaze from eye patches and head pose.
    ///
    /// `eyes` carries the patches cut from the face crop and the eye points
    /// used for drawing, which must already be in `frame` coordinates.
    pub fn predict(
        &mut self,
        frame: &mut RgbImage,
        eyes: &EyeRegions,
        head_pose: &HeadPoseAngles,
        show_bbox: bool,
    ) -> Result<Prediction<GazeVector>> {
        let size = InferenceModel::spatial_size(self.inner.input(LEFT_EYE_INPUT)?)?;

        let (left, right) = match (&eyes.left_eye_image, &eyes.right_eye_image) {
            (Some(left), Some(right)) => (left, right),
            _ => {
                return Err(
                    ModelError::InvalidImageArray("eye patch is empty".to_string()).into(),
                )
            }
        };

        let angles = arr1(&head_pose.as_array())
            .into_shape_with_order(IxDyn(&[1, 3]))
            .map_err(|e| ModelError::InvalidImageArray(e.to_string()))?;
        let inputs = [
            InputBlob::new(LEFT_EYE_INPUT, preprocess_input(left, size)),
            InputBlob::new(RIGHT_EYE_INPUT, preprocess_input(right, size)),
            InputBlob::new(HEAD_POSE_INPUT, angles),
        ];

        let start = Instant::now();
        let outputs = self.inner.infer(&inputs)?;
        let inference_ms = start.elapsed().as_secs_f64() * 1000.0;

        let gaze = decode_gaze(&outputs)?;
        if show_bbox {
            draw_output(&gaze, eyes, frame);
        }

        Ok(Prediction {
            inference_ms,
            output: gaze,
            gray_frame: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tensor::OutputTensor;

    #[test]
    fn test_decode_gaze() {
        let outputs = ModelOutputs::new(vec![OutputTensor::new(
            "gaze_vector",
            vec![1, 3],
            vec![0.25, -0.1, -0.96],
        )]);
        let gaze = decode_gaze(&outputs).unwrap();
        assert_eq!(
            gaze,
            GazeVector {
                x: 0.25,
                y: -0.1,
                z: -0.96
            }
        );
    }

    #[test]
    fn test_decode_gaze_short_output() {
        let outputs = ModelOutputs::new(vec![OutputTensor::new("gaze_vector", vec![1, 2], vec![0.0, 1.0])]);
        assert!(decode_gaze(&outputs).is_err());
        assert!(decode_gaze(&ModelOutputs::default()).is_err());
    }

    #[test]
    fn test_arrow_tail() {
        let gaze = GazeVector {
            x: 0.1,
            y: 0.2,
            z: -1.0,
        };
        assert_eq!(gaze.arrow_tail((100, 100)), (150, 0));
    }

    #[test]
    fn test_draw_output_marks_both_eyes() {
        let mut frame = RgbImage::new(200, 100);
        let eyes = EyeRegions {
            left_eye_point: (60, 50),
            right_eye_point: (140, 50),
            left_eye_image: None,
            right_eye_image: None,
        };
        let gaze = GazeVector {
            x: 0.05,
            y: 0.0,
            z: -1.0,
        };
        draw_output(&gaze, &eyes, &mut frame);
        assert_eq!(*frame.get_pixel(70, 50), draw::RED);
        assert_eq!(*frame.get_pixel(150, 50), draw::RED);
    }
}
