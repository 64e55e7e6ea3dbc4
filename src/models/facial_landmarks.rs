//! Facial landmarks
//!
//! Two model families share this decoder:
//! - `landmarks-regression-retail-0009`: 10 values, five `(x, y)` points
//!   (left eye, right eye, nose tip, left and right mouth corners)
//! - `facial-landmarks-35-adas-0002`: 70 values, 35 points
//!
//! Coordinates are normalised to the face crop fed to the network.

use std::path::Path;

use anyhow::Result;
use image::RgbImage;
use serde::Serialize;

use crate::draw::{self, Point, FILLED};
use crate::engine::faults::ModelError;
use crate::engine::model::{Decoder, Model, ModelSettings};
use crate::engine::preprocess::crop_region;
use crate::engine::tensor::ModelOutputs;

pub type FacialLandmarks = Model<LandmarksDecoder>;

/// Half-size of the square cut around each eye
pub const EYE_SIZE: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LandmarkModel {
    LandmarksRegressionRetail,
    FacialLandmarks35Adas,
}

impl LandmarkModel {
    /// Guess the family from the model file name
    pub fn from_model_name(name: &str) -> Self {
        if name.contains("regression") {
            LandmarkModel::LandmarksRegressionRetail
        } else {
            LandmarkModel::FacialLandmarks35Adas
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LandmarkModel::LandmarksRegressionRetail => "landmarks-regression-retail",
            LandmarkModel::FacialLandmarks35Adas => "facial-landmarks-35-adas",
        }
    }
}

/// Eye centres plus the square patches cut around them
#[derive(Debug, Clone, Serialize)]
pub struct EyeRegions {
    pub left_eye_point: Point,
    pub right_eye_point: Point,
    #[serde(skip)]
    pub left_eye_image: Option<RgbImage>,
    #[serde(skip)]
    pub right_eye_image: Option<RgbImage>,
}

impl EyeRegions {
    /// Cut `EYE_SIZE` patches around both eye points
    pub fn from_points(face: &RgbImage, left: Point, right: Point) -> Self {
        Self {
            left_eye_point: left,
            right_eye_point: right,
            left_eye_image: eye_patch(face, left),
            right_eye_image: eye_patch(face, right),
        }
    }

    /// Shift the eye points by a crop offset
    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self {
            left_eye_point: (self.left_eye_point.0 + dx, self.left_eye_point.1 + dy),
            right_eye_point: (self.right_eye_point.0 + dx, self.right_eye_point.1 + dy),
            left_eye_image: self.left_eye_image.clone(),
            right_eye_image: self.right_eye_image.clone(),
        }
    }
}

fn eye_patch(face: &RgbImage, center: Point) -> Option<RgbImage> {
    crop_region(
        face,
        center.0 - EYE_SIZE,
        center.1 - EYE_SIZE,
        center.0 + EYE_SIZE,
        center.1 + EYE_SIZE,
    )
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LandmarkGroups {
    pub eyes: Vec<Point>,
    pub nose: Vec<Point>,
    pub mouth: Vec<Point>,
    pub face_contour: Vec<Point>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FaceLandmarks {
    #[serde(rename = "type")]
    pub model_type: LandmarkModel,
    pub points: Vec<Point>,
    pub groups: LandmarkGroups,
    pub eyes: EyeRegions,
}

pub struct LandmarksDecoder {
    model_type: LandmarkModel,
    marker_radius: i32,
    color: draw::Color,
    thickness: i32,
}

impl LandmarksDecoder {
    pub fn new(model_type: LandmarkModel) -> Self {
        Self {
            model_type,
            marker_radius: 2 * EYE_SIZE,
            color: draw::RED,
            thickness: 2,
        }
    }

    pub fn model_type(&self) -> LandmarkModel {
        self.model_type
    }
}

fn midpoint(a: Point, b: Point) -> Point {
    ((a.0 + b.0) / 2, (a.1 + b.1) / 2)
}

impl Decoder for LandmarksDecoder {
    type Output = FaceLandmarks;

    fn configure(model_name: &Path, _settings: &ModelSettings) -> Self {
        let name = model_name
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(LandmarkModel::from_model_name(&name))
    }

    fn decode(&self, outputs: &ModelOutputs, face: &RgbImage) -> Result<Self::Output> {
        let values = outputs.flatten();
        let (face_w, face_h) = (face.width() as f32, face.height() as f32);

        let points: Vec<Point> = values
            .chunks_exact(2)
            .map(|xy| ((face_w * xy[0]) as i32, (face_h * xy[1]) as i32))
            .collect();

        let (groups, left, right) = match values.len() {
            70 => {
                let groups = LandmarkGroups {
                    eyes: points[..4].to_vec(),
                    nose: points[4..8].to_vec(),
                    mouth: points[8..12].to_vec(),
                    face_contour: points[12..].to_vec(),
                };
                (groups, midpoint(points[0], points[1]), midpoint(points[2], points[3]))
            }
            10 => {
                let groups = LandmarkGroups {
                    eyes: points[..2].to_vec(),
                    nose: points[2..3].to_vec(),
                    mouth: points[3..5].to_vec(),
                    face_contour: Vec::new(),
                };
                (groups, points[0], points[1])
            }
            n => {
                return Err(ModelError::InvalidModel(format!(
                    "landmarks model produced {} values, expected 10 or 70",
                    n
                ))
                .into())
            }
        };

        Ok(FaceLandmarks {
            model_type: self.model_type,
            eyes: EyeRegions::from_points(face, left, right),
            points,
            groups,
        })
    }

    fn draw(&self, output: &Self::Output, face: &mut RgbImage) {
        for eye in [output.eyes.left_eye_point, output.eyes.right_eye_point] {
            draw::circle(face, eye, self.marker_radius, self.color, self.thickness);
        }
        for point in &output.points {
            draw::circle(face, *point, 2, draw::GREEN, FILLED);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tensor::OutputTensor;

    fn outputs(values: Vec<f32>) -> ModelOutputs {
        ModelOutputs::new(vec![OutputTensor::new(
            "95",
            vec![1, values.len() as i64, 1, 1],
            values,
        )])
    }

    #[test]
    fn test_model_type_from_name() {
        assert_eq!(
            LandmarkModel::from_model_name("landmarks-regression-retail-0009"),
            LandmarkModel::LandmarksRegressionRetail
        );
        assert_eq!(
            LandmarkModel::from_model_name("facial-landmarks-35-adas-0002"),
            LandmarkModel::FacialLandmarks35Adas
        );
        let decoder = LandmarksDecoder::configure(
            Path::new("models/intel/landmarks-regression-retail-0009"),
            &ModelSettings::default(),
        );
        assert_eq!(decoder.model_type(), LandmarkModel::LandmarksRegressionRetail);
    }

    #[test]
    fn test_five_point_decode() {
        let decoder = LandmarksDecoder::new(LandmarkModel::LandmarksRegressionRetail);
        let face = RgbImage::new(100, 200);
        let out = decoder
            .decode(
                &outputs(vec![0.3, 0.4, 0.7, 0.4, 0.5, 0.6, 0.35, 0.8, 0.65, 0.8]),
                &face,
            )
            .unwrap();

        assert_eq!(out.points.len(), 5);
        assert_eq!(out.eyes.left_eye_point, (30, 80));
        assert_eq!(out.eyes.right_eye_point, (70, 80));
        assert_eq!(out.groups.nose, vec![(50, 120)]);
        assert_eq!(out.groups.mouth, vec![(35, 160), (65, 160)]);
        assert!(out.groups.face_contour.is_empty());

        let left = out.eyes.left_eye_image.as_ref().unwrap();
        assert_eq!(left.dimensions(), (20, 20));
    }

    #[test]
    fn test_eye_patch_clamped_at_border() {
        let decoder = LandmarksDecoder::new(LandmarkModel::LandmarksRegressionRetail);
        let face = RgbImage::new(50, 50);
        let out = decoder
            .decode(
                &outputs(vec![0.0, 0.0, 1.0, 1.0, 0.5, 0.5, 0.4, 0.8, 0.6, 0.8]),
                &face,
            )
            .unwrap();
        assert_eq!(out.eyes.left_eye_image.as_ref().unwrap().dimensions(), (10, 10));
        assert_eq!(out.eyes.right_eye_image.as_ref().unwrap().dimensions(), (10, 10));
    }

    #[test]
    fn test_thirty_five_point_groups() {
        let decoder = LandmarksDecoder::new(LandmarkModel::FacialLandmarks35Adas);
        let face = RgbImage::new(60, 60);
        let mut values = vec![0.5; 70];
        values[0] = 0.2;
        values[2] = 0.4;
        let out = decoder.decode(&outputs(values), &face).unwrap();

        assert_eq!(out.groups.eyes.len(), 4);
        assert_eq!(out.groups.nose.len(), 4);
        assert_eq!(out.groups.mouth.len(), 4);
        assert_eq!(out.groups.face_contour.len(), 23);
        assert_eq!(out.eyes.left_eye_point, (18, 30));
    }

    #[test]
    fn test_unexpected_length() {
        let decoder = LandmarksDecoder::new(LandmarkModel::FacialLandmarks35Adas);
        let err = decoder
            .decode(&outputs(vec![0.1; 12]), &RgbImage::new(10, 10))
            .unwrap_err();
        assert!(err.downcast_ref::<ModelError>().is_some());
    }

    #[test]
    fn test_translated() {
        let face = RgbImage::new(40, 40);
        let eyes = EyeRegions::from_points(&face, (10, 12), (30, 12)).translated(100, 50);
        assert_eq!(eyes.left_eye_point, (110, 62));
        assert_eq!(eyes.right_eye_point, (130, 62));
    }
}
