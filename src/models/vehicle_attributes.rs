//! Vehicle attributes recognition (`vehicle-attributes-recognition-barrier-0039`)
//!
//! Outputs:
//! - `color`: `[1, 7]` softmax
//! - `type`: `[1, 4]` softmax

use std::path::Path;

use anyhow::Result;
use image::RgbImage;
use serde::Serialize;

use crate::draw;
use crate::engine::faults::ModelError;
use crate::engine::model::{Decoder, Model, ModelSettings};
use crate::engine::tensor::ModelOutputs;
use crate::utils::math::argmax_with_value;

pub type VehicleAttributes = Model<VehicleAttributesDecoder>;

pub const VEHICLE_COLORS: [&str; 7] = ["white", "gray", "yellow", "red", "green", "blue", "black"];
pub const VEHICLE_TYPES: [&str; 4] = ["car", "bus", "truck", "van"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleAttributesResult {
    pub color: String,
    pub color_confidence: f32,
    #[serde(rename = "type")]
    pub vehicle_type: String,
    pub type_confidence: f32,
}

#[derive(Default)]
pub struct VehicleAttributesDecoder;

/// Pick the winning label of one softmax head
fn classify(
    outputs: &ModelOutputs,
    name: &str,
    index: usize,
    labels: &[&'static str],
) -> Result<(&'static str, f32)> {
    let scores = outputs
        .by_name_or_index(name, index)
        .map(|t| t.data.as_slice())
        .unwrap_or_default();
    if scores.len() != labels.len() {
        return Err(ModelError::InvalidModel(format!(
            "{} output has {} values, expected {}",
            name,
            scores.len(),
            labels.len()
        ))
        .into());
    }
    let (idx, confidence) = argmax_with_value(scores).unwrap_or((0, 0.0));
    Ok((labels[idx], confidence))
}

impl Decoder for VehicleAttributesDecoder {
    type Output = VehicleAttributesResult;

    fn configure(_model_name: &Path, _settings: &ModelSettings) -> Self {
        Self
    }

    fn decode(&self, outputs: &ModelOutputs, _frame: &RgbImage) -> Result<Self::Output> {
        let (color, color_confidence) = classify(outputs, "color", 0, &VEHICLE_COLORS)?;
        let (vehicle_type, type_confidence) = classify(outputs, "type", 1, &VEHICLE_TYPES)?;

        Ok(VehicleAttributesResult {
            color: color.to_string(),
            color_confidence,
            vehicle_type: vehicle_type.to_string(),
            type_confidence,
        })
    }

    fn draw(&self, output: &Self::Output, frame: &mut RgbImage) {
        let text = format!("{} {}", output.color, output.vehicle_type);
        draw::put_text(frame, &text, (10, 30), 1.5, draw::GREEN, 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tensor::OutputTensor;

    fn outputs(color: Vec<f32>, kind: Vec<f32>) -> ModelOutputs {
        ModelOutputs::new(vec![
            OutputTensor::new("color", vec![1, color.len() as i64], color),
            OutputTensor::new("type", vec![1, kind.len() as i64], kind),
        ])
    }

    #[test]
    fn test_decode() {
        let result = VehicleAttributesDecoder
            .decode(
                &outputs(
                    vec![0.05, 0.05, 0.05, 0.7, 0.05, 0.05, 0.05],
                    vec![0.1, 0.1, 0.6, 0.2],
                ),
                &RgbImage::new(1, 1),
            )
            .unwrap();
        assert_eq!(result.color, "red");
        assert_eq!(result.vehicle_type, "truck");
        assert!((result.color_confidence - 0.7).abs() < 1e-6);
        assert!((result.type_confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_decode_wrong_head_size() {
        let result = VehicleAttributesDecoder.decode(
            &outputs(vec![0.5, 0.5], vec![0.1, 0.1, 0.6, 0.2]),
            &RgbImage::new(1, 1),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_type_field() {
        let result = VehicleAttributesResult {
            color: "blue".to_string(),
            color_confidence: 0.9,
            vehicle_type: "van".to_string(),
            type_confidence: 0.8,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "van");
    }
}
