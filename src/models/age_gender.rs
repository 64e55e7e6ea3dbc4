//! Age and gender recognition (`age-gender-recognition-retail-0013`)
//!
//! Outputs:
//! - `age_conv3`: `[1, 1, 1, 1]`, age divided by 100
//! - `prob`: `[1, 2, 1, 1]`, softmax over `[female, male]`

use std::path::Path;

use anyhow::Result;
use image::RgbImage;
use serde::Serialize;

use crate::draw;
use crate::engine::faults::ModelError;
use crate::engine::model::{Decoder, Model, ModelSettings};
use crate::engine::tensor::ModelOutputs;

pub type AgeGender = Model<AgeGenderDecoder>;

/// Gender classification result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    /// Capitalised name for on-frame labels
    pub fn label(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

/// Frame label, e.g. `Male, 35`
pub fn label_text(result: &AgeGenderResult) -> String {
    format!("{}, {}", result.gender.label(), result.age)
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AgeGenderResult {
    pub age: i32,
    pub gender: Gender,
    pub gender_confidence: f32,
}

pub struct AgeGenderDecoder {
    color: draw::Color,
}

impl Default for AgeGenderDecoder {
    fn default() -> Self {
        Self { color: draw::GREEN }
    }
}

impl Decoder for AgeGenderDecoder {
    type Output = AgeGenderResult;

    fn configure(_model_name: &Path, _settings: &ModelSettings) -> Self {
        Self::default()
    }

    fn decode(&self, outputs: &ModelOutputs, _frame: &RgbImage) -> Result<Self::Output> {
        let age_scale = outputs
            .by_name_or_index("age_conv3", 0)
            .and_then(|t| t.data.first().copied())
            .ok_or_else(|| ModelError::InvalidModel("missing age output".to_string()))?;
        let probs = outputs
            .by_name_or_index("prob", 1)
            .map(|t| t.data.as_slice())
            .unwrap_or_default();

        let (female_prob, male_prob) = match probs {
            [female, male] => (*female, *male),
            _ => {
                return Err(ModelError::InvalidModel(format!(
                    "gender output has {} values, expected 2",
                    probs.len()
                ))
                .into())
            }
        };

        let (gender, gender_confidence) = if male_prob > female_prob {
            (Gender::Male, male_prob)
        } else {
            (Gender::Female, female_prob)
        };

        let age = ((age_scale * 100.0).round() as i32).clamp(0, 100);

        tracing::debug!(
            "Parsed: age={}, gender={:?}, conf={:.3}",
            age,
            gender,
            gender_confidence
        );

        Ok(AgeGenderResult {
            age,
            gender,
            gender_confidence,
        })
    }

    fn draw(&self, output: &Self::Output, frame: &mut RgbImage) {
        draw::put_text(frame, &label_text(output), (5, 20), 1.0, self.color, 1);
    }
}
