//! Emotion recognition (`emotions-recognition-retail-0003`)

use std::path::Path;

use anyhow::Result;
use image::RgbImage;
use serde::Serialize;

use crate::draw;
use crate::engine::faults::ModelError;
use crate::engine::model::{Decoder, Model, ModelSettings};
use crate::engine::tensor::ModelOutputs;
use crate::utils::math::argmax_with_value;

pub type Emotions = Model<EmotionsDecoder>;

/// Emotion classes in model output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Neutral,
    Happy,
    Sad,
    Surprise,
    Anger,
}

impl Emotion {
    pub const ALL: [Emotion; 5] = [
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprise,
        Emotion::Anger,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Surprise => "surprise",
            Emotion::Anger => "anger",
        }
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct EmotionalState {
    pub emotion: Emotion,
    pub confidence: f32,
}

#[derive(Default)]
pub struct EmotionsDecoder;

impl Decoder for EmotionsDecoder {
    type Output = EmotionalState;

    fn configure(_model_name: &Path, _settings: &ModelSettings) -> Self {
        Self
    }

    fn decode(&self, outputs: &ModelOutputs, _frame: &RgbImage) -> Result<Self::Output> {
        let scores = outputs.flatten();
        if scores.len() != Emotion::ALL.len() {
            return Err(ModelError::InvalidModel(format!(
                "emotions model produced {} scores, expected {}",
                scores.len(),
                Emotion::ALL.len()
            ))
            .into());
        }

        let (idx, confidence) = argmax_with_value(&scores).unwrap_or((0, 0.0));
        let emotion = Emotion::from_index(idx).unwrap_or(Emotion::Neutral);
        tracing::debug!("Emotion scores: {:?} -> {}", scores, emotion.as_str());

        Ok(EmotionalState {
            emotion,
            confidence,
        })
    }

    fn draw(&self, output: &Self::Output, frame: &mut RgbImage) {
        let origin = (frame.width() as i32 / 4, frame.height() as i32 / 2);
        let text = format!("Emotional State: {}", output.emotion.as_str());
        draw::put_text(frame, &text, origin, 2.0, draw::RED, 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tensor::OutputTensor;

    fn outputs(scores: Vec<f32>) -> ModelOutputs {
        ModelOutputs::new(vec![OutputTensor::new(
            "prob_emotion",
            vec![1, scores.len() as i64, 1, 1],
            scores,
        )])
    }

    #[test]
    fn test_emotion_from_index() {
        assert_eq!(Emotion::from_index(0), Some(Emotion::Neutral));
        assert_eq!(Emotion::from_index(2), Some(Emotion::Sad));
        assert_eq!(Emotion::from_index(4), Some(Emotion::Anger));
        assert_eq!(Emotion::from_index(5), None);
    }

    #[test]
    fn test_decode_argmax() {
        let state = EmotionsDecoder
            .decode(&outputs(vec![0.05, 0.1, 0.05, 0.7, 0.1]), &RgbImage::new(1, 1))
            .unwrap();
        assert_eq!(state.emotion, Emotion::Surprise);
        assert!((state.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_decode_uniform_scores_is_neutral() {
        let state = EmotionsDecoder
            .decode(&outputs(vec![0.2; 5]), &RgbImage::new(1, 1))
            .unwrap();
        assert_eq!(state.emotion, Emotion::Neutral);
    }

    #[test]
    fn test_decode_wrong_class_count() {
        assert!(EmotionsDecoder
            .decode(&outputs(vec![0.5, 0.5]), &RgbImage::new(1, 1))
            .is_err());
    }

    #[test]
    fn test_draw_writes_text() {
        let mut frame = RgbImage::new(400, 200);
        let state = EmotionalState {
            emotion: Emotion::Happy,
            confidence: 0.9,
        };
        EmotionsDecoder.draw(&state, &mut frame);
        assert!(frame.pixels().any(|p| *p == draw::RED));
    }
}
