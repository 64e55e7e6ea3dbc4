//! Text recognition (`text-recognition-0012`)
//!
//! The network reads a single-channel `[1, 1, 32, 120]` crop and emits
//! per-timestep class scores `[T, 1, 37]`. Decoding is greedy CTC: take the
//! best class per step, collapse repeats and drop the blank. Step scores are
//! logits and go through softmax before they count as confidences.

use std::path::Path;

use anyhow::Result;
use image::RgbImage;
use serde::Serialize;

use crate::draw;
use crate::engine::faults::ModelError;
use crate::engine::model::{Decoder, Model, ModelSettings};
use crate::engine::tensor::ModelOutputs;
use crate::utils::math::{argmax_with_value, softmax};

pub type TextRecognition = Model<TextDecoder>;

pub const ALPHABET: &str = "0123456789abcdefghijklmnopqrstuvwxyz#";
pub const BLANK: char = '#';

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognizedText {
    pub text: String,
    /// Mean confidence of the kept characters
    pub confidence: f32,
}

pub struct TextDecoder {
    alphabet: Vec<char>,
}

impl Default for TextDecoder {
    fn default() -> Self {
        Self {
            alphabet: ALPHABET.chars().collect(),
        }
    }
}

impl TextDecoder {
    /// Greedy CTC over row-major `[steps, classes]` scores
    pub fn ctc_greedy(&self, scores: &[f32]) -> Result<RecognizedText> {
        let classes = self.alphabet.len();
        if scores.len() % classes != 0 {
            return Err(ModelError::InvalidModel(format!(
                "text output of {} values is not a multiple of {} classes",
                scores.len(),
                classes
            ))
            .into());
        }

        let mut text = String::new();
        let mut total = 0.0;
        let mut previous = None;
        for step in scores.chunks(classes) {
            let Some((idx, score)) = argmax_with_value(&softmax(step)) else {
                continue;
            };
            let ch = self.alphabet[idx];
            if previous != Some(idx) && ch != BLANK {
                text.push(ch);
                total += score;
            }
            previous = Some(idx);
        }

        let confidence = if text.is_empty() {
            0.0
        } else {
            total / text.chars().count() as f32
        };
        Ok(RecognizedText { text, confidence })
    }
}

impl Decoder for TextDecoder {
    type Output = RecognizedText;

    fn configure(_model_name: &Path, _settings: &ModelSettings) -> Self {
        Self::default()
    }

    fn decode(&self, outputs: &ModelOutputs, _frame: &RgbImage) -> Result<Self::Output> {
        let scores = outputs
            .get(0)
            .ok_or_else(|| ModelError::InvalidModel("text model has no outputs".to_string()))?;
        let result = self.ctc_greedy(&scores.data)?;
        tracing::debug!("Recognized text: {:?}", result.text);
        Ok(result)
    }

    fn draw(&self, output: &Self::Output, frame: &mut RgbImage) {
        draw::put_text(frame, &output.text, (5, 20), 1.0, draw::RED, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_hot(indices: &[usize]) -> Vec<f32> {
        let mut scores = Vec::new();
        for &idx in indices {
            let mut step = vec![0.0; ALPHABET.len()];
            step[idx] = 0.9;
            scores.extend(step);
        }
        scores
    }

    #[test]
    fn test_ctc_collapses_repeats_and_blanks() {
        // "h h # e l # l o" -> "hello"
        let blank = ALPHABET.len() - 1;
        let scores = one_hot(&[17, 17, blank, 14, 21, blank, 21, 24]);
        let result = TextDecoder::default().ctc_greedy(&scores).unwrap();
        assert_eq!(result.text, "hello");
        let mut step = vec![0.0; ALPHABET.len()];
        step[17] = 0.9;
        assert!((result.confidence - softmax(&step)[17]).abs() < 1e-6);
    }

    #[test]
    fn test_ctc_digits() {
        let scores = one_hot(&[1, 2, 2, 3]);
        let result = TextDecoder::default().ctc_greedy(&scores).unwrap();
        assert_eq!(result.text, "123");
    }

    #[test]
    fn test_ctc_all_blank() {
        let blank = ALPHABET.len() - 1;
        let result = TextDecoder::default()
            .ctc_greedy(&one_hot(&[blank, blank]))
            .unwrap();
        assert!(result.text.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_ctc_confidence_from_logits() {
        let mut scores = vec![-5.0; ALPHABET.len()];
        scores[1] = 5.0;
        let result = TextDecoder::default().ctc_greedy(&scores).unwrap();
        assert_eq!(result.text, "1");
        assert!(result.confidence > 0.99 && result.confidence <= 1.0);
    }

    #[test]
    fn test_ctc_rejects_ragged_scores() {
        assert!(TextDecoder::default().ctc_greedy(&[0.0; 40]).is_err());
    }
}
