//! Person detection (`person-detection-retail-0013`)

use std::path::Path;

use anyhow::Result;
use image::RgbImage;

use super::detection::{decode_ssd, draw_labelled_box, BoxStyle, Detection};
use crate::draw;
use crate::engine::model::{Decoder, Model, ModelSettings};
use crate::engine::tensor::ModelOutputs;

pub type PersonDetection = Model<PersonDetector>;

pub struct PersonDetector {
    threshold: f32,
    source_size: Option<(u32, u32)>,
    style: BoxStyle,
}

impl Decoder for PersonDetector {
    type Output = Vec<Detection>;

    fn configure(_model_name: &Path, settings: &ModelSettings) -> Self {
        Self {
            threshold: settings.threshold,
            source_size: settings.source_size,
            style: BoxStyle {
                bbox_color: draw::BLUE,
                ..BoxStyle::default()
            },
        }
    }

    fn decode(&self, outputs: &ModelOutputs, frame: &RgbImage) -> Result<Self::Output> {
        let size = self.source_size.unwrap_or_else(|| frame.dimensions());
        decode_ssd(outputs, self.threshold, size)
    }

    fn draw(&self, output: &Self::Output, frame: &mut RgbImage) {
        for person in output {
            let label = format!("Person {:.0}%", person.confidence * 100.0);
            draw_labelled_box(frame, person, &label, &self.style);
        }
    }
}
