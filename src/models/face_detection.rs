//! Face detection (`face-detection-adas-0001`, `face-detection-retail-0004`)

use std::path::Path;

use anyhow::Result;
use image::RgbImage;

use super::detection::{decode_ssd, draw_labelled_box, BoxStyle, Detection};
use crate::engine::model::{Decoder, Model, ModelSettings};
use crate::engine::tensor::ModelOutputs;

pub type FaceDetection = Model<FaceDetector>;

pub struct FaceDetector {
    threshold: f32,
    source_size: Option<(u32, u32)>,
    style: BoxStyle,
}

impl FaceDetector {
    pub fn new(threshold: f32, source_size: Option<(u32, u32)>) -> Self {
        Self {
            threshold,
            source_size,
            style: BoxStyle::default(),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Decoder for FaceDetector {
    type Output = Vec<Detection>;

    fn configure(_model_name: &Path, settings: &ModelSettings) -> Self {
        Self::new(settings.threshold, settings.source_size)
    }

    fn decode(&self, outputs: &ModelOutputs, frame: &RgbImage) -> Result<Self::Output> {
        let size = self.source_size.unwrap_or_else(|| frame.dimensions());
        let faces = decode_ssd(outputs, self.threshold, size)?;
        tracing::debug!("Detected {} faces", faces.len());
        Ok(faces)
    }

    fn draw(&self, output: &Self::Output, frame: &mut RgbImage) {
        for face in output {
            draw_labelled_box(frame, face, "Face", &self.style);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::detection::tests::ssd_outputs;

    #[test]
    fn test_scales_to_frame_when_no_source_size() {
        let decoder = FaceDetector::new(0.6, None);
        let frame = RgbImage::new(640, 480);
        let outputs = ssd_outputs(&[[0.0, 1.0, 0.99, 0.25, 0.25, 0.75, 0.75]]);
        let faces = decoder.decode(&outputs, &frame).unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!((faces[0].xmin, faces[0].ymin), (160, 120));
        assert_eq!((faces[0].xmax, faces[0].ymax), (480, 360));
    }

    #[test]
    fn test_source_size_overrides_frame() {
        let decoder = FaceDetector::new(0.6, Some((1920, 1080)));
        let frame = RgbImage::new(640, 480);
        let outputs = ssd_outputs(&[[0.0, 1.0, 0.99, 0.5, 0.5, 1.0, 1.0]]);
        let faces = decoder.decode(&outputs, &frame).unwrap();
        assert_eq!((faces[0].xmin, faces[0].ymax), (960, 1080));
    }

    #[test]
    fn test_configure_uses_threshold() {
        let settings = ModelSettings {
            threshold: 0.8,
            ..ModelSettings::default()
        };
        let decoder = FaceDetector::configure(Path::new("face-detection-adas-0001"), &settings);
        assert!((decoder.threshold() - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_draw_marks_frame() {
        let decoder = FaceDetector::new(0.6, None);
        let mut frame = RgbImage::new(100, 100);
        let outputs = ssd_outputs(&[[0.0, 1.0, 0.99, 0.1, 0.1, 0.9, 0.9]]);
        let faces = decoder.decode(&outputs, &frame).unwrap();
        decoder.draw(&faces, &mut frame);
        assert_eq!(*frame.get_pixel(90, 50), crate::draw::GREEN);
    }
}
