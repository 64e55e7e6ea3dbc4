//! SSD-style detection output shared by the face and person detectors
//!
//! The `DetectionOutput` layer emits a `[1, 1, N, 7]` blob whose rows are
//! `[image_id, label, conf, x_min, y_min, x_max, y_max]` with normalised
//! coordinates. A negative `image_id` marks the end of valid rows.

use anyhow::Result;
use image::RgbImage;
use serde::Serialize;

use crate::draw::{self, Color, FILLED};
use crate::engine::faults::ModelError;
use crate::engine::preprocess::crop_region;
use crate::engine::tensor::ModelOutputs;

const ROW_LEN: usize = 7;

/// A detection in source-frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    pub label: i32,
    pub confidence: f32,
    pub xmin: i32,
    pub ymin: i32,
    pub xmax: i32,
    pub ymax: i32,
}

impl Detection {
    pub fn width(&self) -> i32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> i32 {
        self.ymax - self.ymin
    }

    /// Cut the detected region out of a frame
    pub fn crop(&self, frame: &RgbImage) -> Option<RgbImage> {
        crop_region(frame, self.xmin, self.ymin, self.xmax, self.ymax)
    }
}

/// Decode the first output as SSD rows, keeping those at or above `threshold`
pub fn decode_ssd(
    outputs: &ModelOutputs,
    threshold: f32,
    source_size: (u32, u32),
) -> Result<Vec<Detection>> {
    let blob = outputs
        .by_name_or_index("detection_out", 0)
        .ok_or_else(|| ModelError::InvalidModel("detection model has no outputs".to_string()))?;

    if blob.data.len() % ROW_LEN != 0 {
        return Err(ModelError::InvalidModel(format!(
            "detection output {} has {} values, not a multiple of {}",
            blob.name,
            blob.data.len(),
            ROW_LEN
        ))
        .into());
    }

    let (width, height) = (source_size.0 as f32, source_size.1 as f32);
    let mut detections = Vec::new();
    for row in blob.data.chunks_exact(ROW_LEN) {
        if row[0] < 0.0 {
            break;
        }
        let confidence = row[2];
        if confidence.is_nan() || confidence < threshold {
            continue;
        }
        detections.push(Detection {
            label: row[1] as i32,
            confidence,
            xmin: (row[3] * width) as i32,
            ymin: (row[4] * height) as i32,
            xmax: (row[5] * width) as i32,
            ymax: (row[6] * height) as i32,
        });
    }

    Ok(detections)
}

/// Styling for a labelled bounding box
#[derive(Debug, Clone)]
pub struct BoxStyle {
    pub bbox_color: Color,
    /// Extra label background as a fraction of the label `(width, height)`
    pub padding: (f32, f32),
    pub text_color: Color,
    pub text_scale: f32,
    pub text_thickness: i32,
}

impl Default for BoxStyle {
    fn default() -> Self {
        Self {
            bbox_color: draw::GREEN,
            padding: (0.05, 0.25),
            text_color: draw::WHITE,
            text_scale: 2.0,
            text_thickness: 2,
        }
    }
}

/// Box outline with a filled label tab in its top-left corner
pub fn draw_labelled_box(frame: &mut RgbImage, det: &Detection, label: &str, style: &BoxStyle) {
    draw::rectangle(
        frame,
        (det.xmin, det.ymin),
        (det.xmax, det.ymax),
        style.bbox_color,
        2,
    );

    let (label_w, label_h) = draw::text_size(label, style.text_scale, style.text_thickness);
    let (label_w, label_h) = (label_w as f32, label_h as f32);
    let tab_right = (det.xmin as f32 + label_w + label_w * style.padding.0) as i32;
    let tab_bottom = (det.ymin as f32 + label_h + label_h * style.padding.1) as i32;

    draw::rectangle(
        frame,
        (det.xmin, det.ymin),
        (tab_right, tab_bottom),
        style.bbox_color,
        FILLED,
    );
    draw::put_text(
        frame,
        label,
        (det.xmin, tab_bottom),
        style.text_scale,
        style.text_color,
        style.text_thickness,
    );
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::engine::tensor::OutputTensor;

    pub(crate) fn ssd_outputs(rows: &[[f32; 7]]) -> ModelOutputs {
        let data: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        ModelOutputs::new(vec![OutputTensor::new(
            "detection_out",
            vec![1, 1, rows.len() as i64, 7],
            data,
        )])
    }

    #[test]
    fn test_decode_filters_and_scales() {
        let outputs = ssd_outputs(&[
            [0.0, 1.0, 0.95, 0.1, 0.2, 0.3, 0.4],
            [0.0, 1.0, 0.30, 0.5, 0.5, 0.6, 0.6],
            [0.0, 1.0, 0.60, 0.5, 0.5, 1.0, 1.0],
        ]);
        let dets = decode_ssd(&outputs, 0.6, (1000, 500)).unwrap();
        assert_eq!(dets.len(), 2);
        assert_eq!(
            (dets[0].xmin, dets[0].ymin, dets[0].xmax, dets[0].ymax),
            (100, 100, 300, 200)
        );
        assert_eq!(dets[1].xmax, 1000);
        assert_eq!(dets[1].width(), 500);
        assert_eq!(dets[1].height(), 250);
    }

    #[test]
    fn test_decode_stops_at_terminator() {
        let outputs = ssd_outputs(&[
            [0.0, 1.0, 0.9, 0.0, 0.0, 0.5, 0.5],
            [-1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.9, 0.5, 0.5, 1.0, 1.0],
        ]);
        assert_eq!(decode_ssd(&outputs, 0.5, (100, 100)).unwrap().len(), 1);
    }

    #[test]
    fn test_decode_skips_nan_confidence() {
        let outputs = ssd_outputs(&[
            [0.0, 1.0, f32::NAN, 0.1, 0.1, 0.2, 0.2],
            [0.0, 1.0, 0.8, 0.5, 0.5, 0.6, 0.6],
        ]);
        let dets = decode_ssd(&outputs, 0.5, (100, 100)).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].confidence, 0.8);
    }

    #[test]
    fn test_decode_rejects_ragged_output() {
        let outputs = ModelOutputs::new(vec![OutputTensor::new("detection_out", vec![1, 5], vec![0.0; 5])]);
        let err = decode_ssd(&outputs, 0.5, (10, 10)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ModelError>(),
            Some(ModelError::InvalidModel(_))
        ));
    }

    #[test]
    fn test_draw_labelled_box() {
        let mut frame = RgbImage::new(200, 200);
        let det = Detection {
            label: 1,
            confidence: 0.9,
            xmin: 20,
            ymin: 20,
            xmax: 150,
            ymax: 180,
        };
        draw_labelled_box(&mut frame, &det, "Face", &BoxStyle::default());
        assert_eq!(*frame.get_pixel(150, 100), draw::GREEN);
        // label tab is filled from the box corner
        assert_ne!(*frame.get_pixel(21, 21), image::Rgb([0, 0, 0]));
    }

    #[test]
    fn test_crop() {
        let frame = RgbImage::new(50, 40);
        let det = Detection {
            label: 1,
            confidence: 1.0,
            xmin: 10,
            ymin: 5,
            xmax: 30,
            ymax: 25,
        };
        assert_eq!(det.crop(&frame).unwrap().dimensions(), (20, 20));
    }
}
