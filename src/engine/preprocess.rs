//! Frame preprocessing for OpenVINO models
//!
//! Open Model Zoo networks take `[N, C, H, W]` blobs in BGR order with raw
//! `[0, 255]` values, so there is no mean/scale normalisation here.

use anyhow::Result;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage};
use ndarray::{Array4, ArrayD};

/// OpenCV derives sigma 1.1 for a 5x5 kernel when sigma is left at 0
const GRAY_BLUR_SIGMA: f32 = 1.1;

/// Resize a frame to `(width, height)` and lay it out as a `1x3xHxW` BGR blob
pub fn preprocess_input(frame: &RgbImage, size: (u32, u32)) -> ArrayD<f32> {
    let (target_w, target_h) = size;
    let resized = if frame.dimensions() == size {
        frame.clone()
    } else {
        image::imageops::resize(frame, target_w, target_h, FilterType::Triangle)
    };
    image_to_nchw(&resized).into_dyn()
}

/// Resize a frame to `(width, height)` and lay it out as a `1x1xHxW` luma blob
pub fn preprocess_gray_input(frame: &RgbImage, size: (u32, u32)) -> ArrayD<f32> {
    let (target_w, target_h) = size;
    let gray = DynamicImage::ImageRgb8(frame.clone()).to_luma8();
    let resized = image::imageops::resize(&gray, target_w, target_h, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 1, target_h as usize, target_w as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        tensor[[0, 0, y as usize, x as usize]] = pixel[0] as f32;
    }
    tensor.into_dyn()
}

/// Grayscale, Gaussian-blurred copy of the frame
pub fn gray_blurred(frame: &RgbImage) -> GrayImage {
    let gray = DynamicImage::ImageRgb8(frame.clone()).to_luma8();
    imageproc::filter::gaussian_blur_f32(&gray, GRAY_BLUR_SIGMA)
}

/// Convert image to NCHW tensor format in BGR channel order
fn image_to_nchw(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();

    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        tensor[[0, 0, y, x]] = pixel[2] as f32; // B
        tensor[[0, 1, y, x]] = pixel[1] as f32; // G
        tensor[[0, 2, y, x]] = pixel[0] as f32; // R
    }

    tensor
}

/// Crop a region, clamping it to the frame. Returns `None` when the
/// clamped region is empty.
pub fn crop_region(frame: &RgbImage, x1: i32, y1: i32, x2: i32, y2: i32) -> Option<RgbImage> {
    let (img_w, img_h) = frame.dimensions();

    let x1 = x1.clamp(0, img_w as i32) as u32;
    let y1 = y1.clamp(0, img_h as i32) as u32;
    let x2 = x2.clamp(0, img_w as i32) as u32;
    let y2 = y2.clamp(0, img_h as i32) as u32;

    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    Some(image::imageops::crop_imm(frame, x1, y1, x2 - x1, y2 - y1).to_image())
}

/// Decode image from bytes with EXIF orientation handling
pub fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    let image = image::load_from_memory(data)?;

    let oriented_image = apply_exif_orientation(data, image);

    Ok(oriented_image)
}

/// Apply EXIF orientation to correct image rotation
fn apply_exif_orientation(data: &[u8], image: DynamicImage) -> DynamicImage {
    use std::io::Cursor;

    let orientation = match exif::Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(exif_data) => exif_data
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .unwrap_or(1) as u8,
        Err(_) => 1,
    };

    // https://exiftool.org/TagNames/EXIF.html (Orientation)
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_preprocess_layout_is_bgr_nchw() {
        let frame = RgbImage::from_pixel(4, 2, Rgb([10, 20, 30]));
        let blob = preprocess_input(&frame, (4, 2));
        assert_eq!(blob.shape(), &[1, 3, 2, 4]);
        assert_eq!(blob[[0, 0, 1, 3]], 30.0);
        assert_eq!(blob[[0, 1, 1, 3]], 20.0);
        assert_eq!(blob[[0, 2, 1, 3]], 10.0);
    }

    #[test]
    fn test_preprocess_resizes() {
        let frame = RgbImage::from_pixel(100, 50, Rgb([255, 255, 255]));
        let blob = preprocess_input(&frame, (60, 30));
        assert_eq!(blob.shape(), &[1, 3, 30, 60]);
    }

    #[test]
    fn test_preprocess_gray_input() {
        let frame = RgbImage::from_pixel(10, 10, Rgb([255, 255, 255]));
        let blob = preprocess_gray_input(&frame, (120, 32));
        assert_eq!(blob.shape(), &[1, 1, 32, 120]);
        assert_eq!(blob[[0, 0, 16, 60]], 255.0);
    }

    #[test]
    fn test_gray_blurred_keeps_size() {
        let frame = RgbImage::from_pixel(16, 9, Rgb([200, 100, 50]));
        let gray = gray_blurred(&frame);
        assert_eq!(gray.dimensions(), (16, 9));
    }

    #[test]
    fn test_crop_region_clamps() {
        let frame = RgbImage::new(20, 10);
        let crop = crop_region(&frame, -5, -5, 8, 4).unwrap();
        assert_eq!(crop.dimensions(), (8, 4));
        assert!(crop_region(&frame, 25, 0, 30, 5).is_none());
    }

    #[test]
    fn test_decode_image_without_exif() {
        let frame = RgbImage::from_pixel(3, 2, Rgb([1, 2, 3]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        frame.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        let decoded = decode_image(bytes.get_ref()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
    }
}
