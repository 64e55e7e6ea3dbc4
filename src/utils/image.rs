//! Image utility functions

use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage};

/// Save an annotated frame, picking the encoder from the file extension
pub fn save_frame(frame: &RgbImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    DynamicImage::ImageRgb8(frame.clone())
        .save(path)
        .with_context(|| format!("Failed to save frame to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_frame_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("frame.png");
        save_frame(&RgbImage::new(8, 6), &path).unwrap();
        let reloaded = image::open(&path).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (8, 6));
    }
}
