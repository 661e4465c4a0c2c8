use image::{imageops::FilterType, ImageReader, RgbImage};
use std::path::Path;

use crate::error::{EmotionError, Result};

#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    target_size: u32,
}

impl ImagePreprocessor {
    pub fn new(target_size: u32) -> Self {
        Self { target_size }
    }

    /// Decode one image and resize it to the square target size.
    ///
    /// Aspect ratio is not preserved; bicubic (Catmull-Rom) filtering is used
    /// for both up- and downscaling.
    pub fn preprocess_image(&self, image_path: &Path, class: &str) -> Result<RgbImage> {
        let to_err = |source| EmotionError::Image {
            path: image_path.to_path_buf(),
            class: class.to_string(),
            source,
        };

        let unreadable = |e: std::io::Error| {
            EmotionError::dataset(image_path, format!("cannot read image of class '{class}': {e}"))
        };

        let img = ImageReader::open(image_path)
            .map_err(unreadable)?
            .with_guessed_format()
            .map_err(unreadable)?
            .decode()
            .map_err(to_err)?;

        Ok(self.resize(&img.to_rgb8()))
    }

    pub fn resize(&self, img: &RgbImage) -> RgbImage {
        if img.dimensions() == (self.target_size, self.target_size) {
            return img.clone();
        }
        image::imageops::resize(
            img,
            self.target_size,
            self.target_size,
            FilterType::CatmullRom,
        )
    }
}

/// Convert an image to channel-first floats in `[0, 1]`.
pub fn image_to_tensor(img: &RgbImage) -> Vec<f32> {
    let (w, h) = img.dimensions();
    let total_pixels = (w * h) as usize;
    let mut tensor = vec![0.0f32; total_pixels * 3];

    for (idx, pixel) in img.pixels().enumerate() {
        tensor[idx] = pixel[0] as f32 / 255.0;
        tensor[total_pixels + idx] = pixel[1] as f32 / 255.0;
        tensor[2 * total_pixels + idx] = pixel[2] as f32 / 255.0;
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_preprocess_resizes_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.png");
        RgbImage::from_pixel(100, 60, Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();

        let preprocessor = ImagePreprocessor::new(48);
        let img = preprocessor.preprocess_image(&path, "Happy").unwrap();
        assert_eq!(img.dimensions(), (48, 48));
        assert_eq!(img.get_pixel(24, 24), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_undecodable_image_reports_class() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();

        let err = ImagePreprocessor::new(48)
            .preprocess_image(&path, "Sad")
            .unwrap_err();
        assert!(err.to_string().contains("Sad"));
    }

    #[test]
    fn test_image_to_tensor_is_channel_first() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 255, 51]));

        let tensor = image_to_tensor(&img);
        assert_eq!(tensor, vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.2]);
    }
}
