//! Dataset handling: species catalog, directory loader, augmentation,
//! and batching for the Burn training loops.

pub mod augmentation;
pub mod batcher;
pub mod catalog;
pub mod loader;

use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};

pub use augmentation::{AugmentationConfig, Augmenter};
pub use batcher::{EpochPlan, SpeciesBatch, SpeciesBatcher};
pub use catalog::SpeciesCatalog;
pub use loader::{DatasetStats, ImageSample, SpeciesDataset, SpeciesItem};

/// File extensions accepted as dataset images
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Interpolation filter used whenever an image is resized to model
/// resolution. Training and serving must resize identically, otherwise
/// served predictions drift from the validated ones.
pub const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Resize a decoded image to a square model input.
pub fn resize_to_input(image: &DynamicImage, size: usize) -> RgbImage {
    image
        .resize_exact(size as u32, size as u32, RESIZE_FILTER)
        .to_rgb8()
}

/// Check whether a path has an accepted image extension
pub fn is_image_file(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_to_input_dimensions() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, image::Rgb([10, 20, 30])));
        let out = resize_to_input(&img, 16);
        assert_eq!(out.dimensions(), (16, 16));
    }

    #[test]
    fn test_training_and_serving_resize_agree() {
        // A gradient image makes any interpolation mismatch visible in the
        // downsampled pixels, unlike a flat fill.
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("spider.png");
        let img = RgbImage::from_fn(64, 64, |x, y| image::Rgb([(x * 4) as u8, (y * 4) as u8, 128]));
        img.save(&path).unwrap();

        // Training/evaluation path: decode through the dataset loader.
        let item = SpeciesItem::from_path(&path, 0, 16).unwrap();

        // Serving path: decode then resize the way the predictor does.
        let decoded = image::open(&path).unwrap();
        let served = SpeciesItem::from_rgb(&resize_to_input(&decoded, 16), 0, String::new());

        assert_eq!(item.image, served.image);
    }
}
