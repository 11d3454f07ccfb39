//! Species Dataset Loader
//!
//! Walks a dataset root organized as one directory per species, builds a
//! deterministic sample list (classes sorted, files sorted within each
//! class), and decodes images lazily per batch.

use std::path::{Path, PathBuf};

use burn::data::dataset::Dataset;
use image::{ImageReader, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::augmentation::Augmenter;
use super::catalog::SpeciesCatalog;
use crate::utils::error::{Error, Result};

/// A single image sample with its label and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class id (position in the catalog)
    pub label: usize,
    /// Species name (e.g. "poecilotheria_metallica")
    pub class_name: String,
}

/// A decoded item ready for batching: CHW f32 pixels in [0, 255].
///
/// Normalization is deliberately left to the batcher so the same item feeds
/// both model variants.
#[derive(Clone, Debug)]
pub struct SpeciesItem {
    /// Flattened CHW pixel data [3 * H * W]
    pub image: Vec<f32>,
    /// Class id
    pub label: usize,
    /// Source path (for error reports)
    pub path: String,
}

impl SpeciesItem {
    /// Decode an image file, resize to `image_size` and convert to CHW.
    pub fn from_path(path: &Path, label: usize, image_size: usize) -> Result<Self> {
        let decoded = ImageReader::open(path)
            .map_err(|e| Error::ImageLoad(path.to_path_buf(), e.to_string()))?
            .decode()
            .map_err(|e| Error::ImageLoad(path.to_path_buf(), e.to_string()))?;
        let img = super::resize_to_input(&decoded, image_size);

        Ok(Self::from_rgb(&img, label, path.to_string_lossy().to_string()))
    }

    /// Convert a decoded RGB image to a CHW item.
    pub fn from_rgb(img: &RgbImage, label: usize, path: String) -> Self {
        let (width, height) = (img.width() as usize, img.height() as usize);
        let mut image = vec![0.0f32; 3 * height * width];

        for y in 0..height {
            for x in 0..width {
                let pixel = img.get_pixel(x as u32, y as u32);
                image[y * width + x] = pixel[0] as f32;
                image[height * width + y * width + x] = pixel[1] as f32;
                image[2 * height * width + y * width + x] = pixel[2] as f32;
            }
        }

        Self { image, label, path }
    }
}

/// Species dataset with a deterministic sample order and lazy decoding
#[derive(Debug, Clone)]
pub struct SpeciesDataset {
    /// Root directory of the dataset
    pub root_dir: PathBuf,
    /// All samples, grouped by class in catalog order, files sorted per class
    samples: Vec<ImageSample>,
    /// The label space
    catalog: SpeciesCatalog,
    /// Target square image size
    image_size: usize,
}

impl SpeciesDataset {
    /// Scan a dataset root.
    ///
    /// The directory must be structured as:
    /// ```text
    /// root_dir/
    /// ├── avicularia_avicularia/
    /// │   ├── image1.jpg
    /// │   └── image2.jpg
    /// ├── brachypelma_hamorii/
    /// │   └── ...
    /// └── ...
    /// ```
    pub fn from_dir<P: AsRef<Path>>(root_dir: P, image_size: usize) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Loading species dataset from: {:?}", root_dir);

        let catalog = SpeciesCatalog::from_dir(&root_dir)?;
        let mut samples = Vec::new();

        for class_name in catalog.names() {
            let class_dir = root_dir.join(class_name);
            let label = catalog
                .id(class_name)
                .ok_or_else(|| Error::Dataset(format!("unknown class '{}'", class_name)))?;

            let mut files: Vec<PathBuf> = WalkDir::new(&class_dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.path().to_path_buf())
                .filter(|p| super::is_image_file(p))
                .collect();
            // Sorted file order keeps the sample -> position mapping stable
            // across runs; evaluation alignment depends on it.
            files.sort();

            debug!("Class '{}' (label {}): {} files", class_name, label, files.len());

            samples.extend(files.into_iter().map(|path| ImageSample {
                path,
                label,
                class_name: class_name.clone(),
            }));
        }

        info!("Loaded {} total samples", samples.len());

        Ok(Self {
            root_dir,
            samples,
            catalog,
            image_size,
        })
    }

    /// Build a dataset from an explicit sample list sharing a catalog.
    pub fn from_samples(
        samples: Vec<ImageSample>,
        catalog: SpeciesCatalog,
        image_size: usize,
    ) -> Self {
        Self {
            root_dir: PathBuf::new(),
            samples,
            catalog,
            image_size,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn catalog(&self) -> &SpeciesCatalog {
        &self.catalog
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    pub fn samples(&self) -> &[ImageSample] {
        &self.samples
    }

    pub fn sample(&self, index: usize) -> Option<&ImageSample> {
        self.samples.get(index)
    }

    /// Decode one sample, applying augmentation before the CHW conversion.
    ///
    /// A corrupt file is logged and skipped (`None`), not fatal.
    pub fn item_augmented(
        &self,
        index: usize,
        augmenter: &Augmenter,
        rng: &mut impl rand::Rng,
    ) -> Option<SpeciesItem> {
        let sample = self.samples.get(index)?;
        let decoded = ImageReader::open(&sample.path)
            .and_then(|r| {
                r.decode()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })
            .map(|img| super::resize_to_input(&img, self.image_size));

        match decoded {
            Ok(rgb) => {
                let rgb = augmenter.apply(rgb, rng);
                Some(SpeciesItem::from_rgb(
                    &rgb,
                    sample.label,
                    sample.path.to_string_lossy().to_string(),
                ))
            }
            Err(e) => {
                warn!("Skipping corrupt image {:?}: {}", sample.path, e);
                None
            }
        }
    }

    /// Per-class sample counts and totals
    pub fn stats(&self) -> DatasetStats {
        let mut class_counts = vec![0usize; self.catalog.len()];
        for sample in &self.samples {
            class_counts[sample.label] += 1;
        }

        DatasetStats {
            total_samples: self.samples.len(),
            num_classes: self.catalog.len(),
            class_counts,
            class_names: self.catalog.names().to_vec(),
        }
    }
}

impl Dataset<SpeciesItem> for SpeciesDataset {
    fn get(&self, index: usize) -> Option<SpeciesItem> {
        let sample = self.samples.get(index)?;
        match SpeciesItem::from_path(&sample.path, sample.label, self.image_size) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping corrupt image: {}", e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Statistics about the dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub num_classes: usize,
    pub class_counts: Vec<usize>,
    pub class_names: Vec<String>,
}

impl DatasetStats {
    /// Print statistics to console
    pub fn print(&self) {
        println!("\nDataset statistics:");
        println!("  Total samples: {}", self.total_samples);
        println!("  Number of classes: {}", self.num_classes);
        println!("\n  Samples per class:");

        for (idx, name) in self.class_names.iter().enumerate() {
            let count = self.class_counts[idx];
            let bar_len = if self.total_samples > 0 {
                (count as f32 / self.total_samples as f32 * 40.0) as usize
            } else {
                0
            };
            let bar: String = "█".repeat(bar_len);
            println!("    {:3}. {:40} {:5} {}", idx, name, count, bar);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    pub(crate) fn write_test_image(path: &Path, w: u32, h: u32, fill: [u8; 3]) {
        let img = RgbImage::from_pixel(w, h, image::Rgb(fill));
        img.save(path).unwrap();
    }

    fn make_dataset_dir(classes: &[(&str, usize)]) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        for (name, count) in classes {
            let dir = tmp.path().join(name);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..*count {
                write_test_image(&dir.join(format!("img_{:02}.png", i)), 16, 16, [64, 128, 192]);
            }
        }
        tmp
    }

    #[test]
    fn test_sample_order_deterministic() {
        let tmp = make_dataset_dir(&[("b_species", 3), ("a_species", 2)]);

        let first = SpeciesDataset::from_dir(tmp.path(), 16).unwrap();
        let second = SpeciesDataset::from_dir(tmp.path(), 16).unwrap();

        let paths_a: Vec<_> = first.samples().iter().map(|s| s.path.clone()).collect();
        let paths_b: Vec<_> = second.samples().iter().map(|s| s.path.clone()).collect();
        assert_eq!(paths_a, paths_b);

        // a_species (id 0) comes before b_species (id 1)
        assert_eq!(first.sample(0).unwrap().label, 0);
        assert_eq!(first.sample(4).unwrap().label, 1);
    }

    #[test]
    fn test_item_decoding() {
        let tmp = make_dataset_dir(&[("avicularia", 1)]);
        let dataset = SpeciesDataset::from_dir(tmp.path(), 8).unwrap();

        let item = dataset.get(0).unwrap();
        assert_eq!(item.image.len(), 3 * 8 * 8);
        assert_eq!(item.label, 0);
        // Pixels stay in the raw [0, 255] range
        assert!((item.image[0] - 64.0).abs() < 1.5);
    }

    #[test]
    fn test_corrupt_image_is_skipped() {
        let tmp = make_dataset_dir(&[("theraphosa", 2)]);
        let bad = tmp.path().join("theraphosa").join("img_00.png");
        std::fs::write(&bad, b"not an image").unwrap();

        let dataset = SpeciesDataset::from_dir(tmp.path(), 8).unwrap();
        assert!(dataset.get(0).is_none());
        assert!(dataset.get(1).is_some());
    }

    #[test]
    fn test_stats() {
        let tmp = make_dataset_dir(&[("a", 2), ("b", 3)]);
        let dataset = SpeciesDataset::from_dir(tmp.path(), 8).unwrap();
        let stats = dataset.stats();

        assert_eq!(stats.total_samples, 5);
        assert_eq!(stats.class_counts, vec![2, 3]);
    }
}
