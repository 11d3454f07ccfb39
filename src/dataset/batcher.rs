//! Batching
//!
//! Turns decoded items into Burn tensors, applying the normalization that
//! matches the model variant, and plans index order for full passes over a
//! dataset (shuffled for training, fixed order for evaluation).

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use burn::tensor::TensorData;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::model::config::Normalization;

/// A batch of images for training or evaluation
#[derive(Clone, Debug)]
pub struct SpeciesBatch<B: Backend> {
    /// Images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher that assembles CHW items into normalized tensors
#[derive(Clone, Debug)]
pub struct SpeciesBatcher {
    image_size: usize,
    normalization: Normalization,
}

impl SpeciesBatcher {
    pub fn new(image_size: usize, normalization: Normalization) -> Self {
        Self {
            image_size,
            normalization,
        }
    }

    pub fn normalization(&self) -> Normalization {
        self.normalization
    }
}

impl<B: Backend> Batcher<B, super::SpeciesItem, SpeciesBatch<B>> for SpeciesBatcher {
    fn batch(&self, items: Vec<super::SpeciesItem>, device: &B::Device) -> SpeciesBatch<B> {
        let batch_size = items.len();
        let side = self.image_size;

        let mut images_data = Vec::with_capacity(batch_size * 3 * side * side);
        let mut targets_data = Vec::with_capacity(batch_size);
        for item in &items {
            images_data.extend(item.image.iter().map(|&v| self.normalization.apply(v)));
            targets_data.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(images_data, [batch_size, 3, side, side]),
            device,
        );
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        SpeciesBatch { images, targets }
    }
}

/// Index plan for one full pass over a dataset.
///
/// `ordered` is a fixed bijection from batch position to sample index;
/// evaluation report rows are aligned by it. `shuffled` reorders every
/// epoch from the caller's seeded RNG.
#[derive(Debug, Clone)]
pub struct EpochPlan {
    indices: Vec<usize>,
    batch_size: usize,
}

impl EpochPlan {
    /// Sequential order: sample `i` is the i-th item of the pass.
    pub fn ordered(len: usize, batch_size: usize) -> Self {
        Self {
            indices: (0..len).collect(),
            batch_size: batch_size.max(1),
        }
    }

    /// Random order for a training epoch.
    pub fn shuffled(len: usize, batch_size: usize, rng: &mut impl Rng) -> Self {
        let mut indices: Vec<usize> = (0..len).collect();
        indices.shuffle(rng);
        Self {
            indices,
            batch_size: batch_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        (self.indices.len() + self.batch_size - 1) / self.batch_size
    }

    /// Sample indices of the n-th batch; empty past the last batch
    pub fn batch_indices(&self, batch: usize) -> &[usize] {
        let start = (batch * self.batch_size).min(self.indices.len());
        let end = (start + self.batch_size).min(self.indices.len());
        &self.indices[start..end]
    }

    /// Iterate over all batches in plan order
    pub fn batches(&self) -> impl Iterator<Item = &[usize]> {
        (0..self.num_batches()).map(move |b| self.batch_indices(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;
    use crate::dataset::SpeciesItem;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    fn item(label: usize, value: f32, side: usize) -> SpeciesItem {
        SpeciesItem {
            image: vec![value; 3 * side * side],
            label,
            path: format!("img_{}.jpg", label),
        }
    }

    #[test]
    fn test_ordered_plan_covers_exactly_once() {
        // 3 classes x 10 images at batch size 5 -> exactly 6 batches
        let plan = EpochPlan::ordered(30, 5);
        assert_eq!(plan.num_batches(), 6);

        let seen: Vec<usize> = plan.batches().flatten().copied().collect();
        assert_eq!(seen, (0..30).collect::<Vec<_>>());
    }

    #[test]
    fn test_ordered_plan_is_stable() {
        let a = EpochPlan::ordered(17, 4);
        let b = EpochPlan::ordered(17, 4);
        let idx_a: Vec<_> = a.batches().flatten().copied().collect();
        let idx_b: Vec<_> = b.batches().flatten().copied().collect();
        assert_eq!(idx_a, idx_b);
    }

    #[test]
    fn test_shuffled_plan_is_a_permutation() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let plan = EpochPlan::shuffled(30, 5, &mut rng);
        assert_eq!(plan.num_batches(), 6);

        let seen: HashSet<usize> = plan.batches().flatten().copied().collect();
        assert_eq!(seen.len(), 30);
        assert!(seen.contains(&0) && seen.contains(&29));
    }

    #[test]
    fn test_uneven_tail_batch() {
        let plan = EpochPlan::ordered(7, 3);
        assert_eq!(plan.num_batches(), 3);
        assert_eq!(plan.batch_indices(2), &[6]);
    }

    #[test]
    fn test_batch_past_the_end_is_empty() {
        let plan = EpochPlan::ordered(7, 3);
        assert_eq!(plan.batch_indices(3), &[] as &[usize]);
        assert_eq!(plan.batch_indices(100), &[] as &[usize]);

        let empty = EpochPlan::ordered(0, 3);
        assert_eq!(empty.batch_indices(0), &[] as &[usize]);
    }

    #[test]
    fn test_batch_shapes_and_rescale() {
        let batcher = SpeciesBatcher::new(4, Normalization::Rescale);
        let items = vec![item(0, 255.0, 4), item(2, 0.0, 4)];
        let device = Default::default();

        let batch: SpeciesBatch<DefaultBackend> = batcher.batch(items, &device);
        assert_eq!(batch.images.dims(), [2, 3, 4, 4]);
        assert_eq!(batch.targets.dims(), [2]);

        let data: Vec<f32> = batch.images.into_data().to_vec().unwrap();
        assert!((data[0] - 1.0).abs() < 1e-6);
        assert!((data[3 * 16] - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_signed_normalization() {
        let batcher = SpeciesBatcher::new(2, Normalization::Signed);
        let items = vec![item(1, 255.0, 2)];
        let device = Default::default();

        let batch: SpeciesBatch<DefaultBackend> = batcher.batch(items, &device);
        let data: Vec<f32> = batch.images.into_data().to_vec().unwrap();
        assert!((data[0] - 1.0).abs() < 1e-5);
    }
}
