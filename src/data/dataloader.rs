use burn::prelude::*;
use image::RgbImage;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::data::transforms::DataAugmentation;
use crate::dataset::{image_to_tensor, Partition};
use crate::error::{EmotionError, Result};

pub struct ClassificationBatch<B: Backend> {
    /// `[batch, 3, height, width]`, values in `[0, 1]`.
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
    pub batch_size: usize,
}

impl<B: Backend> ClassificationBatch<B> {
    pub fn from_images(images: &[RgbImage], labels: &[usize], device: &B::Device) -> Self {
        let batch_size = images.len();
        let (w, h) = images
            .first()
            .map(|img| img.dimensions())
            .unwrap_or((0, 0));

        let mut images_vec = Vec::with_capacity(batch_size * 3 * (w * h) as usize);
        for img in images {
            images_vec.extend(image_to_tensor(img));
        }
        let targets: Vec<i64> = labels.iter().map(|&l| l as i64).collect();

        Self {
            images: Tensor::<B, 4>::from_data(
                TensorData::new(images_vec, [batch_size, 3, h as usize, w as usize]),
                device,
            ),
            targets: Tensor::<B, 1, Int>::from_data(TensorData::new(targets, [batch_size]), device),
            batch_size,
        }
    }
}

/// Number of augmented batches drawn per epoch.
pub fn steps_per_epoch(train_size: usize, batch_size: usize) -> Result<usize> {
    if batch_size == 0 || batch_size > train_size {
        return Err(EmotionError::Configuration(format!(
            "batch size {batch_size} does not fit a training partition of {train_size} samples"
        )));
    }
    Ok(train_size / batch_size)
}

/// Endless stream of augmented `(images, labels)` batches over a partition.
///
/// Walks a shuffled permutation in `batch_size` chunks (the last chunk of a
/// pass may be shorter), reshuffling at the start of every pass. Nothing is
/// materialised ahead of time.
pub struct AugmentedBatches<'a> {
    partition: &'a Partition,
    batch_size: usize,
    augmentation: DataAugmentation,
    rng: ChaCha8Rng,
    indices: Vec<usize>,
    current_idx: usize,
}

impl<'a> AugmentedBatches<'a> {
    pub fn new(
        partition: &'a Partition,
        batch_size: usize,
        augmentation: DataAugmentation,
        seed: u64,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut indices: Vec<usize> = (0..partition.len()).collect();
        indices.shuffle(&mut rng);

        Self {
            partition,
            batch_size: batch_size.max(1),
            augmentation,
            rng,
            indices,
            current_idx: 0,
        }
    }

    fn reset(&mut self) {
        self.current_idx = 0;
        self.indices.shuffle(&mut self.rng);
    }
}

impl Iterator for AugmentedBatches<'_> {
    type Item = (Vec<RgbImage>, Vec<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.partition.is_empty() {
            return None;
        }
        if self.current_idx >= self.indices.len() {
            self.reset();
        }

        let end_idx = (self.current_idx + self.batch_size).min(self.indices.len());
        let mut images = Vec::with_capacity(end_idx - self.current_idx);
        let mut labels = Vec::with_capacity(end_idx - self.current_idx);

        for &idx in &self.indices[self.current_idx..end_idx] {
            images.push(
                self.augmentation
                    .apply(&self.partition.images[idx], &mut self.rng),
            );
            labels.push(self.partition.labels[idx]);
        }

        self.current_idx = end_idx;
        Some((images, labels))
    }
}
