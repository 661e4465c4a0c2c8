//! Seeded train/validation/test partitioning.

use image::RgbImage;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::{ClassMapping, EmotionDataset};
use crate::error::{EmotionError, Result};

/// One partition of the dataset. `indices` are positions in the loaded dataset.
#[derive(Debug, Clone)]
pub struct Partition {
    pub images: Vec<RgbImage>,
    pub labels: Vec<usize>,
    pub indices: Vec<usize>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    fn take(images: &mut [Option<RgbImage>], labels: &[usize], indices: &[usize]) -> Self {
        let mut part = Self {
            images: Vec::with_capacity(indices.len()),
            labels: Vec::with_capacity(indices.len()),
            indices: indices.to_vec(),
        };
        for &i in indices {
            if let Some(img) = images[i].take() {
                part.images.push(img);
                part.labels.push(labels[i]);
            }
        }
        part
    }
}

#[derive(Debug, Clone)]
pub struct DatasetSplit {
    pub train: Partition,
    pub valid: Partition,
    pub test: Partition,
    pub mapping: ClassMapping,
}

/// Sizes of (train, valid, test) for `total` samples.
///
/// The held-out share is rounded up: `holdout = ceil(total * (1 - train_split))`,
/// then `test = ceil(holdout * test_split_of_holdout)` and valid gets the rest.
pub fn split_sizes(total: usize, train_split: f64, test_split_of_holdout: f64) -> (usize, usize, usize) {
    let holdout = ceil_fraction(total, 1.0 - train_split);
    let test = ceil_fraction(holdout, test_split_of_holdout);
    (total - holdout, holdout - test, test)
}

fn ceil_fraction(n: usize, fraction: f64) -> usize {
    // Rounded first so 60 * 0.3 = 18.000000000000004 does not become 19.
    let raw = (n as f64 * fraction * 1e9).round() / 1e9;
    (raw.ceil() as usize).min(n)
}

impl DatasetSplit {
    pub fn new(
        dataset: EmotionDataset,
        train_split: f64,
        test_split_of_holdout: f64,
        seed: u64,
    ) -> Result<Self> {
        let total = dataset.len();
        let (n_train, n_valid, n_test) = split_sizes(total, train_split, test_split_of_holdout);
        if n_train == 0 || n_valid == 0 || n_test == 0 {
            return Err(EmotionError::Configuration(format!(
                "{total} samples are too few for a train/valid/test split ({n_train}/{n_valid}/{n_test})"
            )));
        }

        let mut order: Vec<usize> = (0..total).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        order.shuffle(&mut rng);

        let (images, labels, mapping) = dataset.into_parts();
        let mut images: Vec<Option<RgbImage>> = images.into_iter().map(Some).collect();

        let train = Partition::take(&mut images, &labels, &order[..n_train]);
        let valid = Partition::take(&mut images, &labels, &order[n_train..n_train + n_valid]);
        let test = Partition::take(&mut images, &labels, &order[n_train + n_valid..]);

        log::info!(
            "Dataset split: train {} ({:.1}%), valid {} ({:.1}%), test {} ({:.1}%)",
            train.len(),
            100.0 * train.len() as f32 / total as f32,
            valid.len(),
            100.0 * valid.len() as f32 / total as f32,
            test.len(),
            100.0 * test.len() as f32 / total as f32,
        );

        Ok(Self {
            train,
            valid,
            test,
            mapping,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::collections::HashSet;

    fn synthetic(total: usize) -> EmotionDataset {
        let images = (0..total)
            .map(|i| RgbImage::from_pixel(4, 4, Rgb([i as u8, 0, 0])))
            .collect();
        let labels = (0..total).map(|i| i % 2).collect();
        EmotionDataset::new(images, labels, ClassMapping::fit(["Happy", "Sad"])).unwrap()
    }

    #[test]
    fn test_split_sizes_sixty() {
        assert_eq!(split_sizes(60, 0.7, 0.5), (42, 9, 9));
    }

    #[test]
    fn test_split_sizes_round_holdout_up() {
        assert_eq!(split_sizes(10, 0.7, 0.5), (7, 1, 2));
        assert_eq!(split_sizes(11, 0.7, 0.5), (7, 2, 2));
        assert_eq!(split_sizes(101, 0.7, 0.5), (70, 15, 16));
    }

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        let split = DatasetSplit::new(synthetic(61), 0.7, 0.5, 3).unwrap();
        let total = split.train.len() + split.valid.len() + split.test.len();
        assert_eq!(total, 61);

        let train: HashSet<_> = split.train.indices.iter().copied().collect();
        let valid: HashSet<_> = split.valid.indices.iter().copied().collect();
        let test: HashSet<_> = split.test.indices.iter().copied().collect();
        assert!(train.is_disjoint(&valid));
        assert!(train.is_disjoint(&test));
        assert!(valid.is_disjoint(&test));
        assert_eq!(train.len() + valid.len() + test.len(), 61);

        for part in [&split.train, &split.valid, &split.test] {
            assert_eq!(part.images.len(), part.labels.len());
            for (img, (&idx, &label)) in part.images.iter().zip(part.indices.iter().zip(&part.labels)) {
                assert_eq!(img.get_pixel(0, 0)[0] as usize, idx);
                assert_eq!(label, idx % 2);
            }
        }
    }

    #[test]
    fn test_split_is_reproducible() {
        let a = DatasetSplit::new(synthetic(30), 0.7, 0.5, 3).unwrap();
        let b = DatasetSplit::new(synthetic(30), 0.7, 0.5, 3).unwrap();
        assert_eq!(a.train.indices, b.train.indices);
        assert_eq!(a.test.indices, b.test.indices);
    }

    #[test]
    fn test_too_small_dataset_rejected() {
        assert!(DatasetSplit::new(synthetic(2), 0.7, 0.5, 3).is_err());
    }
}
