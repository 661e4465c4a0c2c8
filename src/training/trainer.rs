use burn::module::AutodiffModule;
use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;

use crate::data::{steps_per_epoch, AugmentedBatches, ClassificationBatch, DataAugmentation};
use crate::dataset::DatasetSplit;
use crate::error::{EmotionError, Result};
use crate::model::{EmotionNet, ModelConfig};
use crate::training::checkpoint::{CheckpointMetadata, ModelCheckpoint};
use crate::training::early_stopping::{BestWeights, EarlyStopping};
use crate::training::history::{EpochRecord, TrainingHistory};
use crate::training::metrics::{evaluate_partition, PartitionMetrics};
use crate::training::scheduler::ReduceLrOnPlateau;
use crate::training::ExperimentConfig;

pub struct Trainer<B: AutodiffBackend> {
    pub model: EmotionNet<B>,
    model_config: ModelConfig,
    config: ExperimentConfig,
    device: B::Device,
    loss_fn: CrossEntropyLoss<B>,
    optimizer: OptimizerAdaptor<burn::optim::Adam, EmotionNet<B>, B>,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: ExperimentConfig, model_config: ModelConfig, device: B::Device) -> Result<Self> {
        let model = EmotionNet::new(&device, &model_config)?;
        let loss_fn = CrossEntropyLossConfig::new().init(&device);
        let optimizer = AdamConfig::new()
            .with_beta_1(0.9)
            .with_beta_2(0.999)
            .with_epsilon(1e-7)
            .init();

        Ok(Self {
            model,
            model_config,
            config,
            device,
            loss_fn,
            optimizer,
        })
    }

    /// Train on the augmented stream over `split.train`, validating on
    /// `split.valid` after every epoch.
    ///
    /// Per epoch, validation accuracy drives checkpointing, then early
    /// stopping, then learning-rate decay. When early stopping fires the
    /// model is rolled back to its best epoch.
    pub fn fit(&mut self, split: &DatasetSplit) -> Result<TrainingHistory> {
        if split.mapping.len() != self.model_config.num_classes {
            return Err(EmotionError::Configuration(format!(
                "model has {} outputs but the dataset has {} classes",
                self.model_config.num_classes,
                split.mapping.len()
            )));
        }

        let batch_size = self.config.batch_size;
        let steps = steps_per_epoch(split.train.len(), batch_size)?;
        let mut batches = AugmentedBatches::new(
            &split.train,
            batch_size,
            DataAugmentation::new(self.config.augmentation.clone()),
            self.config.seed,
        );

        let mut checkpoint = ModelCheckpoint::new(self.config.checkpoint_path.clone());
        let mut early_stopping = EarlyStopping::new(self.config.early_stopping_patience, 0.0);
        let mut best_weights: BestWeights<B, EmotionNet<B>> = BestWeights::new();
        let mut scheduler = ReduceLrOnPlateau::new(
            self.config.learning_rate,
            self.config.lr_factor,
            self.config.lr_patience,
            self.config.min_lr,
            self.config.lr_min_delta,
        );
        let mut history = TrainingHistory::new();

        log::info!(
            "Training on {} samples, validating on {} ({} steps of {} per epoch)",
            split.train.len(),
            split.valid.len(),
            steps,
            batch_size
        );

        let pb = ProgressBar::new(self.config.epochs as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        for epoch in 1..=self.config.epochs {
            let epoch_start = Instant::now();
            let lr = scheduler.lr();

            let train = self.train_epoch(&mut batches, steps, lr)?;
            let (val, _) =
                evaluate_partition(&self.model.valid(), &split.valid, batch_size, &self.device)?;

            let record = EpochRecord {
                epoch,
                train_loss: train.loss,
                train_accuracy: train.accuracy,
                val_loss: val.loss,
                val_accuracy: val.accuracy,
                learning_rate: lr,
            };
            history.push(record);

            pb.println(format!(
                "Epoch {}/{} - {:.1}s - loss: {:.4} - accuracy: {:.4} - val_loss: {:.4} - val_accuracy: {:.4} - lr: {:.2e}",
                epoch,
                self.config.epochs,
                epoch_start.elapsed().as_secs_f32(),
                train.loss,
                train.accuracy,
                val.loss,
                val.accuracy,
                lr
            ));
            pb.set_message(format!("val_acc={:.4}", val.accuracy));
            pb.inc(1);

            if !record.is_finite() {
                log::warn!("Epoch {}: non-finite metrics, counted as no improvement", epoch);
            }

            let metadata = CheckpointMetadata {
                model: self.model_config.clone(),
                classes: split.mapping.clone(),
                epoch,
                val_accuracy: val.accuracy,
            };
            checkpoint.save_if_best(&self.model, &metadata, val.accuracy)?;

            let previous_best = early_stopping.best_epoch;
            let stop = early_stopping.should_stop(epoch, val.accuracy);
            if early_stopping.best_epoch != previous_best {
                best_weights.update(epoch, &self.model);
            }
            if stop {
                history.stopped_early = true;
                break;
            }

            scheduler.step(epoch, val.accuracy);
        }

        history.best_epoch = best_weights.epoch();
        if history.stopped_early {
            if let Some(best_epoch) = history.best_epoch {
                log::info!("Restoring model weights from epoch {}", best_epoch);
            }
            self.model = best_weights.restore(self.model.clone());
        }

        pb.finish_with_message("Training completed!");
        Ok(history)
    }

    /// Run `steps` optimizer updates; returns loss and accuracy averaged over samples.
    fn train_epoch(
        &mut self,
        batches: &mut AugmentedBatches<'_>,
        steps: usize,
        lr: f64,
    ) -> Result<PartitionMetrics> {
        let mut running = RunningMetrics::default();

        for (images, labels) in batches.by_ref().take(steps) {
            let batch = ClassificationBatch::<B>::from_images(&images, &labels, &self.device);

            let logits = self.model.forward(batch.images);
            let loss = self.loss_fn.forward(logits.clone(), batch.targets.clone());

            let loss_value = loss.clone().into_scalar().elem::<f32>();
            let correct = logits
                .argmax(1)
                .reshape([batch.batch_size])
                .equal(batch.targets)
                .int()
                .sum()
                .into_scalar()
                .elem::<i64>();

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = self.optimizer.step(lr, self.model.clone(), grads);

            running.add(loss_value, correct as usize, batch.batch_size);
        }

        running.finish()
    }
}

/// Sample-weighted loss and accuracy over batches of uneven size.
#[derive(Debug, Default)]
struct RunningMetrics {
    loss_sum: f32,
    correct: usize,
    samples: usize,
}

impl RunningMetrics {
    /// `loss` is the batch mean, so it is weighted by `batch_size`.
    fn add(&mut self, loss: f32, correct: usize, batch_size: usize) {
        self.loss_sum += loss * batch_size as f32;
        self.correct += correct;
        self.samples += batch_size;
    }

    fn finish(self) -> Result<PartitionMetrics> {
        if self.samples == 0 {
            return Err(EmotionError::Configuration(
                "training stream produced no batches".to_string(),
            ));
        }
        Ok(PartitionMetrics {
            loss: self.loss_sum / self.samples as f32,
            accuracy: self.correct as f32 / self.samples as f32,
        })
    }
}
