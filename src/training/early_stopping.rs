use burn::module::Module;
use burn::tensor::backend::Backend;
use std::marker::PhantomData;

/// Stops training when the monitored metric (higher is better) stalls.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f32,
    pub best: f32,
    pub best_epoch: Option<usize>,
    wait: usize,
    pub stopped: bool,
}

impl EarlyStopping {
    pub fn new(patience: usize, min_delta: f32) -> Self {
        Self {
            patience,
            min_delta,
            best: f32::NEG_INFINITY,
            best_epoch: None,
            wait: 0,
            stopped: false,
        }
    }

    /// Record the metric for `epoch`; returns `true` once patience runs out.
    ///
    /// Non-finite values never count as an improvement.
    pub fn should_stop(&mut self, epoch: usize, metric: f32) -> bool {
        if self.stopped {
            return true;
        }

        if metric.is_finite() && metric - self.min_delta > self.best {
            self.best = metric;
            self.best_epoch = Some(epoch);
            self.wait = 0;
            return false;
        }

        self.wait += 1;
        if self.wait >= self.patience {
            self.stopped = true;
            log::info!(
                "Early stopping triggered at epoch {}: no improvement for {} epochs",
                epoch,
                self.patience
            );
        }
        self.stopped
    }
}

/// In-memory copy of the weights from the best epoch so far.
///
/// Stored as a record rather than a module clone: batch norm running
/// statistics are shared between clones and would keep drifting with the
/// live model.
pub struct BestWeights<B: Backend, M: Module<B>> {
    best: Option<(usize, <M as Module<B>>::Record)>,
    _backend: PhantomData<B>,
}

impl<B: Backend, M: Module<B>> BestWeights<B, M> {
    pub fn new() -> Self {
        Self {
            best: None,
            _backend: PhantomData,
        }
    }

    pub fn update(&mut self, epoch: usize, model: &M) {
        self.best = Some((epoch, model.clone().into_record()));
    }

    pub fn epoch(&self) -> Option<usize> {
        self.best.as_ref().map(|(epoch, _)| *epoch)
    }

    /// Loads the stored weights into `current`, or returns it unchanged if
    /// nothing was recorded.
    pub fn restore(self, current: M) -> M {
        match self.best {
            Some((_, record)) => current.load_record(record),
            None => current,
        }
    }
}

impl<B: Backend, M: Module<B>> Default for BestWeights<B, M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::AutodiffModule;
    use burn::nn::{BatchNorm, BatchNormConfig};
    use burn::tensor::{Distribution, Tensor};

    type TrainBackend = Autodiff<NdArray>;

    /// Feeds `metrics` to a stopper; returns the stop epoch and best epoch.
    fn run(metrics: &[f32], patience: usize) -> (Option<usize>, Option<usize>) {
        let mut stopper = EarlyStopping::new(patience, 0.0);
        for (i, &m) in metrics.iter().enumerate() {
            if stopper.should_stop(i + 1, m) {
                return (Some(i + 1), stopper.best_epoch);
            }
        }
        (None, stopper.best_epoch)
    }

    #[test]
    fn test_stops_after_patience() {
        // Improves until epoch 4, then plateaus.
        let mut metrics = vec![0.2, 0.3, 0.4, 0.5];
        metrics.extend(std::iter::repeat(0.45).take(20));

        assert_eq!(run(&metrics, 15), (Some(19), Some(4)));
    }

    #[test]
    fn test_equal_metric_is_not_improvement() {
        let mut stopper = EarlyStopping::new(2, 0.0);
        assert!(!stopper.should_stop(1, 0.5));
        assert!(!stopper.should_stop(2, 0.5));
        assert!(stopper.should_stop(3, 0.5));
        assert_eq!(stopper.best_epoch, Some(1));
    }

    #[test]
    fn test_nan_counts_as_no_improvement() {
        let mut stopper = EarlyStopping::new(3, 0.0);
        stopper.should_stop(1, 0.1);
        stopper.should_stop(2, f32::NAN);
        assert_eq!(stopper.best_epoch, Some(1));
        assert!(!stopper.stopped);
    }

    #[test]
    fn test_no_stop_while_improving() {
        let metrics: Vec<f32> = (0..30).map(|i| i as f32 / 100.0).collect();
        assert_eq!(run(&metrics, 15), (None, Some(30)));
    }

    fn inference(bn: &BatchNorm<TrainBackend>, x: &Tensor<TrainBackend, 4>) -> Vec<f32> {
        bn.valid()
            .forward(x.clone().inner())
            .into_data()
            .convert::<f32>()
            .to_vec()
            .unwrap()
    }

    #[test]
    fn test_restore_rolls_back_running_statistics() {
        let device = Default::default();
        let bn: BatchNorm<TrainBackend> = BatchNormConfig::new(3).init(&device);
        let x = Tensor::<TrainBackend, 4>::random([4, 3, 2, 2], Distribution::Normal(2.0, 1.0), &device);

        let mut best = BestWeights::<TrainBackend, BatchNorm<TrainBackend>>::new();
        best.update(1, &bn);
        let snapshot = inference(&bn, &x);

        // Training-mode passes move the running mean and variance.
        for _ in 0..5 {
            let _ = bn.forward(x.clone());
        }
        let drifted = inference(&bn, &x);
        assert!(snapshot.iter().zip(&drifted).any(|(a, b)| (a - b).abs() > 1e-3));

        assert_eq!(best.epoch(), Some(1));
        let restored = best.restore(bn);
        for (a, b) in snapshot.iter().zip(&inference(&restored, &x)) {
            assert!((a - b).abs() < 1e-5, "{a} vs {b}");
        }
    }

    #[test]
    fn test_restore_without_snapshot_keeps_current() {
        let device = Default::default();
        let bn: BatchNorm<TrainBackend> = BatchNormConfig::new(2).init(&device);
        let x = Tensor::<TrainBackend, 4>::ones([1, 2, 1, 1], &device);
        let before = inference(&bn, &x);

        let best = BestWeights::<TrainBackend, BatchNorm<TrainBackend>>::new();
        assert_eq!(best.epoch(), None);
        assert_eq!(inference(&best.restore(bn), &x), before);
    }
}
