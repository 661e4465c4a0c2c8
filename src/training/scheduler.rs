//! Plateau-driven learning-rate decay.

/// Multiplies the learning rate by `factor` when the monitored metric
/// (higher is better) has not improved by more than `min_delta` for
/// `patience` epochs. The rate never goes below `min_lr`.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    lr: f64,
    factor: f64,
    patience: usize,
    min_lr: f64,
    min_delta: f32,
    best: f32,
    wait: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(initial_lr: f64, factor: f64, patience: usize, min_lr: f64, min_delta: f32) -> Self {
        Self {
            lr: initial_lr.max(min_lr),
            factor,
            patience,
            min_lr,
            min_delta,
            best: f32::NEG_INFINITY,
            wait: 0,
        }
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    /// Feed the metric of `epoch`; returns the learning rate for the next epoch.
    pub fn step(&mut self, epoch: usize, metric: f32) -> f64 {
        if metric.is_finite() && metric > self.best + self.min_delta {
            self.best = metric;
            self.wait = 0;
            return self.lr;
        }

        self.wait += 1;
        if self.wait >= self.patience && self.lr > self.min_lr {
            let new_lr = (self.lr * self.factor).max(self.min_lr);
            log::info!(
                "Epoch {}: reducing learning rate {:.3e} -> {:.3e}",
                epoch,
                self.lr,
                new_lr
            );
            self.lr = new_lr;
            self.wait = 0;
        }
        self.lr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halves_after_patience() {
        let mut scheduler = ReduceLrOnPlateau::new(1e-3, 0.5, 5, 1e-6, 1e-4);
        let mut lrs = Vec::new();
        for epoch in 1..=11 {
            lrs.push(scheduler.step(epoch, 0.5));
        }

        // Epoch 1 sets the best; epochs 2..=6 are the first plateau window.
        assert_eq!(&lrs[..5], &[1e-3; 5]);
        assert_eq!(lrs[5], 5e-4);
        assert_eq!(&lrs[6..10], &[5e-4; 4]);
        assert_eq!(lrs[10], 2.5e-4);
    }

    #[test]
    fn test_improvement_resets_wait() {
        let mut scheduler = ReduceLrOnPlateau::new(1e-3, 0.5, 3, 1e-6, 1e-4);
        scheduler.step(1, 0.5);
        scheduler.step(2, 0.5);
        scheduler.step(3, 0.5);
        scheduler.step(4, 0.6);
        scheduler.step(5, 0.6);
        assert_eq!(scheduler.step(6, 0.6), 1e-3);
        assert_eq!(scheduler.step(7, 0.6), 5e-4);
    }

    #[test]
    fn test_tiny_gain_below_min_delta_is_plateau() {
        let mut scheduler = ReduceLrOnPlateau::new(1e-3, 0.5, 2, 1e-6, 1e-4);
        scheduler.step(1, 0.5);
        scheduler.step(2, 0.50005);
        assert_eq!(scheduler.step(3, 0.50008), 5e-4);
    }

    #[test]
    fn test_never_below_floor() {
        let mut scheduler = ReduceLrOnPlateau::new(1e-5, 0.5, 1, 1e-6, 1e-4);
        let mut last = scheduler.lr();
        scheduler.step(1, 0.9);
        for epoch in 2..40 {
            let lr = scheduler.step(epoch, 0.1);
            assert!(lr >= 1e-6);
            assert!(lr <= last);
            last = lr;
        }
        assert_eq!(last, 1e-6);
    }
}
