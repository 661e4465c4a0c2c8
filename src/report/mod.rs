pub mod charts;
pub mod confusion;
pub mod evaluator;

pub use charts::{
    plot_architecture, plot_class_distribution, plot_confusion_matrix, plot_sample_predictions,
    plot_training_curve, Curve,
};
pub use confusion::ConfusionMatrix;
pub use evaluator::{Evaluation, EvaluationReport, Evaluator, SamplePrediction};

use crate::error::Result;
use std::path::Path;

/// Charts and summaries are not critical: log a failure and carry on.
pub fn render_or_warn(what: &str, path: &Path, result: Result<()>) -> bool {
    match result {
        Ok(()) => {
            log::info!("Saved {} to {}", what, path.display());
            true
        }
        Err(e) => {
            log::warn!("Could not write {} to {}: {}", what, path.display(), e);
            false
        }
    }
}
