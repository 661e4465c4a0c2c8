use anyhow::{Context, Result};
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use clap::Parser;
use std::path::PathBuf;

use emotion_net::dataset::{DatasetSplit, EmotionDataset};
use emotion_net::error::EmotionError;
use emotion_net::model::{ModelConfig, ModelSummary};
use emotion_net::report::{self, Curve, Evaluator};
use emotion_net::training::{ExperimentConfig, Trainer};

type BackendType = NdArray;
type TrainBackend = Autodiff<BackendType>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Experiment configuration; written with defaults if missing
    #[arg(short, long, default_value = "configs/experiment.yaml")]
    config: PathBuf,

    /// Root folder with one subfolder per emotion
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Where charts, history and reports are written
    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,
}

fn load_config(args: &Args) -> Result<ExperimentConfig> {
    let mut config = if args.config.exists() {
        ExperimentConfig::from_yaml(&args.config)
            .with_context(|| format!("reading {}", args.config.display()))?
    } else {
        let config = ExperimentConfig::default();
        config
            .save(&args.config)
            .with_context(|| format!("writing default config to {}", args.config.display()))?;
        log::info!("Wrote default configuration to {}", args.config.display());
        config
    };

    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(dir) = &args.output_dir {
        // Keep a checkpoint that lived under the old output folder inside the new one.
        if let Ok(relative) = config.checkpoint_path.strip_prefix(&config.output_dir) {
            config.checkpoint_path = dir.join(relative);
        }
        config.output_dir = dir.clone();
    }
    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    println!("Emotion Classifier Training (Burn MBConv + SE)");
    println!("==============================================\n");

    let config = load_config(&args)?;
    std::fs::create_dir_all(&config.output_dir)?;

    // Dataset
    println!("Loading dataset from {}...", config.data_dir.display());
    let dataset = EmotionDataset::load_from_folder(&config.data_dir, config.image_size as u32)
        .with_context(|| format!("loading dataset from {}", config.data_dir.display()))?;

    if let Some(expected) = config.num_classes {
        if expected != dataset.num_classes() {
            return Err(EmotionError::Configuration(format!(
                "expected {} classes, found {} in {}",
                expected,
                dataset.num_classes(),
                config.data_dir.display()
            ))
            .into());
        }
    }

    println!("Loaded {} images in {} classes:", dataset.len(), dataset.num_classes());
    for (name, count) in dataset.class_counts() {
        println!("  {name:<10} {count}");
    }
    let path = config.output_path("class_distribution.png");
    report::render_or_warn(
        "class distribution",
        &path,
        report::plot_class_distribution(dataset.class_counts(), &path),
    );

    let split = DatasetSplit::new(
        dataset,
        config.train_split,
        config.test_split_of_holdout,
        config.seed,
    )?;
    println!(
        "Split: train {}, valid {}, test {}\n",
        split.train.len(),
        split.valid.len(),
        split.test.len()
    );

    // Model
    let device = NdArrayDevice::default();
    let model_config = ModelConfig::from_experiment(&config, split.mapping.len());
    let plan = model_config.plan()?;
    let mut trainer = Trainer::<TrainBackend>::new(config.clone(), model_config, device.clone())?;

    let summary = ModelSummary::new(&trainer.model, &plan);
    println!("{summary}");
    let path = config.output_path("model_summary.txt");
    report::render_or_warn("model summary", &path, summary.save(&path));
    let path = config.output_path("model.png");
    report::render_or_warn("architecture diagram", &path, report::plot_architecture(&plan, &path));

    // Training
    let history = trainer.fit(&split)?;
    history.save(&config.output_path("history.json"))?;
    if let Some(best) = history.best() {
        println!(
            "\nBest epoch {}: val_accuracy {:.4}, val_loss {:.4}",
            best.epoch, best.val_accuracy, best.val_loss
        );
    }

    for (curve, file) in [(Curve::Accuracy, "accuracy.png"), (Curve::Loss, "loss.png")] {
        let path = config.output_path(file);
        report::render_or_warn(
            curve.label(),
            &path,
            report::plot_training_curve(&history, curve, &path),
        );
    }

    // Evaluation
    println!("\nEvaluating best checkpoint on the test set...");
    let evaluator = Evaluator::<BackendType>::from_checkpoint(&config.checkpoint_path, device)
        .with_context(|| format!("restoring {}", config.checkpoint_path.display()))?;
    let evaluation = evaluator.evaluate(&split.test, config.batch_size)?;
    let result = &evaluation.report;

    println!(
        "Test Loss: {:.4} | Test Accuracy: {:.2}%",
        result.test_loss,
        result.test_accuracy * 100.0
    );
    println!("\nConfusion matrix (rows: true, columns: predicted)\n{}", result.confusion_matrix);
    let matrix = &result.confusion_matrix;
    for (name, recall) in matrix.class_names().iter().zip(matrix.recall()) {
        match recall {
            Some(recall) => log::info!("Recall {name}: {:.2}%", recall * 100.0),
            None => log::info!("Recall {name}: no test samples"),
        }
    }
    result.save(&config.output_path("evaluation.json"))?;

    let path = config.output_path("confusion_matrix.png");
    report::render_or_warn(
        "confusion matrix",
        &path,
        report::plot_confusion_matrix(&result.confusion_matrix, &path),
    );

    let samples = evaluation.samples(&split.test, config.num_samples, config.seed);
    let path = config.output_path("sample_predictions.png");
    report::render_or_warn(
        "sample predictions",
        &path,
        report::plot_sample_predictions(&samples, split.mapping.names(), &path),
    );

    println!("\nOutputs saved in: {}", config.output_dir.display());
    Ok(())
}
