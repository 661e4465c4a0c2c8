use anyhow::{Context, Result};
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::NdArray;
use clap::Parser;
use std::path::PathBuf;

use emotion_net::dataset::ImagePreprocessor;
use emotion_net::training::checkpoint::load_checkpoint;
use emotion_net::training::metrics::{argmax, predict_probabilities};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to input image
    #[arg(short, long)]
    image: PathBuf,

    /// Checkpoint stem (`<stem>.bin` + `<stem>.json`)
    #[arg(short, long, default_value = "runs/emotion/checkpoints/best_model")]
    checkpoint: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    println!("Emotion Inference (CPU)");
    println!("Image: {}", args.image.display());
    println!("Checkpoint: {}", args.checkpoint.display());
    println!();

    let device = NdArrayDevice::default();
    let (model, metadata) = load_checkpoint::<NdArray>(&args.checkpoint, &device)
        .with_context(|| format!("loading checkpoint {}", args.checkpoint.display()))?;

    let preprocessor = ImagePreprocessor::new(metadata.model.image_size as u32);
    let image = preprocessor.preprocess_image(&args.image, "input")?;

    let probabilities = predict_probabilities(&model, std::slice::from_ref(&image), 1, &device)?
        .into_iter()
        .next()
        .context("model returned no prediction")?;

    let predicted = argmax(&probabilities);
    for (i, p) in probabilities.iter().enumerate() {
        let marker = if i == predicted { "*" } else { " " };
        println!(
            "{marker} {:<10} {:6.2}%",
            metadata.classes.decode(i).unwrap_or("?"),
            p * 100.0
        );
    }
    println!(
        "\nPrediction: {}",
        metadata.classes.decode(predicted).unwrap_or("?")
    );

    Ok(())
}
