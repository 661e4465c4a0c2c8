//! PNG charts rendered with plotters.

use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;

use super::confusion::ConfusionMatrix;
use super::evaluator::SamplePrediction;
use crate::error::{EmotionError, Result};
use crate::model::NetworkPlan;
use crate::training::TrainingHistory;

const FONT: &str = "sans-serif";

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

fn render_error<E: std::fmt::Display>(e: E) -> EmotionError {
    EmotionError::Render(e.to_string())
}

fn prepare(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    Accuracy,
    Loss,
}

impl Curve {
    pub fn label(self) -> &'static str {
        match self {
            Curve::Accuracy => "Accuracy",
            Curve::Loss => "Loss",
        }
    }

    fn series(self, history: &TrainingHistory) -> (Vec<f32>, Vec<f32>) {
        match self {
            Curve::Accuracy => (history.train_accuracy(), history.val_accuracy()),
            Curve::Loss => (history.train_loss(), history.val_loss()),
        }
    }
}

/// `(epoch, value)` pairs with non-finite values dropped. Epochs start at 1.
pub fn finite_points(values: &[f32]) -> Vec<(f32, f32)> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, &v)| ((i + 1) as f32, v))
        .collect()
}

/// Padded `[min, max]` of the finite values, `(0, 1)` when there are none.
pub fn value_range<'a>(values: impl IntoIterator<Item = &'a f32>) -> (f32, f32) {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if lo > hi {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.05).max(0.05);
    (lo - pad, hi + pad)
}

/// White for 0, dark blue for 1.
pub fn heat_color(t: f64) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let mix = |from: f64, to: f64| (from + (to - from) * t).round() as u8;
    RGBColor(mix(247.0, 8.0), mix(251.0, 48.0), mix(255.0, 107.0))
}

/// Train vs validation curve of `curve` by epoch.
pub fn plot_training_curve(history: &TrainingHistory, curve: Curve, path: &Path) -> Result<()> {
    prepare(path)?;
    let (train, val) = curve.series(history);
    let (y_min, y_max) = value_range(train.iter().chain(&val));
    let x_max = history.len().max(2) as f32;

    let root = BitMapBackend::new(path, (800, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(render_error)?;

    {
        let mut chart = ChartBuilder::on(&root)
            .margin(15)
            .caption(format!("Model {}", curve.label()), (FONT, 24))
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(1f32..x_max, y_min..y_max)
            .map_err(render_error)?;

        chart
            .configure_mesh()
            .x_desc("Epoch")
            .y_desc(curve.label())
            .draw()
            .map_err(render_error)?;

        for (values, name, color) in [(&train, "train", BLUE), (&val, "validation", RED)] {
            chart
                .draw_series(LineSeries::new(finite_points(values), color.stroke_width(2)))
                .map_err(render_error)?
                .label(name)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        }

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(render_error)?;
    }

    root.present().map_err(render_error)?;
    Ok(())
}

/// Heat map of the confusion matrix with the count written in every cell.
pub fn plot_confusion_matrix(matrix: &ConfusionMatrix, path: &Path) -> Result<()> {
    let n = matrix.num_classes();
    if n == 0 {
        return Err(EmotionError::Render("confusion matrix has no classes".to_string()));
    }
    prepare(path)?;

    let names = matrix.class_names();
    let label = |v: &i32| {
        usize::try_from(*v)
            .ok()
            .and_then(|i| names.get(i))
            .cloned()
            .unwrap_or_default()
    };
    let max = matrix.max_count().max(1) as f64;
    let cells: Vec<(i32, i32, usize)> = matrix
        .rows()
        .iter()
        .enumerate()
        .flat_map(|(i, row)| {
            row.iter()
                .enumerate()
                .map(move |(j, &count)| (j as i32, i as i32, count))
        })
        .collect();

    let root = BitMapBackend::new(path, (760, 680)).into_drawing_area();
    root.fill(&WHITE).map_err(render_error)?;

    {
        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .caption("Confusion Matrix", (FONT, 24))
            .x_label_area_size(50)
            .y_label_area_size(90)
            .build_cartesian_2d(0i32..n as i32, n as i32..0i32)
            .map_err(render_error)?;

        let (w, h) = chart.plotting_area().dim_in_pixel();
        let cell_w = (w as usize / n) as i32;
        let cell_h = (h as usize / n) as i32;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .disable_y_mesh()
            .x_labels(n + 1)
            .y_labels(n + 1)
            .x_label_offset(cell_w / 2)
            .y_label_offset(cell_h / 2)
            .x_label_formatter(&label)
            .y_label_formatter(&label)
            .x_desc("Predicted")
            .y_desc("True")
            .draw()
            .map_err(render_error)?;

        chart
            .draw_series(cells.iter().map(|&(x, y, count)| {
                Rectangle::new(
                    [(x, y), (x + 1, y + 1)],
                    heat_color(count as f64 / max).filled(),
                )
            }))
            .map_err(render_error)?;

        chart
            .draw_series(cells.iter().map(|&(x, y, count)| {
                let color = if count as f64 / max > 0.5 { WHITE } else { BLACK };
                EmptyElement::at((x, y))
                    + Text::new(
                        count.to_string(),
                        (cell_w / 2 - 6, cell_h / 2 - 8),
                        (FONT, 16).into_font().color(&color),
                    )
            }))
            .map_err(render_error)?;
    }

    root.present().map_err(render_error)?;
    Ok(())
}

/// One row per sample: the image with its true label, then the class
/// probabilities with the predicted class in red.
pub fn plot_sample_predictions(
    samples: &[SamplePrediction],
    class_names: &[String],
    path: &Path,
) -> Result<()> {
    if samples.is_empty() {
        return Err(EmotionError::Render("no samples to plot".to_string()));
    }
    prepare(path)?;

    let root = BitMapBackend::new(path, (900, 220 * samples.len() as u32)).into_drawing_area();
    root.fill(&WHITE).map_err(render_error)?;

    let cells = root.split_evenly((samples.len(), 2));
    for (sample, row) in samples.iter().zip(cells.chunks(2)) {
        if let [image_area, chart_area] = row {
            draw_image(image_area, sample, class_names)?;
            draw_probabilities(chart_area, sample, class_names)?;
        }
    }

    root.present().map_err(render_error)?;
    Ok(())
}

fn class_name(names: &[String], id: usize) -> &str {
    names.get(id).map(String::as_str).unwrap_or("?")
}

fn draw_image(area: &Area<'_>, sample: &SamplePrediction, names: &[String]) -> Result<()> {
    let title = format!("True: {}", class_name(names, sample.true_label));
    let area = area.titled(&title, (FONT, 18)).map_err(render_error)?;

    let (w, h) = area.dim_in_pixel();
    let (iw, ih) = sample.image.dimensions();
    if iw == 0 || ih == 0 {
        return Ok(());
    }
    let scale = (w / iw).min(h / ih).max(1) as i32;
    let x0 = (w as i32 - iw as i32 * scale).max(0) / 2;

    for (x, y, pixel) in sample.image.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let left = x0 + x as i32 * scale;
        let top = y as i32 * scale;
        area.draw(&Rectangle::new(
            [(left, top), (left + scale, top + scale)],
            RGBColor(r, g, b).filled(),
        ))
        .map_err(render_error)?;
    }
    Ok(())
}

fn draw_probabilities(area: &Area<'_>, sample: &SamplePrediction, names: &[String]) -> Result<()> {
    let n = sample.probabilities.len() as u32;
    let predicted = sample.predicted;
    let confidence = sample.probabilities.get(predicted).copied().unwrap_or(0.0);

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .caption(
            format!(
                "Predicted: {} ({:.1}%)",
                class_name(names, predicted),
                confidence * 100.0
            ),
            (FONT, 18),
        )
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d((0u32..n).into_segmented(), 0f32..1f32)
        .map_err(render_error)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_label_formatter(&|v: &SegmentValue<u32>| match v {
            SegmentValue::CenterOf(i) => class_name(names, *i as usize).to_string(),
            _ => String::new(),
        })
        .y_desc("Probability")
        .draw()
        .map_err(render_error)?;

    chart
        .draw_series(
            Histogram::vertical(&chart)
                .style(BLUE.mix(0.6).filled())
                .margin(6)
                .data(
                    sample
                        .probabilities
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| *i != predicted)
                        .map(|(i, &p)| (i as u32, p)),
                ),
        )
        .map_err(render_error)?;

    chart
        .draw_series(
            Histogram::vertical(&chart)
                .style(RED.filled())
                .margin(6)
                .data(std::iter::once((predicted as u32, confidence))),
        )
        .map_err(render_error)?;

    Ok(())
}

/// Bar chart of images per class.
pub fn plot_class_distribution(counts: &[(String, usize)], path: &Path) -> Result<()> {
    if counts.is_empty() {
        return Err(EmotionError::Render("no classes to plot".to_string()));
    }
    prepare(path)?;

    let n = counts.len() as u32;
    let top = counts.iter().map(|(_, c)| *c).max().unwrap_or(0) as u32;
    let top = top + top / 10 + 1;

    let root = BitMapBackend::new(path, (800, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(render_error)?;

    {
        let mut chart = ChartBuilder::on(&root)
            .margin(15)
            .caption("Class Distribution", (FONT, 24))
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d((0u32..n).into_segmented(), 0u32..top)
            .map_err(render_error)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_label_formatter(&|v: &SegmentValue<u32>| match v {
                SegmentValue::CenterOf(i) => counts
                    .get(*i as usize)
                    .map(|(name, _)| name.clone())
                    .unwrap_or_default(),
                _ => String::new(),
            })
            .x_desc("Emotion")
            .y_desc("Images")
            .draw()
            .map_err(render_error)?;

        chart
            .draw_series(
                Histogram::vertical(&chart)
                    .style(BLUE.mix(0.7).filled())
                    .margin(10)
                    .data(counts.iter().enumerate().map(|(i, (_, c))| (i as u32, *c as u32))),
            )
            .map_err(render_error)?;
    }

    root.present().map_err(render_error)?;
    Ok(())
}

/// Text of each box in the architecture diagram, input to output.
pub fn architecture_rows(plan: &NetworkPlan) -> Vec<String> {
    let shape = |s: &crate::model::FeatureShape| format!("{}x{}x{}", s.channels, s.height, s.width);

    let mut rows = vec![
        format!("Input {}", shape(&plan.input)),
        format!("Stem Conv3x3/2 + BN + Swish -> {}", shape(&plan.stem)),
    ];
    for (i, block) in plan.blocks.iter().enumerate() {
        rows.push(format!(
            "Block {} MBConv{} k{} s{} + SE{} -> {}",
            i + 1,
            block.spec.expansion,
            block.spec.kernel_size,
            block.spec.stride,
            if block.residual { " + skip" } else { "" },
            shape(&block.output)
        ));
    }
    rows.push(format!("GlobalAvgPool -> {}", plan.features));
    rows.push("Dropout".to_string());
    rows.push(format!("Dense -> {} classes", plan.num_classes));
    rows
}

/// Vertical flow diagram of the network.
pub fn plot_architecture(plan: &NetworkPlan, path: &Path) -> Result<()> {
    prepare(path)?;
    let rows = architecture_rows(plan);

    const BOX_W: i32 = 460;
    const BOX_H: i32 = 40;
    const STEP: i32 = 60;
    const LEFT: i32 = 70;
    const TOP: i32 = 20;

    let height = (TOP * 2 + STEP * rows.len() as i32) as u32;
    let root = BitMapBackend::new(path, (600, height)).into_drawing_area();
    root.fill(&WHITE).map_err(render_error)?;

    for (i, text) in rows.iter().enumerate() {
        let top = TOP + STEP * i as i32;
        root.draw(&Rectangle::new(
            [(LEFT, top), (LEFT + BOX_W, top + BOX_H)],
            RGBColor(222, 235, 247).filled(),
        ))
        .map_err(render_error)?;
        root.draw(&Rectangle::new(
            [(LEFT, top), (LEFT + BOX_W, top + BOX_H)],
            BLACK.stroke_width(1),
        ))
        .map_err(render_error)?;
        root.draw(&Text::new(text.as_str(), (LEFT + 12, top + 12), (FONT, 16)))
            .map_err(render_error)?;

        if i + 1 < rows.len() {
            let x = LEFT + BOX_W / 2;
            root.draw(&PathElement::new(
                vec![(x, top + BOX_H), (x, top + STEP)],
                BLACK.stroke_width(2),
            ))
            .map_err(render_error)?;
        }
    }

    root.present().map_err(render_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;
    use crate::training::EpochRecord;

    #[test]
    fn test_finite_points_skip_nan_and_keep_epochs() {
        let points = finite_points(&[0.5, f32::NAN, 0.7]);
        assert_eq!(points, vec![(1.0, 0.5), (3.0, 0.7)]);
    }

    #[test]
    fn test_value_range() {
        assert_eq!(value_range(&[f32::NAN]), (0.0, 1.0));
        let (lo, hi) = value_range(&[0.2, 0.8]);
        assert!(lo < 0.2 && hi > 0.8);
        let (lo, hi) = value_range(&[0.5, 0.5]);
        assert!(lo < hi);
    }

    #[test]
    fn test_heat_color_endpoints() {
        assert_eq!(heat_color(0.0), RGBColor(247, 251, 255));
        assert_eq!(heat_color(1.0), RGBColor(8, 48, 107));
        assert_eq!(heat_color(f64::NAN), heat_color(0.0));
    }

    #[test]
    fn test_architecture_rows_cover_every_layer() {
        let plan = ModelConfig::new(48, 6).plan().unwrap();
        let rows = architecture_rows(&plan);
        assert_eq!(rows.len(), 2 + 7 + 3);
        assert_eq!(rows[0], "Input 3x48x48");
        assert!(rows[1].ends_with("32x24x24"));
        assert!(rows[8].contains("320x2x2"));
        assert_eq!(rows[11], "Dense -> 6 classes");
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.png");
        assert!(plot_class_distribution(&[], &path).is_err());
        assert!(plot_sample_predictions(&[], &[], &path).is_err());
        assert!(plot_confusion_matrix(&ConfusionMatrix::new(Vec::new()), &path).is_err());
    }

    #[test]
    fn test_curve_render_writes_png_or_reports_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plots/accuracy.png");
        let mut history = TrainingHistory::new();
        for epoch in 1..=3 {
            history.push(EpochRecord {
                epoch,
                train_loss: 1.0 / epoch as f32,
                train_accuracy: 0.2 * epoch as f32,
                val_loss: 1.1 / epoch as f32,
                val_accuracy: 0.18 * epoch as f32,
                learning_rate: 1e-3,
            });
        }

        // Text needs a system font; without one plotters reports an error.
        match plot_training_curve(&history, Curve::Accuracy, &path) {
            Ok(()) => assert!(path.exists()),
            Err(err) => assert!(matches!(err, EmotionError::Render(_))),
        }
    }
}
