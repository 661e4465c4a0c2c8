use burn::prelude::*;
use std::fmt;
use std::path::Path;

use super::emotion_net::{EmotionNet, NetworkPlan};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct LayerSummary {
    pub name: String,
    pub description: String,
    pub output_shape: [usize; 3],
    pub params: usize,
}

/// Layer table written next to the run outputs.
#[derive(Debug, Clone)]
pub struct ModelSummary {
    pub layers: Vec<LayerSummary>,
    pub total_params: usize,
}

impl ModelSummary {
    pub fn new<B: Backend>(model: &EmotionNet<B>, plan: &NetworkPlan) -> Self {
        let mut layers = vec![LayerSummary {
            name: "input".to_string(),
            description: "image".to_string(),
            output_shape: [plan.input.channels, plan.input.height, plan.input.width],
            params: 0,
        }];

        layers.push(LayerSummary {
            name: "stem".to_string(),
            description: "conv3x3/2 + bn + swish".to_string(),
            output_shape: [plan.stem.channels, plan.stem.height, plan.stem.width],
            params: model.stem().num_params(),
        });

        for (i, (block, block_plan)) in model.blocks().iter().zip(&plan.blocks).enumerate() {
            let spec = block_plan.spec;
            let out = block_plan.output;
            layers.push(LayerSummary {
                name: format!("mbconv_{}", i + 1),
                description: format!(
                    "k{} s{} e{}{}",
                    spec.kernel_size,
                    spec.stride,
                    spec.expansion,
                    if block_plan.residual { " +residual" } else { "" }
                ),
                output_shape: [out.channels, out.height, out.width],
                params: block.num_params(),
            });
        }

        layers.push(LayerSummary {
            name: "head".to_string(),
            description: "avgpool + dropout + dense".to_string(),
            output_shape: [plan.num_classes, 1, 1],
            params: model.classifier().num_params(),
        });

        Self {
            layers,
            total_params: model.num_params(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_string())?;
        Ok(())
    }
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model: EmotionNet")?;
        writeln!(f, "{}", "=".repeat(78))?;
        writeln!(
            f,
            "{:<12} {:<34} {:<18} {:>10}",
            "Layer", "Type", "Output (C,H,W)", "Params"
        )?;
        writeln!(f, "{}", "-".repeat(78))?;
        for layer in &self.layers {
            let [c, h, w] = layer.output_shape;
            writeln!(
                f,
                "{:<12} {:<34} {:<18} {:>10}",
                layer.name,
                layer.description,
                format!("({c}, {h}, {w})"),
                layer.params
            )?;
        }
        writeln!(f, "{}", "=".repeat(78))?;
        writeln!(f, "Total params: {}", self.total_params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_summary_lists_every_stage() {
        let device = Default::default();
        let config = ModelConfig::new(48, 6);
        let model = EmotionNet::<TestBackend>::new(&device, &config).unwrap();
        let summary = ModelSummary::new(&model, &config.plan().unwrap());

        // input + stem + 7 blocks + head
        assert_eq!(summary.layers.len(), 10);
        assert_eq!(summary.layers[8].output_shape, [320, 2, 2]);

        let listed: usize = summary.layers.iter().map(|l| l.params).sum();
        assert_eq!(listed, summary.total_params);

        let text = summary.to_string();
        assert!(text.contains("mbconv_7"));
        assert!(text.contains("Total params"));
    }
}
