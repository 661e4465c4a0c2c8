pub mod preprocessing;
pub mod split;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{EmotionError, Result};

pub use preprocessing::{image_to_tensor, ImagePreprocessor};
pub use split::{split_sizes, DatasetSplit, Partition};

/// Class name <-> index table.
///
/// Indices follow the sorted order of the class names, so the same folder
/// layout always produces the same encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMapping {
    names: Vec<String>,
}

impl ClassMapping {
    pub fn fit<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = classes.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        Self { names }
    }

    pub fn encode(&self, class: &str) -> Option<usize> {
        self.names.binary_search_by(|n| n.as_str().cmp(class)).ok()
    }

    pub fn decode(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

pub fn one_hot(label: usize, num_classes: usize) -> Vec<f32> {
    let mut row = vec![0.0; num_classes];
    row[label] = 1.0;
    row
}

/// Facial emotion images loaded fully into memory.
///
/// Expected layout:
/// ```text
/// root/
/// ├── Angry/
/// ├── Fear/
/// ├── Happy/
/// └── ...
/// ```
#[derive(Debug, Clone)]
pub struct EmotionDataset {
    images: Vec<RgbImage>,
    labels: Vec<usize>,
    mapping: ClassMapping,
    class_counts: Vec<(String, usize)>,
}

impl EmotionDataset {
    pub fn new(images: Vec<RgbImage>, labels: Vec<usize>, mapping: ClassMapping) -> Result<Self> {
        if images.len() != labels.len() {
            return Err(EmotionError::Configuration(format!(
                "{} images but {} labels",
                images.len(),
                labels.len()
            )));
        }
        if let Some(&bad) = labels.iter().find(|&&l| l >= mapping.len()) {
            return Err(EmotionError::Configuration(format!(
                "label {bad} out of range for {} classes",
                mapping.len()
            )));
        }

        let class_counts = mapping
            .names()
            .iter()
            .enumerate()
            .map(|(id, name)| (name.clone(), labels.iter().filter(|&&l| l == id).count()))
            .collect();

        Ok(Self {
            images,
            labels,
            mapping,
            class_counts,
        })
    }

    /// Load every image under `root`, one subfolder per class.
    ///
    /// Any unreadable image or empty class folder aborts the whole load.
    /// Regular files directly under `root` and hidden entries are ignored.
    pub fn load_from_folder(root: &Path, image_size: u32) -> Result<Self> {
        if !root.is_dir() {
            return Err(EmotionError::dataset(root, "dataset root is not a directory"));
        }

        let class_dirs = sorted_entries(root)?
            .into_iter()
            .filter(|path| path.is_dir())
            .map(|path| match path.file_name().and_then(|name| name.to_str()) {
                Some(name) => Ok((name.to_string(), path)),
                None => Err(EmotionError::dataset(
                    path,
                    "class folder name is not valid UTF-8",
                )),
            })
            .collect::<Result<Vec<(String, PathBuf)>>>()?;

        if class_dirs.is_empty() {
            return Err(EmotionError::dataset(root, "no class subfolders found"));
        }

        let mapping = ClassMapping::fit(class_dirs.iter().map(|(name, _)| name.clone()));
        let preprocessor = ImagePreprocessor::new(image_size);

        log::info!("Dataset loading from {}", root.display());

        let mut images = Vec::new();
        let mut labels = Vec::new();

        for (class, dir) in &class_dirs {
            let files: Vec<PathBuf> = sorted_entries(dir)?
                .into_iter()
                .filter(|p| p.is_file())
                .collect();

            if files.is_empty() {
                return Err(EmotionError::dataset(
                    dir,
                    format!("class folder '{class}' contains no images"),
                ));
            }

            log::info!("Loading {} images of category {}", files.len(), class);

            let label = mapping
                .encode(class)
                .ok_or_else(|| EmotionError::dataset(dir, format!("unmapped class '{class}'")))?;

            for file in &files {
                images.push(preprocessor.preprocess_image(file, class)?);
                labels.push(label);
            }
        }

        let dataset = Self::new(images, labels, mapping)?;
        log::info!(
            "Total number of loaded images: {}, with shape ({}, {}, 3)",
            dataset.len(),
            image_size,
            image_size
        );
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.mapping.len()
    }

    pub fn mapping(&self) -> &ClassMapping {
        &self.mapping
    }

    pub fn images(&self) -> &[RgbImage] {
        &self.images
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Per-class image counts in class-index order.
    pub fn class_counts(&self) -> &[(String, usize)] {
        &self.class_counts
    }

    /// Labels expanded to `(N, num_classes)` one-hot rows.
    pub fn one_hot(&self) -> Vec<Vec<f32>> {
        self.labels
            .iter()
            .map(|&l| one_hot(l, self.num_classes()))
            .collect()
    }

    pub(crate) fn into_parts(self) -> (Vec<RgbImage>, Vec<usize>, ClassMapping) {
        (self.images, self.labels, self.mapping)
    }
}

/// Non-hidden children of `dir`, sorted by file name.
fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| EmotionError::dataset(dir, e.to_string()))?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !hidden {
            entries.push(entry.into_path());
        }
    }
    Ok(entries)
}
