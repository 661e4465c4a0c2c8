use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EmotionError>;

#[derive(Error, Debug)]
pub enum EmotionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Dataset layout problems: missing root, no classes, empty class folder.
    #[error("Dataset error at {path}: {message}")]
    Dataset { path: PathBuf, message: String },

    #[error("Failed to decode image {path} (class '{class}'): {source}")]
    Image {
        path: PathBuf,
        class: String,
        #[source]
        source: image::ImageError,
    },

    /// Invalid settings or a network topology that cannot be built.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Checkpoint error at {path}: {message}")]
    Checkpoint { path: PathBuf, message: String },

    #[error("Tensor error: {0}")]
    Tensor(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EmotionError {
    pub fn dataset(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Dataset {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn checkpoint(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Checkpoint {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for EmotionError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for EmotionError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
