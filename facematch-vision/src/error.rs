use std::path::PathBuf;

use thiserror::Error;

pub type VisionResult<T> = Result<T, VisionError>;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Image not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    #[error("Could not decode image {}: {source}", path.display())]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to load model {}: {source:#}", path.display())]
    ModelInit {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Inference failed: {0:#}")]
    Inference(#[from] anyhow::Error),
}
