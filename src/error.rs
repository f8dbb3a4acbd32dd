use std::path::PathBuf;

use facematch_vision::VisionError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FaceMatchError>;

/// Everything a request can fail with. Only
/// [`FaceMatchError::ModelInitialization`] is fatal to the server; every
/// other kind is reported back on the response channel.
#[derive(Debug, Error)]
pub enum FaceMatchError {
    #[error("Image not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    #[error("Could not decode image {}: {reason}", path.display())]
    ImageDecode { path: PathBuf, reason: String },

    #[error("No face detected in image")]
    NoFaceDetected,

    #[error("Multiple faces detected ({0}); a selfie must contain exactly one face")]
    MultipleFaces(usize),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Model initialization failed: {0}")]
    ModelInitialization(String),

    #[error("Failed to clean up {}: {source}", path.display())]
    ResourceCleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Face extraction failed: {0}")]
    Extraction(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FaceMatchError {
    /// Whether the process can keep serving after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FaceMatchError::ModelInitialization(_))
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        FaceMatchError::MalformedRequest(msg.into())
    }
}

impl From<VisionError> for FaceMatchError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::ImageNotFound(path) => FaceMatchError::ImageNotFound(path),
            VisionError::ImageDecode { path, source } => FaceMatchError::ImageDecode {
                path,
                reason: source.to_string(),
            },
            VisionError::ModelInit { .. } => FaceMatchError::ModelInitialization(err.to_string()),
            VisionError::Inference(e) => FaceMatchError::Extraction(format!("{e:#}")),
        }
    }
}

impl From<serde_json::Error> for FaceMatchError {
    fn from(err: serde_json::Error) -> Self {
        FaceMatchError::MalformedRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_model_init_is_fatal() {
        assert!(FaceMatchError::ModelInitialization("boom".into()).is_fatal());
        assert!(!FaceMatchError::NoFaceDetected.is_fatal());
        assert!(!FaceMatchError::UnknownCommand("x".into()).is_fatal());
    }

    #[test]
    fn vision_errors_keep_their_kind() {
        let err: FaceMatchError = VisionError::ImageNotFound(PathBuf::from("/tmp/a.jpg")).into();
        assert!(matches!(err, FaceMatchError::ImageNotFound(_)));

        let err: FaceMatchError = VisionError::ModelInit {
            path: PathBuf::from("/m.onnx"),
            source: anyhow::anyhow!("missing"),
        }
        .into();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("/m.onnx"));
    }
}
