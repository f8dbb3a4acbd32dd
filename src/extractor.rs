use facematch_vision::{Face, FaceAnalyzer};
use image::DynamicImage;

use crate::error::{FaceMatchError, Result};

/// Anything that can turn one image into its faces. The ONNX analyzer is
/// the production implementation; tests plug in their own.
pub trait FaceExtractor: Send + 'static {
    /// All faces, in the extractor's native order, indexed from 0.
    fn extract_all(&mut self, image: &DynamicImage) -> Result<Vec<Face>>;
}

impl FaceExtractor for FaceAnalyzer {
    fn extract_all(&mut self, image: &DynamicImage) -> Result<Vec<Face>> {
        Ok(self.analyze(image)?)
    }
}

/// The one face of a registration image. Zero or several faces are errors
/// rather than a silent pick.
pub fn single_face(faces: Vec<Face>) -> Result<Face> {
    match faces.len() {
        0 => Err(FaceMatchError::NoFaceDetected),
        1 => faces.into_iter().next().ok_or(FaceMatchError::NoFaceDetected),
        n => Err(FaceMatchError::MultipleFaces(n)),
    }
}

/// The highest-confidence face; earlier faces win ties.
pub fn most_confident_face(faces: Vec<Face>) -> Result<Face> {
    faces
        .into_iter()
        .reduce(|best, f| if f.confidence > best.confidence { f } else { best })
        .ok_or(FaceMatchError::NoFaceDetected)
}
