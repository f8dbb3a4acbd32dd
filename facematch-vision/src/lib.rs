pub mod detector;
pub mod error;
pub mod face;
pub mod model;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod tensor;
pub mod yunet;

// Re-export commonly used types
pub use error::{VisionError, VisionResult};
pub use face::{Detection, Face};
pub use model::ModelPaths;
pub use pipeline::{AnalyzerOptions, FaceAnalyzer};
pub use preprocess::{load_image, preprocess, DEFAULT_MAX_DIMENSION};
