use std::path::PathBuf;

use anyhow::Result;
use facematch_vision::{AnalyzerOptions, FaceAnalyzer, ModelPaths, VisionError};
use image::DynamicImage;

/// Real model files, if the checkout has them. Tests that need inference
/// skip themselves otherwise.
fn model_paths() -> Option<ModelPaths> {
    let dir = std::env::var_os("FACEMATCH_MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("models"));
    let paths = ModelPaths {
        detector: dir.join("face_detection_yunet_2023mar.onnx"),
        recognizer: dir.join("face_recognition_sface_2021dec.onnx"),
    };
    if paths.detector.is_file() && paths.recognizer.is_file() {
        Some(paths)
    } else {
        eprintln!("Skipping: model files not found under {}", dir.display());
        None
    }
}

#[test]
fn missing_model_is_an_init_error() {
    let paths = ModelPaths {
        detector: PathBuf::from("/nonexistent/detector.onnx"),
        recognizer: PathBuf::from("/nonexistent/recognizer.onnx"),
    };
    match FaceAnalyzer::load(&paths, AnalyzerOptions::default()) {
        Err(VisionError::ModelInit { path, .. }) => assert_eq!(path, paths.detector),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("loading from a missing path succeeded"),
    }
}

#[test]
fn analyzer_warms_up() -> Result<()> {
    env_logger::try_init().ok();
    let Some(paths) = model_paths() else {
        return Ok(());
    };
    let mut analyzer = FaceAnalyzer::load(&paths, AnalyzerOptions::default())?;
    analyzer.warm_up()?;
    Ok(())
}

#[test]
fn blank_image_has_no_faces() -> Result<()> {
    env_logger::try_init().ok();
    let Some(paths) = model_paths() else {
        return Ok(());
    };
    let mut analyzer = FaceAnalyzer::load(&paths, AnalyzerOptions::default())?;
    let faces = analyzer.analyze(&DynamicImage::new_rgb8(320, 240))?;
    assert!(faces.is_empty());
    Ok(())
}
