use std::time::Instant;

use anyhow::Context;
use image::{DynamicImage, RgbImage};

use crate::detector::Detector;
use crate::error::VisionResult;
use crate::face::Face;
use crate::model::{load_session, ModelPaths};
use crate::recognizer::Recognizer;

#[derive(Debug, Clone, Copy)]
pub struct AnalyzerOptions {
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            score_threshold: 0.6,
            nms_threshold: 0.3,
        }
    }
}

/// Full pipeline: detect faces → align → encode
pub struct FaceAnalyzer {
    detector: Detector,
    recognizer: Recognizer,
}

impl FaceAnalyzer {
    pub fn load(paths: &ModelPaths, options: AnalyzerOptions) -> VisionResult<Self> {
        let started = Instant::now();
        let detector = Detector::new(
            load_session(&paths.detector)?,
            options.score_threshold,
            options.nms_threshold,
        );
        let recognizer = Recognizer::new(load_session(&paths.recognizer)?);
        log::info!("models loaded in {:.2}s", started.elapsed().as_secs_f32());
        Ok(Self {
            detector,
            recognizer,
        })
    }

    /// Push one blank frame through the detector so the first real request
    /// does not pay for lazy runtime allocations.
    pub fn warm_up(&mut self) -> VisionResult<()> {
        let blank = RgbImage::new(64, 64);
        self.detector.detect(&blank).context("detector warm-up")?;
        Ok(())
    }

    /// Every face in `img`, in detector order, with `index` set to the
    /// position in that order.
    pub fn analyze(&mut self, img: &DynamicImage) -> VisionResult<Vec<Face>> {
        let rgb = img.to_rgb8();
        let detections = self.detector.detect(&rgb).context("detecting faces")?;

        let mut faces = Vec::with_capacity(detections.len());
        for (index, detection) in detections.iter().enumerate() {
            let embedding = self
                .recognizer
                .embed(&rgb, detection)
                .with_context(|| format!("encoding face {}", index))?;
            faces.push(Face {
                index,
                embedding,
                confidence: detection.score,
                bounding_box: detection.bbox,
            });
        }
        Ok(faces)
    }
}
