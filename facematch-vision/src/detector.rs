use anyhow::Result;
use image::{imageops, RgbImage};
use ort::{session::Session, value::Value};

use crate::face::{nms, Detection};
use crate::tensor::bgr_planar;
use crate::yunet::{self, Candidate};

/// YuNet takes a fixed square input.
pub const INPUT_SIZE: u32 = 640;

/// How a source image was scaled and padded onto the square network input,
/// so detections can be mapped back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// Scale `img` to fit a `size`x`size` canvas, centred on black.
    pub fn fit(img: &RgbImage, size: u32) -> (RgbImage, Self) {
        let (width, height) = img.dimensions();
        let scale = size as f32 / width.max(height).max(1) as f32;
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);

        let resized = imageops::resize(img, new_w, new_h, imageops::FilterType::Triangle);
        let mut canvas = RgbImage::new(size, size);
        let pad_x = (size - new_w) / 2;
        let pad_y = (size - new_h) / 2;
        imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);

        let letterbox = Self {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        };
        (canvas, letterbox)
    }

    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }

    fn restore(&self, c: Candidate) -> Detection {
        let (x0, y0) = self.to_source(c.bbox[0], c.bbox[1]);
        let (x1, y1) = self.to_source(c.bbox[2], c.bbox[3]);
        let mut landmarks = [0.0f32; 10];
        for point in 0..5 {
            let (x, y) = self.to_source(c.landmarks[point * 2], c.landmarks[point * 2 + 1]);
            landmarks[point * 2] = x;
            landmarks[point * 2 + 1] = y;
        }
        Detection {
            bbox: [x0, y0, x1, y1],
            score: c.score,
            landmarks,
        }
    }
}

pub struct Detector {
    session: Session,
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Detector {
    pub fn new(session: Session, score_threshold: f32, nms_threshold: f32) -> Self {
        Self {
            session,
            score_threshold,
            nms_threshold,
        }
    }

    /// Every face scoring above the threshold, highest score first.
    pub fn detect(&mut self, img: &RgbImage) -> Result<Vec<Detection>> {
        let (canvas, letterbox) = Letterbox::fit(img, INPUT_SIZE);
        let input = Value::from_array(bgr_planar(&canvas))?;

        let outputs = self.session.run(ort::inputs![input])?;
        let mut raw: Vec<yunet::RawOutput> = Vec::new();
        for (_name, output) in outputs.iter() {
            let (shape, data) = output.try_extract_tensor::<f32>()?;
            raw.push((shape.iter().copied().collect(), data.to_vec()));
        }

        let candidates = yunet::decode(&raw, INPUT_SIZE as usize, self.score_threshold)?;
        log::debug!("detector: {} candidates above threshold", candidates.len());

        let detections = candidates
            .into_iter()
            .map(|c| letterbox.restore(c))
            .collect();
        Ok(nms(detections, self.nms_threshold))
    }
}
