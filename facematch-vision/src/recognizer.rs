use anyhow::{bail, Result};
use image::{imageops, Rgb, RgbImage};
use ort::{session::Session, value::Value};

use crate::face::Detection;
use crate::tensor::bgr_planar;

/// SFace and ArcFace-family encoders take 112x112 crops.
pub const FACE_SIZE: u32 = 112;

// Canonical eye centres in a 112x112 ArcFace crop.
const REF_LEFT_EYE: (f32, f32) = (38.2946, 51.6963);
const REF_RIGHT_EYE: (f32, f32) = (73.5318, 51.5014);

/// Rotation + uniform scale + translation, as `z' = m * z + t` over
/// complex numbers with `m = a + bi`.
#[derive(Debug, Clone, Copy)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// The transform that carries `from.0 -> to.0` and `from.1 -> to.1`.
    fn between(from: ((f32, f32), (f32, f32)), to: ((f32, f32), (f32, f32))) -> Option<Self> {
        let (sx, sy) = (from.1 .0 - from.0 .0, from.1 .1 - from.0 .1);
        let (dx, dy) = (to.1 .0 - to.0 .0, to.1 .1 - to.0 .1);
        let denom = sx * sx + sy * sy;
        if denom <= f32::EPSILON {
            return None;
        }
        let a = (dx * sx + dy * sy) / denom;
        let b = (dy * sx - dx * sy) / denom;
        let tx = to.0 .0 - (a * from.0 .0 - b * from.0 .1);
        let ty = to.0 .1 - (b * from.0 .0 + a * from.0 .1);
        Some(Self { a, b, tx, ty })
    }

    /// Where an output pixel comes from in the source image.
    fn source_of(&self, u: f32, v: f32) -> (f32, f32) {
        let (pu, pv) = (u - self.tx, v - self.ty);
        let norm = self.a * self.a + self.b * self.b;
        (
            (self.a * pu + self.b * pv) / norm,
            (self.a * pv - self.b * pu) / norm,
        )
    }
}

fn sample_bilinear(img: &RgbImage, x: f32, y: f32) -> Option<Rgb<u8>> {
    let (w, h) = img.dimensions();
    if x < 0.0 || y < 0.0 || x >= w as f32 || y >= h as f32 {
        return None;
    }
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);

    let corners = [
        (img.get_pixel(x0, y0), (1.0 - fx) * (1.0 - fy)),
        (img.get_pixel(x1, y0), fx * (1.0 - fy)),
        (img.get_pixel(x0, y1), (1.0 - fx) * fy),
        (img.get_pixel(x1, y1), fx * fy),
    ];
    let mut out = [0u8; 3];
    for (channel, slot) in out.iter_mut().enumerate() {
        let v: f32 = corners.iter().map(|(p, weight)| p[channel] as f32 * weight).sum();
        *slot = v.round().clamp(0.0, 255.0) as u8;
    }
    Some(Rgb(out))
}

/// Warp the face so its eyes land on the canonical positions of a
/// `size`x`size` crop. Falls back to a plain box crop when the eye
/// landmarks coincide.
pub fn align_face(img: &RgbImage, detection: &Detection, size: u32) -> RgbImage {
    let k = size as f32 / FACE_SIZE as f32;
    let lm = &detection.landmarks;
    let eyes = ((lm[0], lm[1]), (lm[2], lm[3]));
    let targets = (
        (REF_LEFT_EYE.0 * k, REF_LEFT_EYE.1 * k),
        (REF_RIGHT_EYE.0 * k, REF_RIGHT_EYE.1 * k),
    );

    let Some(transform) = Similarity::between(eyes, targets) else {
        return crop_box(img, detection, size);
    };

    let mut out = RgbImage::new(size, size);
    for (u, v, px) in out.enumerate_pixels_mut() {
        let (x, y) = transform.source_of(u as f32, v as f32);
        if let Some(sample) = sample_bilinear(img, x, y) {
            *px = sample;
        }
    }
    out
}

fn crop_box(img: &RgbImage, detection: &Detection, size: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    let [x0, y0, x1, y1] = detection.bbox;
    let left = (x0.max(0.0) as u32).min(w.saturating_sub(1));
    let top = (y0.max(0.0) as u32).min(h.saturating_sub(1));
    let right = (x1.max(0.0) as u32).clamp(left + 1, w.max(left + 1));
    let bottom = (y1.max(0.0) as u32).clamp(top + 1, h.max(top + 1));
    let crop = imageops::crop_imm(img, left, top, right - left, bottom - top).to_image();
    imageops::resize(&crop, size, size, imageops::FilterType::Triangle)
}

pub struct Recognizer {
    session: Session,
}

impl Recognizer {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Align the detected face and encode it to an L2-normalised vector.
    pub fn embed(&mut self, img: &RgbImage, detection: &Detection) -> Result<Vec<f32>> {
        let aligned = align_face(img, detection, FACE_SIZE);
        let input = Value::from_array(bgr_planar(&aligned))?;

        let outputs = self.session.run(ort::inputs![input])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

        // [1, D] for every encoder we ship; anything else is taken flat
        let width = match shape.len() {
            2 => shape[1] as usize,
            _ => data.len(),
        };
        if width == 0 || width > data.len() {
            bail!("encoder returned {} values for width {}", data.len(), width);
        }

        let mut embedding = data[..width].to_vec();
        let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(size: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| Rgb([x as u8, y as u8, ((x + y) / 2) as u8]))
    }

    fn with_eyes(left: (f32, f32), right: (f32, f32)) -> Detection {
        let mut landmarks = [0.0; 10];
        landmarks[0] = left.0;
        landmarks[1] = left.1;
        landmarks[2] = right.0;
        landmarks[3] = right.1;
        Detection {
            bbox: [20.0, 20.0, 90.0, 100.0],
            score: 0.9,
            landmarks,
        }
    }

    #[test]
    fn canonical_eyes_are_identity() {
        let img = gradient(FACE_SIZE);
        let det = with_eyes(REF_LEFT_EYE, REF_RIGHT_EYE);
        let aligned = align_face(&img, &det, FACE_SIZE);
        for (x, y) in [(0, 0), (56, 56), (100, 30), (111, 111)] {
            let a = aligned.get_pixel(x, y);
            let b = img.get_pixel(x, y);
            for c in 0..3 {
                assert!((a[c] as i32 - b[c] as i32).abs() <= 1, "pixel {x},{y}");
            }
        }
    }

    #[test]
    fn transform_hits_both_targets() {
        let from = ((100.0, 200.0), (160.0, 180.0));
        let to = ((38.0, 51.0), (73.0, 51.0));
        let t = Similarity::between(from, to).unwrap();
        for (src, dst) in [(from.0, to.0), (from.1, to.1)] {
            let (x, y) = t.source_of(dst.0, dst.1);
            assert!((x - src.0).abs() < 1e-3);
            assert!((y - src.1).abs() < 1e-3);
        }
    }

    #[test]
    fn coincident_eyes_fall_back_to_crop() {
        let img = gradient(200);
        let det = with_eyes((50.0, 50.0), (50.0, 50.0));
        let aligned = align_face(&img, &det, FACE_SIZE);
        assert_eq!(aligned.dimensions(), (FACE_SIZE, FACE_SIZE));
    }

    #[test]
    fn outside_samples_are_rejected() {
        let img = gradient(4);
        assert!(sample_bilinear(&img, -0.5, 1.0).is_none());
        assert!(sample_bilinear(&img, 4.0, 1.0).is_none());
        assert_eq!(sample_bilinear(&img, 1.0, 2.0), Some(Rgb([1, 2, 1])));
    }
}
