#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use facematch::config::Config;
use facematch::{Face, FaceExtractor, FaceMatchError, ModelHandle, Server};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use serde_json::Value;

/// Reads its "detections" off the image: the red channel of the top-left
/// pixel is the face count, green becomes part of every embedding.
pub struct StubExtractor;

impl FaceExtractor for StubExtractor {
    fn extract_all(&mut self, image: &DynamicImage) -> facematch::Result<Vec<Face>> {
        let px = image.get_pixel(0, 0);
        let (count, tag) = (px[0] as usize, px[1] as f32);
        Ok((0..count)
            .map(|index| Face {
                index,
                embedding: vec![1.0, tag, index as f32],
                confidence: 0.9 - 0.1 * index as f32,
                bounding_box: [10.0 * index as f32, 0.0, 10.0 * index as f32 + 8.0, 8.0],
            })
            .collect())
    }
}

/// Write a 4x4 PNG the stub will report `faces` faces for.
pub fn stub_image(dir: &Path, name: &str, faces: u8, tag: u8) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(4, 4, Rgb([faces, tag, 0]))
        .save(&path)
        .expect("write test image");
    path
}

pub fn counting_model(loads: &Arc<AtomicUsize>) -> ModelHandle<StubExtractor> {
    let loads = Arc::clone(loads);
    ModelHandle::new(move || {
        loads.fetch_add(1, Ordering::SeqCst);
        Ok(StubExtractor)
    })
}

pub fn failing_model() -> ModelHandle<StubExtractor> {
    ModelHandle::new(|| {
        Err(FaceMatchError::ModelInitialization(
            "weights missing".into(),
        ))
    })
}

pub fn stub_server(config: Config) -> Server<StubExtractor> {
    Server::new(config, ModelHandle::ready(StubExtractor))
}

/// Serve `lines` and collect every response line as JSON.
pub fn serve_lines<E: FaceExtractor>(
    server: &Server<E>,
    lines: &[String],
) -> (facematch::Result<facematch::server::ServeSummary>, Vec<Value>) {
    let input = lines.join("\n");
    let mut out = Vec::new();
    let result = server.run(input.as_bytes(), &mut out);
    let responses = String::from_utf8(out)
        .expect("utf-8 output")
        .lines()
        .map(|l| serde_json::from_str(l).expect("response is JSON"))
        .collect();
    (result, responses)
}

pub fn request(id: impl Into<Value>, command: &str, args: Vec<Value>) -> String {
    serde_json::json!({ "requestId": id.into(), "command": command, "args": args }).to_string()
}
