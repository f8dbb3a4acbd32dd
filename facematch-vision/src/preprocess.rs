//! Image loading and size normalisation ahead of detection.

use std::path::Path;

use image::{DynamicImage, GenericImageView};

use crate::error::{VisionError, VisionResult};

/// Largest side accepted by the detector before downscaling kicks in.
pub const DEFAULT_MAX_DIMENSION: u32 = 1280;

/// Read and decode an image file, then bound its larger side.
pub fn load_image(path: &Path, max_dimension: u32) -> VisionResult<DynamicImage> {
    let bytes = std::fs::read(path).map_err(|e| {
        log::debug!("reading {} failed: {}", path.display(), e);
        VisionError::ImageNotFound(path.to_path_buf())
    })?;
    let img = image::load_from_memory(&bytes).map_err(|source| VisionError::ImageDecode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(preprocess(img, max_dimension))
}

/// Downscale so that `max(width, height) == max_dimension`, keeping the
/// aspect ratio. Images already within bounds are returned untouched.
pub fn preprocess(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    match bounded_dimensions(width, height, max_dimension) {
        Some((w, h)) => {
            log::debug!("downscaling {}x{} -> {}x{}", width, height, w, h);
            // thumbnail_exact averages every source pixel into its target cell
            img.thumbnail_exact(w, h)
        }
        None => img,
    }
}

/// Target size for an image whose larger side exceeds `max_dimension`, or
/// `None` when no resize is needed. Never upscales.
pub fn bounded_dimensions(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    let max_side = width.max(height);
    if max_dimension == 0 || max_side <= max_dimension {
        return None;
    }
    let scale = max_dimension as f64 / max_side as f64;
    let shrink = |side: u32| ((side as f64 * scale) as u32).clamp(1, max_dimension);
    if width >= height {
        Some((max_dimension, shrink(height)))
    } else {
        Some((shrink(width), max_dimension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_images_pass_through() {
        assert_eq!(bounded_dimensions(640, 480, 1280), None);
        assert_eq!(bounded_dimensions(1280, 720, 1280), None);
    }

    #[test]
    fn larger_side_lands_on_bound() {
        assert_eq!(bounded_dimensions(2560, 1440, 1280), Some((1280, 720)));
        assert_eq!(bounded_dimensions(1000, 4000, 1280), Some((320, 1280)));
    }

    #[test]
    fn extreme_aspect_keeps_one_pixel() {
        assert_eq!(bounded_dimensions(10_000, 2, 100), Some((100, 1)));
    }

    #[test]
    fn preprocess_resizes_image() {
        let img = DynamicImage::new_rgb8(400, 200);
        let out = preprocess(img, 100);
        assert_eq!(out.dimensions(), (100, 50));

        let img = DynamicImage::new_rgb8(40, 20);
        let out = preprocess(img, 100);
        assert_eq!(out.dimensions(), (40, 20));
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = load_image(Path::new("/nonexistent/facematch/selfie.jpg"), 1280).unwrap_err();
        assert!(matches!(err, VisionError::ImageNotFound(_)));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not an image")?;
        let err = load_image(&path, 1280).unwrap_err();
        assert!(matches!(err, VisionError::ImageDecode { .. }));
        Ok(())
    }
}
