use image::RgbImage;
use ndarray::Array4;

/// Pack an RGB image into the `[1, 3, H, W]` BGR float layout both ONNX
/// graphs take, keeping raw 0..255 intensities.
pub fn bgr_planar(img: &RgbImage) -> Array4<f32> {
    let (width, height) = img.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, px) in img.enumerate_pixels() {
        let [r, g, b] = px.0;
        let (x, y) = (x as usize, y as usize);
        tensor[[0, 0, y, x]] = b as f32;
        tensor[[0, 1, y, x]] = g as f32;
        tensor[[0, 2, y, x]] = r as f32;
    }
    tensor
}
