//! Decoding of the YuNet detector heads.
//!
//! The 2023 YuNet graph is anchor-free and emits twelve tensors, four per
//! stride (8, 16, 32), in the order `cls_*`, `obj_*`, `bbox_*`, `kps_*`.
//! Every head is laid out as `[1, H*W, C]` with one row per grid cell:
//!
//! - `cls`, `obj`: `C = 1`, already passed through a sigmoid by the graph
//! - `bbox`: `C = 4`, centre offsets in cells and log-scale width/height
//! - `kps`: `C = 10`, five landmark offsets in cells
//!
//! A cell at column `c`, row `r` decodes to
//! `cx = (c + dx) * stride`, `w = exp(dw) * stride`, and the face score is
//! the geometric mean of `cls` and `obj`.

use anyhow::{bail, Result};
use ndarray::ArrayView2;

pub const STRIDES: [usize; 3] = [8, 16, 32];

/// One decoded grid cell, in pixel coordinates of the square network input.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// x0, y0, x1, y1
    pub bbox: [f32; 4],
    pub score: f32,
    /// Right eye, left eye, nose tip, right and left mouth corners as
    /// interleaved x, y pairs.
    pub landmarks: [f32; 10],
}

struct StrideHead<'a> {
    stride: usize,
    cells_per_row: usize,
    cls: ArrayView2<'a, f32>,
    obj: ArrayView2<'a, f32>,
    bbox: ArrayView2<'a, f32>,
    kps: ArrayView2<'a, f32>,
}

/// Output tensor as returned by the runtime: shape and flat data.
pub type RawOutput = (Vec<i64>, Vec<f32>);

pub fn face_score(cls: f32, obj: f32) -> f32 {
    (cls.clamp(0.0, 1.0) * obj.clamp(0.0, 1.0)).sqrt()
}

/// Turn the twelve raw outputs into candidates scoring at least
/// `score_threshold`. No suppression happens here.
pub fn decode(
    outputs: &[RawOutput],
    input_size: usize,
    score_threshold: f32,
) -> Result<Vec<Candidate>> {
    if outputs.len() < 4 * STRIDES.len() {
        bail!(
            "detector produced {} outputs, expected {}",
            outputs.len(),
            4 * STRIDES.len()
        );
    }

    let mut candidates = Vec::new();
    for (level, &stride) in STRIDES.iter().enumerate() {
        let head = stride_head(outputs, level, stride, input_size)?;
        decode_head(&head, score_threshold, &mut candidates);
    }
    Ok(candidates)
}

fn stride_head(
    outputs: &[RawOutput],
    level: usize,
    stride: usize,
    input_size: usize,
) -> Result<StrideHead<'_>> {
    let cells_per_row = input_size / stride;
    let cells = cells_per_row * cells_per_row;
    let levels = STRIDES.len();

    Ok(StrideHead {
        stride,
        cells_per_row,
        cls: head_view(outputs, level, cells, 1)?,
        obj: head_view(outputs, levels + level, cells, 1)?,
        bbox: head_view(outputs, 2 * levels + level, cells, 4)?,
        kps: head_view(outputs, 3 * levels + level, cells, 10)?,
    })
}

fn head_view(
    outputs: &[RawOutput],
    slot: usize,
    cells: usize,
    channels: usize,
) -> Result<ArrayView2<'_, f32>> {
    let (shape, data) = &outputs[slot];
    let expected = [1, cells as i64, channels as i64];
    if shape.as_slice() != &expected[..] {
        bail!("output {} has shape {:?}, expected {:?}", slot, shape, expected);
    }
    Ok(ArrayView2::from_shape((cells, channels), data.as_slice())?)
}

fn decode_head(head: &StrideHead<'_>, score_threshold: f32, out: &mut Vec<Candidate>) {
    let stride = head.stride as f32;
    for cell in 0..head.cells_per_row * head.cells_per_row {
        let score = face_score(head.cls[[cell, 0]], head.obj[[cell, 0]]);
        if score < score_threshold {
            continue;
        }
        let col = (cell % head.cells_per_row) as f32;
        let row = (cell / head.cells_per_row) as f32;

        let cx = (col + head.bbox[[cell, 0]]) * stride;
        let cy = (row + head.bbox[[cell, 1]]) * stride;
        let w = head.bbox[[cell, 2]].exp() * stride;
        let h = head.bbox[[cell, 3]].exp() * stride;

        let mut landmarks = [0.0f32; 10];
        for point in 0..5 {
            landmarks[point * 2] = (col + head.kps[[cell, point * 2]]) * stride;
            landmarks[point * 2 + 1] = (row + head.kps[[cell, point * 2 + 1]]) * stride;
        }

        out.push(Candidate {
            bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
            score,
            landmarks,
        });
    }
}
