/// A face found by the detector, in source image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// x0, y0, x1, y1
    pub bbox: [f32; 4],
    pub score: f32,
    /// 5 points: x1,y1,x2,y2,...,x5,y5 starting with the two eyes
    pub landmarks: [f32; 10],
}

impl Detection {
    pub fn area(&self) -> f32 {
        let [x0, y0, x1, y1] = self.bbox;
        (x1 - x0).max(0.0) * (y1 - y0).max(0.0)
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        let x0 = self.bbox[0].max(other.bbox[0]);
        let y0 = self.bbox[1].max(other.bbox[1]);
        let x1 = self.bbox[2].min(other.bbox[2]);
        let y1 = self.bbox[3].min(other.bbox[3]);
        if x1 <= x0 || y1 <= y0 {
            return 0.0;
        }
        let inter = (x1 - x0) * (y1 - y0);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// One face extracted from an image: where it is, how sure the detector
/// was, and its recognition embedding. `index` is the position in the
/// analyzer's output order, starting at 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    pub index: usize,
    pub embedding: Vec<f32>,
    pub confidence: f32,
    /// x0, y0, x1, y1
    pub bounding_box: [f32; 4],
}

/// Greedy non-maximum suppression. Survivors come back ordered by
/// descending score; ties keep their input order.
pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        if keep.iter().all(|k| k.iou(&det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}
