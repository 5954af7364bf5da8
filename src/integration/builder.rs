//! Builder for `Detection` values from the box layouts detectors emit.

use crate::tracker::{Detection, Rect};

#[derive(Debug, Clone, Copy, Default)]
pub struct DetectionBuilder {
    bbox: Rect,
    score: f32,
}

impl DetectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Corners: (x1, y1, x2, y2).
    pub fn tlbr(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.bbox = Rect::from_tlbr(x1, y1, x2, y2);
        self
    }

    /// Center and size, the layout YOLO-style heads produce.
    pub fn xywh(mut self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.bbox = Rect::from_xywh(cx, cy, w, h);
        self
    }

    /// Left, top, width, height, the MOTChallenge layout.
    pub fn tlwh(mut self, left: f32, top: f32, w: f32, h: f32) -> Self {
        self.bbox = Rect::new(left, top, w, h);
        self
    }

    pub fn score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    pub fn build(self) -> Detection {
        Detection::from_rect(self.bbox, self.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts_agree() {
        let a = DetectionBuilder::new().tlbr(10.0, 20.0, 50.0, 80.0).score(0.95).build();
        let b = DetectionBuilder::new().xywh(30.0, 50.0, 40.0, 60.0).score(0.95).build();
        let c = DetectionBuilder::new().tlwh(10.0, 20.0, 40.0, 60.0).score(0.95).build();

        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.score, 0.95);
    }
}
