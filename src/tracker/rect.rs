/// Axis-aligned bounding box stored as top-left corner plus size (TLWH).
///
/// Conversions cover the formats that flow through the labeler:
/// - TLBR: detector output and MOT files after conversion
/// - XYWH: center-based boxes handed to the review layer
/// - XYAH: Kalman filter measurement space
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Integer pixel window inside a frame: `(x, y, width, height)`.
pub type PixelBounds = (u32, u32, u32, u32);

impl Rect {
    #[inline]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn from_tlbr(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// Build from a center point and size.
    #[inline]
    pub fn from_xywh(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    #[inline]
    pub fn from_xyah(cx: f32, cy: f32, aspect_ratio: f32, height: f32) -> Self {
        Self::from_xywh(cx, cy, aspect_ratio * height, height)
    }

    #[inline]
    pub fn to_tlbr(&self) -> [f32; 4] {
        [self.x, self.y, self.right(), self.bottom()]
    }

    #[inline]
    pub fn to_xywh(&self) -> [f32; 4] {
        let (cx, cy) = self.center();
        [cx, cy, self.width, self.height]
    }

    #[inline]
    pub fn to_xyah(&self) -> [f32; 4] {
        let (cx, cy) = self.center();
        let aspect_ratio = if self.height > 0.0 {
            self.width / self.height
        } else {
            0.0
        };
        [cx, cy, aspect_ratio, self.height]
    }

    #[inline]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over Union with another box.
    pub fn iou(&self, other: &Rect) -> f32 {
        let inter_w = (self.right().min(other.right()) - self.x.max(other.x)).max(0.0);
        let inter_h = (self.bottom().min(other.bottom()) - self.y.max(other.y)).max(0.0);
        let inter_area = inter_w * inter_h;
        let union_area = self.area() + other.area() - inter_area;

        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }

    /// Clip the box to a `frame_width` x `frame_height` image and round it
    /// outward-truncated to whole pixels.
    ///
    /// Returns `None` when nothing of the box lies inside the frame.
    pub fn pixel_bounds(&self, frame_width: u32, frame_height: u32) -> Option<PixelBounds> {
        let x1 = self.x.max(0.0).floor();
        let y1 = self.y.max(0.0).floor();
        let x2 = self.right().min(frame_width as f32).floor();
        let y2 = self.bottom().min(frame_height as f32).floor();

        if !(x2 > x1 && y2 > y1) {
            return None;
        }
        Some((x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_round_trip() {
        let rect = Rect::from_xywh(25.0, 40.0, 30.0, 40.0);
        assert_eq!(rect, Rect::new(10.0, 20.0, 30.0, 40.0));
        assert_eq!(rect.to_xywh(), [25.0, 40.0, 30.0, 40.0]);
        assert_eq!(rect.to_tlbr(), [10.0, 20.0, 40.0, 60.0]);
    }

    #[test]
    fn test_xyah() {
        let rect = Rect::new(10.0, 20.0, 30.0, 40.0);
        let xyah = rect.to_xyah();
        assert!((xyah[2] - 0.75).abs() < 1e-6);

        let back = Rect::from_xyah(xyah[0], xyah[1], xyah[2], xyah[3]);
        assert!((back.x - 10.0).abs() < 1e-5);
        assert!((back.width - 30.0).abs() < 1e-5);
    }

    #[test]
    fn test_iou() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert!((a.iou(&b) - 25.0 / 175.0).abs() < 1e-6);
        assert_eq!(a.iou(&Rect::new(20.0, 20.0, 10.0, 10.0)), 0.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pixel_bounds_clamps_to_frame() {
        let rect = Rect::new(-5.0, 10.5, 20.0, 100.0);
        assert_eq!(rect.pixel_bounds(64, 48), Some((0, 10, 15, 38)));
    }

    #[test]
    fn test_pixel_bounds_outside_frame() {
        let rect = Rect::new(100.0, 100.0, 10.0, 10.0);
        assert_eq!(rect.pixel_bounds(64, 48), None);
        assert_eq!(Rect::new(3.0, 3.0, 0.0, 5.0).pixel_bounds(64, 48), None);
    }
}
