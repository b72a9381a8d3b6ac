//! Box geometry in inclusive pixel coordinates.

use crate::common::*;

/// A box in `(x1, y1, x2, y2)` pixel coordinates.
///
/// Both corners are inclusive, so a box with `x1 == x2` is one pixel wide.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoxCoords {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoxCoords {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1 + 1.0
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1 + 1.0
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> [f64; 2] {
        [
            self.x1 + 0.5 * self.width(),
            self.y1 + 0.5 * self.height(),
        ]
    }

    /// Computes the intersection over union with another box.
    pub fn iou(&self, other: &Self) -> f64 {
        let iw = self.x2.min(other.x2) - self.x1.max(other.x1) + 1.0;
        let ih = self.y2.min(other.y2) - self.y1.max(other.y1) + 1.0;

        if iw <= 0.0 || ih <= 0.0 {
            return 0.0;
        }

        let inter = iw * ih;
        let union = self.area() + other.area() - inter;
        inter / union
    }

    /// Mirrors the box along the vertical axis of an image with given width.
    pub fn flip_horizontal(&self, image_width: f64) -> Self {
        Self {
            x1: image_width - self.x2 - 1.0,
            y1: self.y1,
            x2: image_width - self.x1 - 1.0,
            y2: self.y2,
        }
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

impl From<[f64; 4]> for BoxCoords {
    fn from([x1, y1, x2, y2]: [f64; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoxCoords> for [f64; 4] {
    fn from(from: BoxCoords) -> Self {
        from.to_array()
    }
}

/// Encodes the regression deltas `(dx, dy, dw, dh)` that move `ex` onto `gt`.
pub fn bbox_transform(ex: &BoxCoords, gt: &BoxCoords) -> [f64; 4] {
    let [ex_cx, ex_cy] = ex.center();
    let [gt_cx, gt_cy] = gt.center();
    let (ex_w, ex_h) = (ex.width(), ex.height());
    let (gt_w, gt_h) = (gt.width(), gt.height());

    [
        (gt_cx - ex_cx) / ex_w,
        (gt_cy - ex_cy) / ex_h,
        (gt_w / ex_w).ln(),
        (gt_h / ex_h).ln(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn inclusive_size() {
        let bbox = BoxCoords::new(0.0, 0.0, 9.0, 4.0);
        assert_abs_diff_eq!(bbox.width(), 10.0);
        assert_abs_diff_eq!(bbox.height(), 5.0);
        assert_abs_diff_eq!(bbox.area(), 50.0);
    }

    #[test]
    fn iou_of_partial_overlap() {
        let lhs = BoxCoords::new(0.0, 0.0, 9.0, 9.0);
        let rhs = BoxCoords::new(5.0, 0.0, 14.0, 9.0);
        assert_abs_diff_eq!(lhs.iou(&rhs), 50.0 / 150.0);
        assert_abs_diff_eq!(lhs.iou(&lhs), 1.0);

        let far = BoxCoords::new(20.0, 20.0, 30.0, 30.0);
        assert_abs_diff_eq!(lhs.iou(&far), 0.0);
    }

    #[test]
    fn transform_identity_and_shift() {
        let ex = BoxCoords::new(10.0, 10.0, 19.0, 29.0);
        let [dx, dy, dw, dh] = bbox_transform(&ex, &ex);
        assert_abs_diff_eq!(dx, 0.0);
        assert_abs_diff_eq!(dy, 0.0);
        assert_abs_diff_eq!(dw, 0.0);
        assert_abs_diff_eq!(dh, 0.0);

        let gt = BoxCoords::new(15.0, 10.0, 34.0, 29.0);
        let [dx, dy, dw, dh] = bbox_transform(&ex, &gt);
        assert_abs_diff_eq!(dx, 1.0);
        assert_abs_diff_eq!(dy, 0.0);
        assert_abs_diff_eq!(dw, 2f64.ln());
        assert_abs_diff_eq!(dh, 0.0);
    }

    #[test]
    fn flip_keeps_size() {
        let bbox = BoxCoords::new(2.0, 3.0, 11.0, 8.0);
        let flipped = bbox.flip_horizontal(100.0);
        assert_eq!(flipped, BoxCoords::new(88.0, 3.0, 97.0, 8.0));
        assert_abs_diff_eq!(flipped.width(), bbox.width());
        assert_eq!(flipped.flip_horizontal(100.0), bbox);
    }
}
