//! Integer rectangles, facial landmarks, and the matching predicates
//! used to compare detections against ground truth.

use serde::{Deserialize, Serialize};

/// A 2D point with float coordinates.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2f {
    pub x: f32,
    pub y: f32,
}

impl Point2f {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// How two rectangles overlap.
/// `Horizontal` means the x-ranges intersect but the y-ranges do not;
/// once even horizontal overlap fails against a left-edge-sorted list,
/// no rectangle further right can overlap either.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Overlap {
    None,
    Horizontal,
    Full,
}

/// An axis-aligned rectangle with integer coordinates.
/// `x_max`/`y_max` are exclusive for area purposes:
/// `area = (x_max - x_min) * (y_max - y_min)`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl Rect {
    /// Build a rectangle from integer origin and size.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        assert!(width >= 0 && height >= 0, "negative rectangle size");
        Self {
            x_min: x,
            y_min: y,
            x_max: x + width,
            y_max: y + height,
        }
    }

    /// Build the integer rectangle closest to a float origin and size.
    /// Width and height are rounded independently of the origin so every
    /// rectangle of a given nominal size has the same pixel size.
    pub fn from_float(col: f32, row: f32, width: f32, height: f32) -> Self {
        let x_min = (col + 0.5) as i32;
        let y_min = (row + 0.5) as i32;
        Self {
            x_min,
            y_min,
            x_max: (x_min as f32 + width + 0.5) as i32,
            y_max: (y_min as f32 + height + 0.5) as i32,
        }
    }

    pub fn width(&self) -> i32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> i32 {
        self.y_max - self.y_min
    }

    pub fn area(&self) -> f64 {
        (self.x_max - self.x_min) as f64 * (self.y_max - self.y_min) as f64
    }

    pub fn center(&self) -> Point2f {
        Point2f {
            x: (self.x_min + self.x_max) as f32 / 2.0,
            y: (self.y_min + self.y_max) as f32 / 2.0,
        }
    }

    pub fn contains(&self, pt: Point2f) -> bool {
        pt.x >= self.x_min as f32
            && pt.x <= self.x_max as f32
            && pt.y >= self.y_min as f32
            && pt.y <= self.y_max as f32
    }

    /// Shift both corners by `(dx, dy)`.
    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self {
            x_min: self.x_min + dx,
            y_min: self.y_min + dy,
            x_max: self.x_max + dx,
            y_max: self.y_max + dy,
        }
    }

    pub fn clamp_to(&mut self, x_min: i32, y_min: i32, x_max: i32, y_max: i32) {
        self.x_min = self.x_min.max(x_min);
        self.y_min = self.y_min.max(y_min);
        self.x_max = self.x_max.min(x_max);
        self.y_max = self.y_max.min(y_max);
    }

    /// Classify the overlap with `other` and return the intersection
    /// rectangle when the two fully overlap.
    pub fn intersect(&self, other: &Rect) -> (Overlap, Option<Rect>) {
        let x_min = self.x_min.max(other.x_min);
        let x_max = self.x_max.min(other.x_max);
        if x_min >= x_max {
            return (Overlap::None, None);
        }
        let y_min = self.y_min.max(other.y_min);
        let y_max = self.y_max.min(other.y_max);
        if y_min >= y_max {
            return (Overlap::Horizontal, None);
        }
        let is = Rect { x_min, y_min, x_max, y_max };
        (Overlap::Full, Some(is))
    }

    /// Tight match against a ground-truth rectangle: center within half a
    /// scan step (plus one pixel) and size within half a scale step.
    /// Used when deciding which scanned windows cover a labeled object.
    pub fn matches_tight(
        &self,
        truth: &Rect,
        step_size: f32,
        step_scale: f32,
    ) -> bool {
        let c1 = self.center();
        let c2 = truth.center();
        let (w1, h1) = (self.width() as f32, self.height() as f32);
        let (w2, h2) = (truth.width() as f32, truth.height() as f32);
        let step = step_size / 2.0;
        let scale = step_scale.sqrt();
        (c2.x - c1.x).abs() <= w1 * step + 1.0
            && (c2.y - c1.y).abs() <= h1 * step + 1.0
            && w1 <= w2 * scale + 1.0
            && w1 >= w2 / scale - 1.0
            && h1 <= h2 * scale + 1.0
            && h1 >= h2 / scale - 1.0
    }

    /// Loose match used when scoring merged detections against ground
    /// truth: centers within half the detection size, sizes within 1.5x.
    pub fn matches_detection(&self, truth: &Rect) -> bool {
        let c1 = self.center();
        let c2 = truth.center();
        let (w1, h1) = (self.width() as f32, self.height() as f32);
        let (w2, h2) = (truth.width() as f32, truth.height() as f32);
        (c2.x - c1.x).abs() < w1 * 0.5
            && (c2.y - c1.y).abs() < h1 * 0.5
            && w1 < w2 * 1.5
            && w1 > w2 / 1.5
            && h1 < h2 * 1.5
            && h1 > h2 / 1.5
    }
}

/// A detection window with its cumulative cascade score.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredRect {
    pub rect: Rect,
    pub score: f32,
}

/// The five named facial landmarks a labeled object carries.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FacePoints {
    pub leye: Point2f,
    pub reye: Point2f,
    pub nose: Point2f,
    pub lmouth: Point2f,
    pub rmouth: Point2f,
}

impl FacePoints {
    /// Derive the ground-truth bounding box from the landmarks.
    ///
    /// Center is the landmark centroid (x over eyes and mouth corners,
    /// y over all five points); half-extent per axis is 2.25 standard
    /// deviations of the four eye/mouth points; the final box is a
    /// square of the larger dimension.
    pub fn bounding_box(&self) -> Rect {
        let xs = [self.leye.x, self.reye.x, self.lmouth.x, self.rmouth.x];
        let ys = [self.leye.y, self.reye.y, self.lmouth.y, self.rmouth.y];

        let x_mean = xs.iter().sum::<f32>() / 4.0;
        let y_mean = (ys.iter().sum::<f32>() + self.nose.y) / 5.0;

        let x_var = xs.iter().map(|x| (x - x_mean) * (x - x_mean)).sum::<f32>() / 4.0;
        let y_var = ys.iter().map(|y| (y - y_mean) * (y - y_mean)).sum::<f32>() / 4.0;

        let w = 2.25 * x_var.sqrt();
        let h = 2.25 * y_var.sqrt();
        let side = 2.0 * w.max(h);
        Rect::from_float(x_mean - side / 2.0, y_mean - side / 2.0, side, side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_classifies_overlap() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        let (ov, is) = a.intersect(&b);
        assert_eq!(ov, Overlap::Full);
        assert_eq!(is.unwrap(), Rect::new(5, 5, 5, 5));

        // x-ranges meet, y-ranges do not
        let c = Rect::new(5, 20, 10, 10);
        let (ov, is) = a.intersect(&c);
        assert_eq!(ov, Overlap::Horizontal);
        assert!(is.is_none());

        let d = Rect::new(20, 0, 5, 5);
        assert_eq!(a.intersect(&d).0, Overlap::None);
    }

    #[test]
    fn float_reset_keeps_size_stable() {
        // same nominal size must give the same pixel size at any origin
        let a = Rect::from_float(0.3, 0.3, 24.6, 24.6);
        let b = Rect::from_float(7.9, 3.1, 24.6, 24.6);
        assert_eq!(a.width(), b.width());
        assert_eq!(a.height(), b.height());
    }

    #[test]
    fn detection_match_is_translation_tolerant() {
        let truth = Rect::new(100, 100, 40, 40);
        let near = Rect::new(110, 108, 40, 40);
        let far = Rect::new(160, 100, 40, 40);
        assert!(near.matches_detection(&truth));
        assert!(!far.matches_detection(&truth));
    }

    #[test]
    fn bounding_box_is_square_around_centroid() {
        let pts = FacePoints {
            leye: Point2f::new(40.0, 40.0),
            reye: Point2f::new(60.0, 40.0),
            nose: Point2f::new(50.0, 50.0),
            lmouth: Point2f::new(42.0, 60.0),
            rmouth: Point2f::new(58.0, 60.0),
        };
        let rc = pts.bounding_box();
        assert_eq!(rc.width(), rc.height(), "box must be square");
        let c = rc.center();
        assert!((c.x - 50.0).abs() <= 1.0, "expected center x near 50, got {}", c.x);
        assert!((c.y - 50.0).abs() <= 1.5, "expected center y near 50, got {}", c.y);
    }
}
