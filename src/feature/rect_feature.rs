//! The rectangle feature itself: a short list of signed, weighted
//! sub-rectangles whose combined integral-image sum, scaled by the
//! window normalization factor, is the feature value.

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;
use crate::image::RectSum;

/// One signed sub-rectangle of a feature template.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedRect {
    pub weight: f32,
    pub rect: Rect,
}

/// An immutable feature template. Coordinates are offsets relative to
/// the top-left corner of the detection window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RectFeature {
    pub rects: Vec<WeightedRect>,
}

impl RectFeature {
    pub fn new(rects: Vec<WeightedRect>) -> Self {
        assert!(!rects.is_empty(), "a rectangle feature needs at least one rect");
        Self { rects }
    }

    /// Two-rectangle helper used all over the bank enumeration.
    pub(crate) fn pair(
        w0: f32,
        r0: Rect,
        w1: f32,
        r1: Rect,
    ) -> Self {
        Self {
            rects: vec![
                WeightedRect { weight: w0, rect: r0 },
                WeightedRect { weight: w1, rect: r1 },
            ],
        }
    }

    /// Feature value at window origin `(x, y)`:
    /// `inv_norm * sum_i weight_i * rect_sum(rect_i + (x, y))`.
    #[inline(always)]
    pub fn eval<I: RectSum>(&self, image: &I, x: i32, y: i32, inv_norm: f32) -> f32 {
        let mut value = 0.0f32;
        for wr in &self.rects {
            let shifted = wr.rect.translated(x, y);
            value += wr.weight * image.rect_sum(&shifted) as f32;
        }
        value * inv_norm
    }

    /// Clone this feature at `scale`, preserving the integrated
    /// response: coordinates are scaled and rounded, and each weight is
    /// corrected by `old_area / new_area`.
    pub fn rescaled(&self, scale: f32) -> Self {
        let rects = self.rects.iter()
            .map(|wr| {
                let r = &wr.rect;
                let old_area = (r.x_max - r.x_min) * (r.y_max - r.y_min);
                let scaled = Rect {
                    x_min: (scale * r.x_min as f32 + 0.5) as i32,
                    y_min: (scale * r.y_min as f32 + 0.5) as i32,
                    x_max: (scale * r.x_max as f32 + 0.5) as i32,
                    y_max: (scale * r.y_max as f32 + 0.5) as i32,
                };
                let new_area = (scaled.x_max - scaled.x_min)
                    * (scaled.y_max - scaled.y_min);
                assert!(new_area > 0, "feature rect collapsed at scale {scale}");
                WeightedRect {
                    weight: wr.weight * old_area as f32 / new_area as f32,
                    rect: scaled,
                }
            })
            .collect();
        Self { rects }
    }

    /// Weight-only variant of [`rescaled`](Self::rescaled) for windows
    /// that were subsampled back to base size: geometry stays put, but
    /// weights absorb the rounding a full rescale would have introduced,
    /// keeping values comparable across scales.
    pub fn rescaled_weights_only(&self, scale: f32) -> Self {
        let rects = self.rects.iter()
            .map(|wr| {
                let r = &wr.rect;
                let old_area = (r.x_max - r.x_min) * (r.y_max - r.y_min);
                let x_min = (scale * r.x_min as f32 + 0.5) as i32;
                let y_min = (scale * r.y_min as f32 + 0.5) as i32;
                let x_max = (scale * r.x_max as f32 + 0.5) as i32;
                let y_max = (scale * r.y_max as f32 + 0.5) as i32;
                let new_area = (x_max - x_min) * (y_max - y_min);
                assert!(new_area > 0, "feature rect collapsed at scale {scale}");
                WeightedRect {
                    weight: wr.weight * old_area as f32 / new_area as f32,
                    rect: wr.rect,
                }
            })
            .collect();
        Self { rects }
    }
}

/// A cascade stage's feature: either a rectangle template or the
/// normalization factor itself (the "norm" pseudo-feature trained in
/// round zero, which separates on raw window contrast).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Feature {
    Rects(RectFeature),
    Norm,
}

impl Feature {
    #[inline(always)]
    pub fn eval<I: RectSum>(&self, image: &I, x: i32, y: i32, inv_norm: f32) -> f32 {
        match self {
            Self::Rects(f) => f.eval(image, x, y, inv_norm),
            Self::Norm => inv_norm,
        }
    }

    pub fn rescaled(&self, scale: f32) -> Self {
        match self {
            Self::Rects(f) => Self::Rects(f.rescaled(scale)),
            Self::Norm => Self::Norm,
        }
    }
}
