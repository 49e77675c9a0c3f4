//! The in-memory training pool.
//!
//! An example is one scanned window, stored as a size-normalized
//! integral patch so every candidate feature can be evaluated on it at
//! base geometry with only its weights rescaled for the window's rung.

use crate::errors::Result;
use crate::geometry::Rect;
use crate::image::{GrayImage, Integral, NormIntegral, RectSum};

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// One pooled example: a label, a base-size patch, and its boosting
/// state. `scale` and `rung` locate the source window on the scan
/// ladder; `index` is the window's position in the global score buffer.
#[derive(Clone, Debug)]
pub struct TrainExample {
    pub label: i8,
    pub patch: Integral,
    pub inv_norm: f32,
    pub scale: f32,
    pub rung: usize,
    pub index: usize,
    pub score: f32,
    pub weight: f64,
}

impl TrainExample {
    /// Cut a window out of a source image as a base-size patch.
    pub fn from_window(
        src: &NormIntegral,
        window: &Rect,
        rung: usize,
        scale: f32,
        base_width: usize,
        base_height: usize,
        label: i8,
        index: usize,
        score: f32,
    ) -> Self {
        assert!(label == 1 || label == -1, "label must be +1 or -1, got {label}");
        let patch = Integral::from_subsample(
            src,
            window.x_min as usize,
            window.y_min as usize,
            base_width,
            base_height,
            scale,
        );
        let inv_norm = src.inv_norm(window);
        Self {
            label,
            patch,
            inv_norm,
            scale,
            rung,
            index,
            score,
            weight: logit_weight(label, score),
        }
    }

    /// Evaluate a feature already weight-rescaled for this rung.
    #[inline(always)]
    pub fn eval(&self, feature: &impl Eval) -> f32 {
        feature.eval_on(&self.patch, self.inv_norm)
    }

    /// Recompute the boosting weight from the current score.
    pub fn reweight(&mut self) {
        self.weight = logit_weight(self.label, self.score);
    }
}

/// Something a pooled example can evaluate on its patch.
pub trait Eval {
    fn eval_on(&self, patch: &Integral, inv_norm: f32) -> f32;
}

impl Eval for crate::feature::RectFeature {
    #[inline(always)]
    fn eval_on(&self, patch: &Integral, inv_norm: f32) -> f32 {
        self.eval(patch, 0, 0, inv_norm)
    }
}

impl Eval for crate::feature::Feature {
    #[inline(always)]
    fn eval_on(&self, patch: &Integral, inv_norm: f32) -> f32 {
        self.eval(patch, 0, 0, inv_norm)
    }
}

/// The logistic weight `1 / (1 + exp(label * score))`: large when the
/// example is misclassified, vanishing once it is safely correct.
pub fn logit_weight(label: i8, score: f32) -> f64 {
    assert!(label == 1 || label == -1, "label must be +1 or -1, got {label}");
    1.0 / (1.0 + (f64::from(label) * f64::from(score)).exp())
}

/// Where training images come from. Decoding image files stays outside
/// the crate; the trainer only asks for pixel buffers by path.
pub trait ImageSource {
    fn load(&self, path: &Path) -> Result<GrayImage>;
}

/// An [`ImageSource`] backed by a map. Used in tests and by callers
/// generating images procedurally.
#[derive(Default)]
pub struct MemoryImageSource {
    images: HashMap<PathBuf, GrayImage>,
}

impl MemoryImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, image: GrayImage) {
        self.images.insert(path.into(), image);
    }
}

impl ImageSource for MemoryImageSource {
    fn load(&self, path: &Path) -> Result<GrayImage> {
        self.images
            .get(path)
            .cloned()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no such image: {}", path.display()),
                ).into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_follows_the_logistic_curve() {
        // score 0 weighs 1/2 regardless of label
        assert!((logit_weight(1, 0.0) - 0.5).abs() < 1e-12);
        assert!((logit_weight(-1, 0.0) - 0.5).abs() < 1e-12);
        // a confidently correct positive weighs almost nothing
        assert!(logit_weight(1, 10.0) < 1e-4);
        // a confidently wrong positive weighs almost one
        assert!(logit_weight(1, -10.0) > 0.9999);
        // symmetric for negatives
        let w_pos = logit_weight(1, 2.5);
        let w_neg = logit_weight(-1, -2.5);
        assert!((w_pos - w_neg).abs() < 1e-12);
    }

    #[test]
    #[should_panic(expected = "label must be")]
    fn zero_label_is_rejected() {
        logit_weight(0, 0.0);
    }

    #[test]
    fn example_patch_normalizes_window_size() {
        let mut img = GrayImage::filled(60, 60, 10);
        for y in 20..40 {
            for x in 20..40 {
                img.set(x, y, 200);
            }
        }
        let src = NormIntegral::from_image(&img);
        let window = Rect::new(4, 4, 48, 48);
        let ex = TrainExample::from_window(&src, &window, 2, 2.0, 24, 24, 1, 0, 0.0);
        assert_eq!(ex.patch.image_width(), 24);
        assert_eq!(ex.patch.image_height(), 24);
        assert_eq!(ex.inv_norm, src.inv_norm(&window));
        assert!((ex.weight - 0.5).abs() < 1e-12);
    }
}
