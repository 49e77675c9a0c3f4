//! The multiscale sliding-window detector.

use crate::cascade::Cascade;
use crate::constants::{
    DEFAULT_MAX_RAW_DET,
    DEFAULT_STEP_SCALE,
    DEFAULT_STEP_SIZE,
    MAX_NUM_SCALE,
};
use crate::geometry::{Rect, ScoredRect};
use crate::image::NormIntegral;
use super::merge::merge_rects;

/// One rung of the precomputed scale ladder.
struct ScaledCascade {
    cascade: Cascade,
    width: i32,
    height: i32,
    step_x: i32,
    step_y: i32,
}

/// Raw and merged detections of one image.
#[derive(Clone, Debug, Default)]
pub struct Detections {
    pub raw: Vec<ScoredRect>,
    pub merged: Vec<ScoredRect>,
}

/// Scans an image at every scale of a geometric ladder, classifying
/// each window with a cascade rescaled once per rung.
///
/// Scanning is deterministic: scales ascend, windows go row-major
/// within a scale, and merged results keep the max score of each group.
pub struct Detector {
    scales: Vec<ScaledCascade>,
    base: Cascade,
    step_size: f32,
    step_scale: f32,
    max_raw: usize,
    reject_early: bool,
    final_score_th: f32,
}

impl Detector {
    /// Build a detector around a trained cascade with default scan
    /// parameters.
    pub fn init(cascade: Cascade) -> Self {
        let final_score_th = cascade.final_score_th;
        let mut detector = Self {
            scales: Vec::new(),
            base: cascade,
            step_size: DEFAULT_STEP_SIZE,
            step_scale: DEFAULT_STEP_SCALE,
            max_raw: DEFAULT_MAX_RAW_DET,
            reject_early: true,
            final_score_th,
        };
        detector.rebuild_scales();
        detector
    }

    /// Window step as a fraction of the window size.
    #[inline(always)]
    pub fn step_size(mut self, step_size: f32) -> Self {
        assert!(step_size > 0.0, "step size must be positive");
        self.step_size = step_size;
        self.rebuild_scales();
        self
    }

    /// Geometric ratio between consecutive scan scales.
    #[inline(always)]
    pub fn step_scale(mut self, step_scale: f32) -> Self {
        assert!(step_scale > 1.0, "step scale must exceed 1");
        self.step_scale = step_scale;
        self.rebuild_scales();
        self
    }

    /// Cap on raw detections per image.
    #[inline(always)]
    pub fn max_raw(mut self, max_raw: usize) -> Self {
        self.max_raw = max_raw;
        self
    }

    /// Disable per-stage early rejection (diagnostics; every window then
    /// runs the full cascade).
    #[inline(always)]
    pub fn reject_early(mut self, reject: bool) -> Self {
        self.reject_early = reject;
        self
    }

    /// Override the cascade's global acceptance threshold.
    #[inline(always)]
    pub fn final_score_th(mut self, th: f32) -> Self {
        self.final_score_th = th;
        self
    }

    pub fn n_scales(&self) -> usize {
        self.scales.len()
    }

    pub fn base_cascade(&self) -> &Cascade {
        &self.base
    }

    fn rebuild_scales(&mut self) {
        self.scales.clear();
        let mut scale = 1.0f32;
        for _ in 0..MAX_NUM_SCALE {
            let cascade = self.base.rescaled(scale);
            let width = cascade.base_width as i32;
            let height = cascade.base_height as i32;
            self.scales.push(ScaledCascade {
                cascade,
                width,
                height,
                step_x: ((width as f32 * self.step_size + 0.5) as i32).max(1),
                step_y: ((height as f32 * self.step_size + 0.5) as i32).max(1),
            });
            scale *= self.step_scale;
        }
    }

    /// Scan the whole scale ladder.
    pub fn detect(&self, image: &NormIntegral) -> Detections {
        self.detect_in_scales(image, 0, MAX_NUM_SCALE - 1)
    }

    /// Scan scales `min_scale..=max_scale` (clamped to the ladder).
    /// Scales whose window no longer fits the image are skipped.
    pub fn detect_in_scales(
        &self,
        image: &NormIntegral,
        min_scale: usize,
        max_scale: usize,
    ) -> Detections {
        let img_w = image.image_width() as i32;
        let img_h = image.image_height() as i32;

        let mut raw: Vec<ScoredRect> = Vec::new();
        'scales: for rung in self.scales.iter()
            .take(max_scale.saturating_add(1).min(self.scales.len()))
            .skip(min_scale)
        {
            if rung.width > img_w || rung.height > img_h {
                continue;
            }
            let mut y = 0;
            while y + rung.height <= img_h {
                let mut x = 0;
                while x + rung.width <= img_w {
                    let window = Rect {
                        x_min: x,
                        y_min: y,
                        x_max: x + rung.width,
                        y_max: y + rung.height,
                    };
                    if let Some(score) =
                        rung.cascade.classify(image, &window, self.reject_early)
                    {
                        if score >= self.final_score_th {
                            raw.push(ScoredRect { rect: window, score });
                            if raw.len() >= self.max_raw {
                                break 'scales;
                            }
                        }
                    }
                    x += rung.step_x;
                }
                y += rung.step_y;
            }
        }

        let rects: Vec<Rect> = raw.iter().map(|sr| sr.rect).collect();
        let (merged_rects, src_to_dst) = merge_rects(&rects);
        let mut merged: Vec<ScoredRect> = merged_rects.into_iter()
            .map(|rect| ScoredRect { rect, score: f32::MIN })
            .collect();
        for (sr, &dst) in raw.iter().zip(&src_to_dst) {
            if sr.score > merged[dst].score {
                merged[dst].score = sr.score;
            }
        }

        Detections { raw, merged }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::Stage;
    use crate::feature::Feature;
    use crate::image::GrayImage;

    /// A one-stage cascade whose threshold table returns `delta` for
    /// every feature value.
    fn constant_cascade(delta: f32, final_th: f32) -> Cascade {
        let mut cascade = Cascade::new(8, 8, 1);
        cascade.stages.push(Stage::new(
            Feature::Norm,
            vec![0.0],
            vec![delta, delta],
            f32::MIN,
        ));
        cascade.final_score_th = final_th;
        cascade
    }

    #[test]
    fn accept_depends_only_on_constant_versus_threshold() {
        let image = NormIntegral::from_image(&GrayImage::filled(32, 32, 77));

        let accepting = Detector::init(constant_cascade(1.0, 0.5));
        let det = accepting.detect(&image);
        assert!(
            !det.raw.is_empty(),
            "constant delta above the threshold must accept every window",
        );
        assert!(det.raw.iter().all(|sr| sr.score == 1.0));

        let rejecting = Detector::init(constant_cascade(1.0, 2.0));
        let det = rejecting.detect(&image);
        assert!(
            det.raw.is_empty(),
            "constant delta below the threshold must reject every window",
        );
    }

    #[test]
    fn raw_cap_short_circuits_the_scan() {
        let image = NormIntegral::from_image(&GrayImage::filled(64, 64, 10));
        let detector = Detector::init(constant_cascade(1.0, 0.0)).max_raw(5);
        let det = detector.detect(&image);
        assert_eq!(det.raw.len(), 5);
    }

    #[test]
    fn windows_never_escape_the_image() {
        let image = NormIntegral::from_image(&GrayImage::filled(40, 30, 10));
        let detector = Detector::init(constant_cascade(1.0, 0.0)).max_raw(100_000);
        let det = detector.detect(&image);
        assert!(!det.raw.is_empty());
        for sr in &det.raw {
            assert!(sr.rect.x_max <= 40 && sr.rect.y_max <= 30);
            assert!(sr.rect.x_min >= 0 && sr.rect.y_min >= 0);
        }
    }

    #[test]
    fn merged_score_is_the_group_max() {
        let image = NormIntegral::from_image(&GrayImage::filled(16, 16, 10));
        let detector = Detector::init(constant_cascade(1.0, 0.0));
        let det = detector.detect(&image);
        assert!(!det.merged.is_empty());
        let max_raw = det.raw.iter().map(|sr| sr.score).fold(f32::MIN, f32::max);
        let max_merged = det.merged.iter().map(|sr| sr.score).fold(f32::MIN, f32::max);
        assert_eq!(max_raw, max_merged);
    }
}
