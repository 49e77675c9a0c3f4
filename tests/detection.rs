use cascadet::prelude::*;

/// Tests for the feature/detector pipeline on synthetic patterns.
#[cfg(test)]
pub mod detection_tests {
    use super::*;

    /// A flat image with a left-bright/right-dark square patch.
    fn patch_image(
        width: usize,
        height: usize,
        patches: &[(usize, usize, usize)],
    ) -> GrayImage {
        let mut img = GrayImage::filled(width, height, 110);
        for &(px, py, side) in patches {
            for y in py..py + side {
                for x in px..px + side {
                    let v = if x < px + side / 2 { 200 } else { 20 };
                    img.set(x, y, v);
                }
            }
        }
        img
    }

    fn contrast_feature() -> RectFeature {
        RectFeature::new(vec![
            cascadet::feature::WeightedRect {
                weight: 1.0,
                rect: Rect::new(0, 0, 12, 24),
            },
            cascadet::feature::WeightedRect {
                weight: -1.0,
                rect: Rect::new(12, 0, 12, 24),
            },
        ])
    }

    #[test]
    fn contrast_feature_sign_follows_the_pattern() {
        let feature = contrast_feature();

        let bright_left = patch_image(24, 24, &[(0, 0, 24)]);
        let ii = NormIntegral::from_image(&bright_left);
        let window = Rect::new(0, 0, 24, 24);
        let value = feature.eval(&ii, 0, 0, ii.inv_norm(&window));
        assert!(value > 0.0, "bright-left must score positive, got {value}");

        // mirror the pattern: the sign must flip
        let mut bright_right = GrayImage::filled(24, 24, 0);
        for y in 0..24 {
            for x in 0..24 {
                bright_right.set(x, y, bright_left.get(23 - x, y));
            }
        }
        let ii = NormIntegral::from_image(&bright_right);
        let mirrored = feature.eval(&ii, 0, 0, ii.inv_norm(&window));
        assert!(mirrored < 0.0, "bright-right must score negative, got {mirrored}");
        assert!(
            (value + mirrored).abs() < 1e-3 * value.abs(),
            "mirroring must negate the value, got {value} and {mirrored}",
        );
    }

    #[test]
    fn rescaled_feature_is_normalized_across_scales() {
        // the same two-level pattern at 24px and 48px: area-corrected
        // weights and the per-pixel norm must cancel the size change
        let feature = contrast_feature();

        let small = patch_image(24, 24, &[(0, 0, 24)]);
        let ii = NormIntegral::from_image(&small);
        let w = Rect::new(0, 0, 24, 24);
        let value_small = feature.eval(&ii, 0, 0, ii.inv_norm(&w));

        let big = patch_image(48, 48, &[(0, 0, 48)]);
        let ii = NormIntegral::from_image(&big);
        let w = Rect::new(0, 0, 48, 48);
        let value_big = feature.rescaled(2.0).eval(&ii, 0, 0, ii.inv_norm(&w));

        let rel = (value_small - value_big).abs() / value_small.abs();
        assert!(
            rel < 1e-3,
            "expected scale-invariant values, got {value_small} vs {value_big}",
        );
    }

    #[test]
    fn detector_finds_the_pattern_at_two_scales() {
        let mut cascade = Cascade::new(24, 24, 1);
        cascade.stages.push(Stage::new(
            Feature::Rects(contrast_feature()),
            vec![100.0],
            vec![1.0, -1.0],
            f32::MIN,
        ));
        cascade.final_score_th = 0.5;

        // one base-size patch and one at roughly double scale
        let truths = [Rect::new(8, 8, 24, 24), Rect::new(40, 40, 48, 48)];
        let img = patch_image(96, 96, &[(8, 8, 24), (40, 40, 48)]);
        let integral = NormIntegral::from_image(&img);

        let detector = Detector::init(cascade).max_raw(100_000);
        let det = detector.detect(&integral);

        assert!(!det.raw.is_empty(), "the pattern must be detected");
        for sr in &det.raw {
            assert_eq!(sr.score, 1.0, "a single constant-delta stage scores 1.0");
        }

        // the perfectly aligned window at each scale is on the scan grid
        // and must fire: base size 24 steps by 2, rung-3 size 47 by 5
        for aligned in [Rect::new(8, 8, 24, 24), Rect::new(40, 40, 47, 47)] {
            assert!(
                det.raw.iter().any(|sr| sr.rect == aligned),
                "no raw detection at {aligned:?}",
            );
        }

        // a window that misses both patches sees only flat background,
        // where the feature value is exactly zero
        let overlaps = |a: &Rect, b: &Rect| {
            a.x_min < b.x_max && b.x_min < a.x_max
                && a.y_min < b.y_max && b.y_min < a.y_max
        };
        for sr in &det.raw {
            assert!(
                truths.iter().any(|t| overlaps(&sr.rect, t)),
                "a flat region fired at {:?}",
                sr.rect,
            );
        }

        assert!(det.merged.len() >= 2, "two far-apart patches cannot merge");
        for truth in &truths {
            let c = truth.center();
            assert!(
                det.merged.iter().any(|sr| {
                    let m = sr.rect.center();
                    (m.x - c.x).abs() <= 16.0 && (m.y - c.y).abs() <= 16.0
                }),
                "no merged detection near {truth:?}",
            );
        }
    }
}
