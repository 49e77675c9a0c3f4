//! ROC evaluation over a labeled image set.
//!
//! The detector runs once per image at the lowest candidate threshold
//! with an effectively unlimited raw cap; every candidate threshold is
//! then evaluated by filtering and re-merging the same raw detections.

use colored::Colorize;
use fixedbitset::FixedBitSet;
use plotters::prelude::*;

use crate::constants::MAX_MERGE_RECTS;
use crate::detect::{merge_rects, Detector};
use crate::errors::Result;
use crate::geometry::{Rect, ScoredRect};
use crate::image::NormIntegral;
use crate::labels::ImageInfo;
use crate::train::ImageSource;

use std::io;
use std::path::Path;

const EVAL_MAX_RAW: usize = 5_000_000;

/// One point of the ROC sweep.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RocPoint {
    pub threshold: f32,
    pub false_positives: u64,
    pub detection_rate: f64,
}

/// Filter one image's raw detections at each remaining threshold,
/// merge, and match against ground truth. Returns `false` for a
/// threshold whose filtered set exceeds the merge cap; the caller then
/// drops it (and everything below it) from the sweep.
fn tally_image(
    raw: &[ScoredRect],
    boxes: &[Rect],
    thresholds: &[f32],
    idx_start: &mut usize,
    obj_offset: usize,
    n_objects: usize,
    detected: &mut FixedBitSet,
    false_positives: &mut [u64],
) {
    for idx in *idx_start..thresholds.len() {
        let th = thresholds[idx];
        let rects: Vec<Rect> = raw.iter()
            .filter(|sr| sr.score >= th)
            .map(|sr| sr.rect)
            .collect();
        if rects.len() > MAX_MERGE_RECTS {
            // a threshold this permissive is useless on any image
            *idx_start = idx + 1;
            continue;
        }
        let (merged, _) = merge_rects(&rects);
        for rect in &merged {
            let mut true_pos = false;
            for (j, truth) in boxes.iter().enumerate() {
                if rect.matches_detection(truth) {
                    detected.insert(idx * n_objects + obj_offset + j);
                    true_pos = true;
                    break;
                }
            }
            if !true_pos {
                false_positives[idx] += 1;
            }
        }
    }
}

/// Sweep ascending `thresholds` over the labeled set and return one ROC
/// point per surviving threshold.
pub fn evaluate_roc(
    detector: Detector,
    infos: &[ImageInfo],
    source: &impl ImageSource,
    thresholds: &[f32],
) -> Result<Vec<RocPoint>> {
    assert!(!thresholds.is_empty(), "empty threshold sweep");
    for pair in thresholds.windows(2) {
        assert!(pair[0] < pair[1], "thresholds must ascend");
    }
    let detector = detector
        .final_score_th(thresholds[0])
        .max_raw(EVAL_MAX_RAW);

    let n_objects: usize = infos.iter().map(|i| i.boxes.len()).sum();
    let mut detected = FixedBitSet::with_capacity(thresholds.len() * n_objects);
    let mut false_positives = vec![0u64; thresholds.len()];
    let mut idx_start = 0usize;

    let mut obj_offset = 0usize;
    for (num, info) in infos.iter().enumerate() {
        let gray = source.load(&info.path)?;
        let integral = NormIntegral::from_image(&gray);
        let det = detector.detect(&integral);
        tally_image(
            &det.raw,
            &info.boxes,
            thresholds,
            &mut idx_start,
            obj_offset,
            n_objects,
            &mut detected,
            &mut false_positives,
        );
        obj_offset += info.boxes.len();
        if (num + 1) % 5 == 0 {
            println!(
                "{} {} images done, minimum threshold {}",
                "[LOG]".bold().green(),
                num + 1,
                thresholds[idx_start],
            );
        }
    }

    let points = thresholds[idx_start..].iter()
        .enumerate()
        .map(|(i, &threshold)| {
            let idx = idx_start + i;
            let det_objs = (0..n_objects)
                .filter(|j| detected.contains(idx * n_objects + j))
                .count();
            RocPoint {
                threshold,
                false_positives: false_positives[idx],
                detection_rate: if n_objects == 0 {
                    0.0
                } else {
                    det_objs as f64 / n_objects as f64
                },
            }
        })
        .collect();
    Ok(points)
}

fn draw_error(e: impl std::error::Error) -> crate::errors::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string()).into()
}

/// Render the sweep as an SVG line chart, false positives against
/// detection rate.
pub fn plot_roc<P: AsRef<Path>>(points: &[RocPoint], path: P) -> Result<()> {
    assert!(!points.is_empty(), "nothing to plot");
    let max_fp = points.iter()
        .map(|p| p.false_positives)
        .max()
        .unwrap()
        .max(1) as f64;

    let root = SVGBackend::new(path.as_ref(), (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(draw_error)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("ROC", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..max_fp * 1.05, 0.0..1.05)
        .map_err(draw_error)?;
    chart.configure_mesh()
        .x_desc("false positives")
        .y_desc("detection rate")
        .draw()
        .map_err(draw_error)?;
    chart.draw_series(LineSeries::new(
        points.iter().map(|p| (p.false_positives as f64, p.detection_rate)),
        &RED,
    )).map_err(draw_error)?;
    chart.draw_series(points.iter().map(|p| {
        Circle::new((p.false_positives as f64, p.detection_rate), 3, RED.filled())
    })).map_err(draw_error)?;
    root.present().map_err(draw_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sr(x: i32, y: i32, size: i32, score: f32) -> ScoredRect {
        ScoredRect { rect: Rect::new(x, y, size, size), score }
    }

    #[test]
    fn tally_counts_hits_and_false_positives_per_threshold() {
        let truth = Rect::new(100, 100, 40, 40);
        // two overlapping detections on the face, one far away
        let raw = [
            sr(98, 98, 40, 1.0),
            sr(102, 102, 40, 3.0),
            sr(300, 300, 40, 5.0),
        ];
        let thresholds = [0.0, 2.0, 4.0];
        let mut idx_start = 0;
        let mut detected = FixedBitSet::with_capacity(3);
        let mut false_positives = vec![0u64; 3];
        tally_image(
            &raw,
            &[truth],
            &thresholds,
            &mut idx_start,
            0,
            1,
            &mut detected,
            &mut false_positives,
        );

        assert_eq!(idx_start, 0, "no threshold overflowed");
        // at 0.0 and 2.0 the face is found; at 4.0 only the far rect is
        assert!(detected.contains(0));
        assert!(detected.contains(1));
        assert!(!detected.contains(2));
        assert_eq!(false_positives, vec![1, 1, 1]);
    }

    #[test]
    fn overflowing_threshold_is_dropped_from_the_sweep() {
        let raw: Vec<ScoredRect> = (0..MAX_MERGE_RECTS as i32 + 10)
            .map(|i| sr(i * 100, 0, 40, 1.0))
            .collect();
        let thresholds = [0.5, 2.0];
        let mut idx_start = 0;
        let mut detected = FixedBitSet::with_capacity(2);
        let mut false_positives = vec![0u64; 2];
        tally_image(
            &raw,
            &[],
            &thresholds,
            &mut idx_start,
            0,
            1,
            &mut detected,
            &mut false_positives,
        );
        assert_eq!(idx_start, 1, "the flooded threshold must be dropped");
        assert_eq!(false_positives[0], 0, "dropped thresholds count nothing");
        // threshold 2.0 filters everything out, so nothing merges
        assert_eq!(false_positives[1], 0);
    }

    #[test]
    fn roc_plot_writes_an_svg() {
        let points = [
            RocPoint { threshold: 0.0, false_positives: 50, detection_rate: 0.95 },
            RocPoint { threshold: 1.0, false_positives: 10, detection_rate: 0.90 },
            RocPoint { threshold: 2.0, false_positives: 2, detection_rate: 0.80 },
        ];
        let path = std::env::temp_dir().join("cascadet_roc_test.svg");
        plot_roc(&points, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("<svg"), "expected an SVG document");
        std::fs::remove_file(&path).ok();
    }
}
