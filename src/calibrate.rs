//! Post-hoc rejection-threshold calibration.
//!
//! Training sets each stage's rejection threshold to the minimum
//! cumulative score over pooled positives, which is safe but loose.
//! Calibration replays a labeled validation set, records the per-stage
//! score trace of every window near each labeled object, and tightens
//! the thresholds as far as a pruning policy allows.

use colored::Colorize;
use fixedbitset::FixedBitSet;

use crate::cascade::Cascade;
use crate::constants::{CALIBRATION_EPS, MAX_NUM_SCALE};
use crate::errors::{Error, Result};
use crate::image::NormIntegral;
use crate::labels::ImageInfo;
use crate::train::{scan_windows, ImageSource};

use std::path::Path;

/// How aggressively positive windows may be pruned.
///
/// Multiple-instance keeps at least one window alive per labeled
/// object (the others are redundant detections of the same face).
/// Direct-backward keeps every matching window alive. The soft-cascade
/// schedule instead rejects a fixed share `1 - detection_rate` of
/// windows, distributed over the stages by an exponential curve in
/// `alpha` (negative `alpha` front-loads the rejections).
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PrunePolicy {
    MultipleInstance,
    DirectBackward,
    SoftCascadeSchedule { alpha: f32, detection_rate: f32 },
}

impl Default for PrunePolicy {
    fn default() -> Self {
        Self::MultipleInstance
    }
}

/// Score traces of every window matched to a labeled object, flattened
/// across objects.
struct TraceSet {
    /// One cumulative-score trace (length = stage count) per window.
    traces: Vec<Vec<f32>>,
    /// Which object each window belongs to.
    object_of: Vec<usize>,
    n_objects: usize,
}

/// Calibrates a cascade's rejection thresholds on a validation set.
pub struct Calibrator {
    cascade: Cascade,
    policy: PrunePolicy,
    step_size: f32,
    step_scale: f32,
    sweep: Vec<f32>,
}

impl Calibrator {
    pub fn init(cascade: Cascade) -> Self {
        let final_score_th = cascade.final_score_th;
        Self {
            cascade,
            policy: PrunePolicy::default(),
            step_size: crate::constants::DEFAULT_STEP_SIZE,
            step_scale: crate::constants::DEFAULT_STEP_SCALE,
            sweep: vec![final_score_th],
        }
    }

    #[inline(always)]
    pub fn policy(mut self, policy: PrunePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[inline(always)]
    pub fn step_size(mut self, step_size: f32) -> Self {
        assert!(step_size > 0.0, "step size must be positive");
        self.step_size = step_size;
        self
    }

    #[inline(always)]
    pub fn step_scale(mut self, step_scale: f32) -> Self {
        assert!(step_scale > 1.0, "step scale must exceed 1");
        self.step_scale = step_scale;
        self
    }

    /// Candidate final-score thresholds, `min_th..=max_th` by `step_th`.
    /// One calibrated cascade comes out per candidate. The soft-cascade
    /// schedule ignores the sweep and produces a single cascade.
    #[inline(always)]
    pub fn sweep(mut self, min_th: f32, max_th: f32, step_th: f32) -> Self {
        assert!(step_th > 0.0, "sweep step must be positive");
        self.sweep.clear();
        let mut th = min_th;
        while th <= max_th {
            self.sweep.push(th);
            th += step_th;
        }
        assert!(!self.sweep.is_empty(), "empty threshold sweep");
        self
    }

    /// Calibrate against labeled images, returning `(candidate, cascade)`
    /// pairs.
    pub fn calibrate(
        &self,
        infos: &[ImageInfo],
        source: &impl ImageSource,
    ) -> Result<Vec<(f32, Cascade)>> {
        let floor = self.sweep.iter().copied().fold(f32::INFINITY, f32::min);
        let set = self.collect_traces(infos, source, floor)?;
        if set.traces.is_empty() {
            return Err(Error::NoCalibrationTraces);
        }
        println!(
            "{} {} trace windows over {} objects",
            "[LOG]".bold().green(),
            set.traces.len(),
            set.n_objects,
        );

        let mut out = Vec::new();
        match self.policy {
            PrunePolicy::MultipleInstance | PrunePolicy::DirectBackward => {
                let per_object = self.policy == PrunePolicy::MultipleInstance;
                for &candidate in &self.sweep {
                    let thresholds = prune_backward(&set, candidate, per_object);
                    let mut cascade = self.cascade.clone();
                    for (stage, th) in cascade.stages.iter_mut().zip(&thresholds) {
                        stage.min_pos_score_th = *th;
                    }
                    cascade.final_score_th = candidate;
                    out.push((candidate, cascade));
                }
            },
            PrunePolicy::SoftCascadeSchedule { alpha, detection_rate } => {
                let thresholds = prune_scheduled(&set, alpha, detection_rate);
                let mut cascade = self.cascade.clone();
                for (stage, th) in cascade.stages.iter_mut().zip(&thresholds) {
                    stage.min_pos_score_th = *th;
                }
                cascade.final_score_th = *thresholds.last().unwrap();
                out.push((alpha, cascade));
            },
        }
        Ok(out)
    }

    /// Calibrate and write each output as `{prefix}_{candidate:.2}.txt`.
    pub fn calibrate_to(
        &self,
        infos: &[ImageInfo],
        source: &impl ImageSource,
        prefix: &Path,
    ) -> Result<Vec<(f32, Cascade)>> {
        let out = self.calibrate(infos, source)?;
        for (candidate, cascade) in &out {
            let mut name = prefix.as_os_str().to_os_string();
            name.push(format!("_{candidate:.2}.txt"));
            cascade.save(name)?;
        }
        Ok(out)
    }

    /// Replay every window near a labeled object through the cascade
    /// without the final threshold, recording cumulative scores stage by
    /// stage. A window rejected by the existing stage thresholds is
    /// discarded, as is (for the backward policies) one whose final
    /// score misses the sweep floor.
    fn collect_traces(
        &self,
        infos: &[ImageInfo],
        source: &impl ImageSource,
        floor: f32,
    ) -> Result<TraceSet> {
        // tight matching for direct-backward and the schedule; loose for
        // multiple-instance, which may keep any detection of the object
        let tight = self.policy != PrunePolicy::MultipleInstance;
        let use_floor = !matches!(self.policy, PrunePolicy::SoftCascadeSchedule { .. });

        let mut rungs: Vec<Cascade> = Vec::with_capacity(MAX_NUM_SCALE);
        let mut scale = 1.0f32;
        for _ in 0..MAX_NUM_SCALE {
            rungs.push(self.cascade.rescaled(scale));
            scale *= self.step_scale;
        }

        let mut set = TraceSet {
            traces: Vec::new(),
            object_of: Vec::new(),
            n_objects: 0,
        };
        for info in infos {
            if info.boxes.is_empty() {
                continue;
            }
            let gray = source.load(&info.path)?;
            let integral = NormIntegral::from_image(&gray);
            let windows = scan_windows(
                gray.width(),
                gray.height(),
                self.cascade.base_width,
                self.cascade.base_height,
                self.step_size,
                self.step_scale,
            );
            for truth in &info.boxes {
                let object = set.n_objects;
                set.n_objects += 1;
                for w in &windows {
                    let matched = if tight {
                        w.rect.matches_tight(truth, self.step_size, self.step_scale)
                    } else {
                        w.rect.matches_detection(truth)
                    };
                    if !matched {
                        continue;
                    }
                    let scaled = &rungs[w.rung];
                    let inv_norm = integral.inv_norm(&w.rect);
                    let mut trace = Vec::with_capacity(scaled.stages.len());
                    let mut score = 0.0f32;
                    let mut rejected = false;
                    for stage in &scaled.stages {
                        score += stage.score(
                            &integral,
                            w.rect.x_min,
                            w.rect.y_min,
                            inv_norm,
                        );
                        trace.push(score);
                        if score < stage.min_pos_score_th {
                            rejected = true;
                            break;
                        }
                    }
                    if rejected || (use_floor && score < floor) {
                        continue;
                    }
                    set.traces.push(trace);
                    set.object_of.push(object);
                }
            }
        }
        Ok(set)
    }
}

/// Backward pruning: per stage, the new threshold is the smallest score
/// a policy-protected window reaches there, minus a safety epsilon.
/// With `per_object` set, only each object's best window is protected.
fn prune_backward(set: &TraceSet, final_th: f32, per_object: bool) -> Vec<f32> {
    let n_stages = set.traces.first().map_or(0, Vec::len);
    let mut valid = FixedBitSet::with_capacity(set.traces.len());
    valid.set_range(.., true);
    for (w, trace) in set.traces.iter().enumerate() {
        if trace.last().is_some_and(|&s| s < final_th) {
            valid.set(w, false);
        }
    }

    let mut thresholds = Vec::with_capacity(n_stages);
    for i in 0..n_stages {
        let th = if per_object {
            let mut best = vec![f32::NEG_INFINITY; set.n_objects];
            for (w, trace) in set.traces.iter().enumerate() {
                if valid.contains(w) {
                    let obj = set.object_of[w];
                    best[obj] = best[obj].max(trace[i]);
                }
            }
            best.into_iter()
                .filter(|s| s.is_finite())
                .fold(f32::INFINITY, f32::min)
                - CALIBRATION_EPS
        } else {
            set.traces.iter()
                .enumerate()
                .filter(|(w, _)| valid.contains(*w))
                .map(|(_, trace)| trace[i])
                .fold(f32::INFINITY, f32::min)
                - CALIBRATION_EPS
        };
        thresholds.push(th);
        for (w, trace) in set.traces.iter().enumerate() {
            if valid.contains(w) && trace[i] < th {
                valid.set(w, false);
            }
        }
    }
    thresholds
}

/// Scheduled pruning: reject `n * (1 - detection_rate)` windows in
/// total, with the cumulative budget at stage `i` following an
/// exponential curve in `alpha`. At each stage the threshold takes the
/// larger of the pair midpoint and an epsilon below the upper score of
/// the last unequal ranked pair inside the budget; for any pair wider
/// than two epsilons that puts it just under the upper score.
fn prune_scheduled(set: &TraceSet, alpha: f32, detection_rate: f32) -> Vec<f32> {
    assert!(
        (0.0..=1.0).contains(&detection_rate),
        "detection rate must be in [0, 1], got {detection_rate}",
    );
    let n_stages = set.traces.first().map_or(0, Vec::len);
    let n_windows = set.traces.len();
    let target = (n_windows as f64 * f64::from(1.0 - detection_rate)) as i64;

    let alpha = f64::from(alpha);
    let curve = |i: usize| -> f64 {
        let frac = i as f64 / n_stages as f64;
        if alpha < 0.0 {
            (-alpha * (1.0 - frac)).exp()
        } else {
            (alpha * frac).exp()
        }
    };
    let sum: f64 = (0..n_stages).map(curve).sum();
    let k = target as f64 / sum;
    let mut budget = Vec::with_capacity(n_stages);
    let mut acc = 0.0f64;
    for i in 0..n_stages {
        acc += k * curve(i);
        budget.push(acc);
    }

    let mut valid = FixedBitSet::with_capacity(n_windows);
    valid.set_range(.., true);
    let mut thresholds = Vec::with_capacity(n_stages);
    for i in 0..n_stages {
        let mut ranked: Vec<f32> = set.traces.iter()
            .enumerate()
            .filter(|(w, _)| valid.contains(*w))
            .map(|(_, trace)| trace[i])
            .collect();
        ranked.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap());
        let already_rejected = (n_windows - ranked.len()) as i64;

        // a cut between ranked[j] and ranked[j+1] rejects j+1 windows,
        // so the highest admissible start is one below the budget
        let mut th = f32::NEG_INFINITY;
        let mut j = (budget[i] as i64 - already_rejected - 1)
            .min(ranked.len() as i64 - 2);
        while j >= 0 {
            let (lo, hi) = (ranked[j as usize], ranked[j as usize + 1]);
            if lo < hi {
                th = ((lo + hi) / 2.0).max(hi - CALIBRATION_EPS);
                break;
            }
            j -= 1;
        }
        thresholds.push(th);
        for (w, trace) in set.traces.iter().enumerate() {
            if valid.contains(w) && trace[i] < th {
                valid.set(w, false);
            }
        }
    }
    thresholds
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(traces: Vec<Vec<f32>>, object_of: Vec<usize>, n_objects: usize) -> TraceSet {
        TraceSet { traces, object_of, n_objects }
    }

    #[test]
    fn multiple_instance_protects_each_objects_best_window() {
        // object 0 has two windows, object 1 has one
        let s = set(
            vec![vec![1.0, 2.0], vec![0.0, 3.0], vec![2.0, 1.0]],
            vec![0, 0, 1],
            2,
        );
        let ths = prune_backward(&s, f32::NEG_INFINITY, true);
        // stage 0: best of object 0 is 1.0, of object 1 is 2.0
        assert!((ths[0] - (1.0 - CALIBRATION_EPS)).abs() < 1e-9);
        // the [0.0, 3.0] window dies at stage 0, so stage 1 compares
        // max(2.0) against max(1.0)
        assert!((ths[1] - (1.0 - CALIBRATION_EPS)).abs() < 1e-9);
    }

    #[test]
    fn direct_backward_protects_every_window() {
        let s = set(
            vec![vec![1.0, 2.0], vec![0.0, 3.0], vec![2.0, 1.0]],
            vec![0, 0, 1],
            2,
        );
        let ths = prune_backward(&s, f32::NEG_INFINITY, false);
        assert!((ths[0] - (0.0 - CALIBRATION_EPS)).abs() < 1e-9);
        assert!((ths[1] - (1.0 - CALIBRATION_EPS)).abs() < 1e-9);
        // no window may fall below its stage threshold
        for trace in &s.traces {
            for (s_i, th) in trace.iter().zip(&ths) {
                assert!(s_i >= th);
            }
        }
    }

    #[test]
    fn backward_prune_honors_the_final_threshold() {
        let s = set(
            vec![vec![1.0, 2.0], vec![5.0, 10.0]],
            vec![0, 0],
            1,
        );
        // only the second window clears a final threshold of 5
        let ths = prune_backward(&s, 5.0, true);
        assert!((ths[0] - (5.0 - CALIBRATION_EPS)).abs() < 1e-9);
        assert!((ths[1] - (10.0 - CALIBRATION_EPS)).abs() < 1e-9);
    }

    #[test]
    fn schedule_rejects_the_budgeted_share() {
        // ten windows, one stage, distinct scores 0..9
        let traces: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32]).collect();
        let s = set(traces, (0..10).collect(), 10);
        let ths = prune_scheduled(&s, 0.0, 0.5);
        assert_eq!(ths.len(), 1);
        // exactly five of ten windows fall below the cut
        assert!(
            ths[0] > 4.0 && ths[0] < 5.0,
            "expected a cut between 4 and 5, got {}",
            ths[0],
        );
    }

    #[test]
    fn calibration_with_no_surviving_windows_is_an_error() {
        use crate::cascade::Stage;
        use crate::feature::Feature;
        use crate::geometry::Rect;
        use crate::image::GrayImage;
        use crate::labels::{ImageInfo, LabelKind};
        use crate::train::MemoryImageSource;

        // a single stage whose rejection threshold no window can reach
        let mut cascade = Cascade::new(24, 24, 1);
        cascade.stages.push(Stage::new(
            Feature::Norm,
            vec![0.0],
            vec![1.0, -1.0],
            f32::INFINITY,
        ));

        let path = std::path::PathBuf::from("flat.raw");
        let mut source = MemoryImageSource::new();
        source.insert(path.clone(), GrayImage::filled(40, 40, 128));
        let infos = vec![ImageInfo {
            path,
            kind: LabelKind::AllLabeled,
            objects: Vec::new(),
            boxes: vec![Rect::new(8, 8, 24, 24)],
        }];

        let calibrator = Calibrator::init(cascade).policy(
            PrunePolicy::SoftCascadeSchedule { alpha: -2.0, detection_rate: 0.9 },
        );
        let err = calibrator.calibrate(&infos, &source).unwrap_err();
        assert!(
            matches!(err, Error::NoCalibrationTraces),
            "expected NoCalibrationTraces, got {err:?}",
        );
    }

    #[test]
    fn schedule_with_full_detection_rate_rejects_nothing() {
        let traces: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32, 1.0]).collect();
        let s = set(traces, (0..10).collect(), 10);
        let ths = prune_scheduled(&s, -2.0, 1.0);
        for th in &ths {
            assert_eq!(*th, f32::NEG_INFINITY, "zero budget must not cut");
        }
    }
}
