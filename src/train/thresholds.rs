//! Threshold search over weighted feature-value histograms.
//!
//! A stage quantizes its feature value with `n` cuts over the 256-bin
//! histogram of weighted feature values. A split is judged by the sum of
//! `sqrt(pos_mass * neg_mass)` over its segments; lower is better, zero
//! means every segment is pure. Splitting a segment never increases the
//! sum (Cauchy-Schwarz), so the best score is non-increasing in the
//! number of cuts. The search preserves that property by growing the cut
//! set one cut at a time and re-refining after every addition.

use crate::constants::{MAX_REFINE_ITER, NUM_HIST_BIN, SMOOTHING_FLOOR};

/// A cut set over the histogram bins, with its separation score.
/// Cuts are strictly ascending bin indices in `1..NUM_HIST_BIN`; a cut
/// at `c` separates bins `< c` from bins `>= c`.
#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdSplit {
    pub cuts: Vec<usize>,
    pub score: f64,
}

struct Prefix {
    pos: [f64; NUM_HIST_BIN + 1],
    neg: [f64; NUM_HIST_BIN + 1],
}

impl Prefix {
    fn new(pos_hist: &[f64], neg_hist: &[f64]) -> Self {
        assert_eq!(pos_hist.len(), NUM_HIST_BIN, "bad histogram size");
        assert_eq!(neg_hist.len(), NUM_HIST_BIN, "bad histogram size");
        let mut pos = [0.0; NUM_HIST_BIN + 1];
        let mut neg = [0.0; NUM_HIST_BIN + 1];
        for i in 0..NUM_HIST_BIN {
            pos[i + 1] = pos[i] + pos_hist[i];
            neg[i + 1] = neg[i] + neg_hist[i];
        }
        Self { pos, neg }
    }

    /// Separation score of the half-open bin segment `[a, b)`.
    #[inline(always)]
    fn seg(&self, a: usize, b: usize) -> f64 {
        let p = self.pos[b] - self.pos[a];
        let n = self.neg[b] - self.neg[a];
        (p * n).max(0.0).sqrt()
    }

    fn total(&self, cuts: &[usize]) -> f64 {
        let mut score = 0.0;
        let mut start = 0;
        for &c in cuts {
            score += self.seg(start, c);
            start = c;
        }
        score + self.seg(start, NUM_HIST_BIN)
    }

    /// Best single cut strictly inside `(lo, hi)`, or `None` if the
    /// segment has no interior.
    fn best_cut(&self, lo: usize, hi: usize) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for c in lo + 1..hi {
            let score = self.seg(lo, c) + self.seg(c, hi);
            if best.map_or(true, |(_, s)| score < s) {
                best = Some((c, score));
            }
        }
        best
    }
}

/// Find up to `n_cuts` cuts minimizing the separation score.
///
/// One cut is found by exact scan. Each further cut splits the segment
/// with the highest remaining separation score at that segment's best
/// position, followed each time by coordinate descent moving every cut
/// to its exact optimum between its neighbors until a pass makes no
/// improvement. Fewer than `n_cuts` cuts are returned when the
/// histogram has too few occupied bins to place more.
pub fn find_thresholds(
    pos_hist: &[f64],
    neg_hist: &[f64],
    n_cuts: usize,
) -> ThresholdSplit {
    assert!(n_cuts > 0, "need at least one cut");
    let prefix = Prefix::new(pos_hist, neg_hist);

    let mut cuts: Vec<usize> = Vec::with_capacity(n_cuts);
    while cuts.len() < n_cuts {
        // cut the worst (highest-score) segment that can still be split
        let mut best: Option<(usize, f64)> = None;
        let mut start = 0;
        for slot in 0..=cuts.len() {
            let end = cuts.get(slot).copied().unwrap_or(NUM_HIST_BIN);
            let whole = prefix.seg(start, end);
            if let Some((c, _)) = prefix.best_cut(start, end) {
                if best.map_or(true, |(_, s)| whole > s) {
                    best = Some((c, whole));
                }
            }
            start = end;
        }
        let Some((c, _)) = best else { break };
        let pos = cuts.partition_point(|&x| x < c);
        cuts.insert(pos, c);
        refine(&prefix, &mut cuts);
    }

    let score = prefix.total(&cuts);
    ThresholdSplit { cuts, score }
}

/// Coordinate descent: move each cut to its optimum between its
/// neighbors, repeating until a full pass improves nothing.
fn refine(prefix: &Prefix, cuts: &mut [usize]) {
    for _ in 0..MAX_REFINE_ITER {
        let mut moved = false;
        for i in 0..cuts.len() {
            let lo = if i == 0 { 0 } else { cuts[i - 1] };
            let hi = cuts.get(i + 1).copied().unwrap_or(NUM_HIST_BIN);
            let here = prefix.seg(lo, cuts[i]) + prefix.seg(cuts[i], hi);
            if let Some((c, score)) = prefix.best_cut(lo, hi) {
                if score < here && c != cuts[i] {
                    cuts[i] = c;
                    moved = true;
                }
            }
        }
        if !moved {
            break;
        }
    }
}

/// Convert a cut set into a stage's threshold and delta-score tables.
///
/// `min_val`/`max_val` are the histogram's value range and `n_examples`
/// the count the histogram was built from; the delta-score of a segment
/// is the smoothed half log-odds of its positive and negative mass.
/// Thresholds come out strictly descending, delta scores ordered to
/// match: index 0 is the topmost value segment.
pub fn build_stage_table(
    pos_hist: &[f64],
    neg_hist: &[f64],
    cuts: &[usize],
    min_val: f32,
    max_val: f32,
    n_examples: usize,
) -> (Vec<f32>, Vec<f32>) {
    assert!(!cuts.is_empty(), "empty cut set");
    assert!(max_val > min_val, "degenerate value range");
    let prefix = Prefix::new(pos_hist, neg_hist);
    let inv_step = (NUM_HIST_BIN - 1) as f32 / (max_val - min_val);

    // bin c holds values rounding to c, so the value boundary of a cut
    // at c sits half a bin below its center
    let thresholds: Vec<f32> = cuts.iter()
        .rev()
        .map(|&c| min_val + (c as f32 - 0.5) / inv_step)
        .collect();

    let mut delta_scores = Vec::with_capacity(cuts.len() + 1);
    let mut bounds = Vec::with_capacity(cuts.len() + 2);
    bounds.push(0);
    bounds.extend_from_slice(cuts);
    bounds.push(NUM_HIST_BIN);
    // walk segments top-down to match the descending threshold order
    for pair in bounds.windows(2).rev() {
        let pos = prefix.pos[pair[1]] - prefix.pos[pair[0]];
        let neg = prefix.neg[pair[1]] - prefix.neg[pair[0]];
        let smooth = ((pos + neg) / n_examples as f64).max(SMOOTHING_FLOOR);
        delta_scores.push((0.5 * ((pos + smooth) / (neg + smooth)).ln()) as f32);
    }
    (thresholds, delta_scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_lump_hists() -> (Vec<f64>, Vec<f64>) {
        // negatives concentrated low, positives high, slight overlap
        let mut pos = vec![0.0; NUM_HIST_BIN];
        let mut neg = vec![0.0; NUM_HIST_BIN];
        for i in 0..NUM_HIST_BIN {
            if i >= 140 {
                pos[i] = 1.0;
            }
            if i < 120 {
                neg[i] = 1.0;
            }
        }
        pos[100] = 0.5;
        neg[160] = 0.5;
        (pos, neg)
    }

    #[test]
    fn single_cut_separates_two_lumps() {
        let (pos, neg) = two_lump_hists();
        let split = find_thresholds(&pos, &neg, 1);
        assert_eq!(split.cuts.len(), 1);
        let c = split.cuts[0];
        assert!((101..=160).contains(&c), "expected cut between lumps, got {c}");
    }

    #[test]
    fn cuts_are_strictly_ascending() {
        let (pos, neg) = two_lump_hists();
        let split = find_thresholds(&pos, &neg, 7);
        for pair in split.cuts.windows(2) {
            assert!(pair[0] < pair[1], "cuts out of order: {:?}", split.cuts);
        }
    }

    #[test]
    fn extra_cuts_split_the_highest_score_segment() {
        // pure negatives low, pure positives mid, an inseparable
        // half-and-half mix at the top of the value range
        let mut pos = vec![0.0; NUM_HIST_BIN];
        let mut neg = vec![0.0; NUM_HIST_BIN];
        for i in 0..60 {
            neg[i] = 1.0;
        }
        for i in 80..140 {
            pos[i] = 1.0;
        }
        for i in 160..240 {
            pos[i] = 1.0;
            neg[i] = 1.0;
        }
        let split = find_thresholds(&pos, &neg, 3);
        assert_eq!(split.cuts.len(), 3);
        // two cuts isolate the pure regions; the third must subdivide
        // the mixed top segment, the only one with score left, rather
        // than a zero-score pure segment
        assert_eq!(split.cuts[0], 60, "cuts {:?}", split.cuts);
        assert_eq!(split.cuts[1], 140, "cuts {:?}", split.cuts);
        assert!(split.cuts[2] > 140, "cuts {:?}", split.cuts);
    }

    #[test]
    fn score_never_increases_with_more_cuts() {
        let (pos, neg) = two_lump_hists();
        let mut prev = f64::INFINITY;
        for n in 1..=10 {
            let split = find_thresholds(&pos, &neg, n);
            assert!(
                split.score <= prev + 1e-12,
                "expected non-increasing score, got {} after {} at {} cuts",
                split.score, prev, n,
            );
            prev = split.score;
        }
    }

    #[test]
    fn stage_table_matches_cut_order() {
        let (pos, neg) = two_lump_hists();
        let split = find_thresholds(&pos, &neg, 3);
        let (ths, ds) = build_stage_table(&pos, &neg, &split.cuts, -1.0, 1.0, 400);
        assert_eq!(ds.len(), ths.len() + 1);
        for pair in ths.windows(2) {
            assert!(pair[0] > pair[1], "thresholds not descending: {ths:?}");
        }
        // topmost segment is positive-dominated, bottom negative-dominated
        assert!(ds[0] > 0.0, "expected positive top delta, got {}", ds[0]);
        assert!(
            *ds.last().unwrap() < 0.0,
            "expected negative bottom delta, got {}",
            ds.last().unwrap(),
        );
        for d in &ds {
            assert!(d.is_finite());
        }
    }
}
