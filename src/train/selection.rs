//! Two-phase feature selection.
//!
//! Ranking every bank feature against the whole pool each round would
//! dominate training time, so selection runs in two phases. Phase A
//! ranks the full bank on a small importance sample using unweighted
//! count histograms and a single-cut separation score, with each worker
//! chunk keeping only its top candidates. Phase B re-scores the
//! surviving candidates on the whole pool with the true boosting
//! weights and the full cut budget, and the best one wins.

use rayon::prelude::*;

use crate::constants::{MAX_NUM_SCALE, NUM_HIST_BIN, NUM_TOP_FEATURES};
use crate::feature::RectFeature;
use super::example::TrainExample;
use super::thresholds::{find_thresholds, ThresholdSplit};

/// Features per phase-A worker chunk.
const RANK_CHUNK: usize = 512;

/// The winning feature with the histograms and cut set the stage table
/// is built from.
#[derive(Clone, Debug)]
pub struct SelectedFeature {
    pub feature: RectFeature,
    pub split: ThresholdSplit,
    pub pos_hist: Vec<f64>,
    pub neg_hist: Vec<f64>,
    pub min_val: f32,
    pub max_val: f32,
}

/// Per-rung weight-rescaled copies of one bank feature. Pool patches
/// are subsampled to base size, so only the weights change with scale.
struct RungVariants {
    variants: Vec<Option<RectFeature>>,
}

impl RungVariants {
    fn new(feature: &RectFeature, rung_scales: &[Option<f32>]) -> Self {
        let variants = rung_scales.iter()
            .map(|s| s.map(|scale| feature.rescaled_weights_only(scale)))
            .collect();
        Self { variants }
    }

    #[inline(always)]
    fn eval(&self, ex: &TrainExample) -> f32 {
        let feature = self.variants[ex.rung]
            .as_ref()
            .expect("example on a rung with no variant");
        ex.eval(feature)
    }
}

fn rung_scales(pool: &[TrainExample]) -> Vec<Option<f32>> {
    let mut scales = vec![None; MAX_NUM_SCALE];
    for ex in pool {
        scales[ex.rung] = Some(ex.scale);
    }
    scales
}

/// Histogram a feature over examples, weighting each by `weight_of`.
/// Returns `None` when every value is identical; such a feature cannot
/// split anything.
fn histogram<F>(
    variants: &RungVariants,
    pool: &[TrainExample],
    weight_of: F,
) -> Option<(Vec<f64>, Vec<f64>, f32, f32)>
    where F: Fn(usize, &TrainExample) -> f64,
{
    let values: Vec<f32> = pool.iter().map(|ex| variants.eval(ex)).collect();
    let mut min_val = f32::INFINITY;
    let mut max_val = f32::NEG_INFINITY;
    for &v in &values {
        min_val = min_val.min(v);
        max_val = max_val.max(v);
    }
    if !(max_val > min_val) {
        return None;
    }

    let inv_step = (NUM_HIST_BIN - 1) as f32 / (max_val - min_val);
    let mut pos = vec![0.0f64; NUM_HIST_BIN];
    let mut neg = vec![0.0f64; NUM_HIST_BIN];
    for (i, (ex, &v)) in pool.iter().zip(&values).enumerate() {
        let w = weight_of(i, ex);
        if w == 0.0 {
            continue;
        }
        let bin = (((v - min_val) * inv_step + 0.5) as usize).min(NUM_HIST_BIN - 1);
        if ex.label > 0 {
            pos[bin] += w;
        } else {
            neg[bin] += w;
        }
    }
    Some((pos, neg, min_val, max_val))
}

/// Pick the stage feature for this round.
///
/// `sample_counts` holds one importance-sample count per pool example;
/// phase A sees only examples drawn at least once.
pub fn select_feature(
    bank: &[RectFeature],
    pool: &[TrainExample],
    sample_counts: &[u32],
    n_cuts: usize,
) -> SelectedFeature {
    assert!(!bank.is_empty(), "empty feature bank");
    assert_eq!(sample_counts.len(), pool.len(), "count per pool example");
    let scales = rung_scales(pool);

    // phase A ranks on the sampled sub-pool only
    let sampled: Vec<TrainExample> = pool.iter()
        .zip(sample_counts)
        .filter(|(_, &c)| c > 0)
        .map(|(ex, _)| ex.clone())
        .collect();
    let counts: Vec<u32> = sample_counts.iter().copied().filter(|&c| c > 0).collect();
    assert!(!sampled.is_empty(), "importance sample is empty");

    let mut candidates: Vec<(usize, f64)> = bank
        .par_chunks(RANK_CHUNK)
        .enumerate()
        .map(|(chunk_idx, chunk)| {
            let mut top: Vec<(usize, f64)> = Vec::with_capacity(NUM_TOP_FEATURES + 1);
            for (offset, feature) in chunk.iter().enumerate() {
                let variants = RungVariants::new(feature, &scales);
                let Some((pos, neg, _, _)) = histogram(
                    &variants,
                    &sampled,
                    |i, _| f64::from(counts[i]),
                ) else {
                    continue;
                };
                let score = find_thresholds(&pos, &neg, 1).score;
                let idx = chunk_idx * RANK_CHUNK + offset;
                let at = top.partition_point(|&(_, s)| s <= score);
                if at < NUM_TOP_FEATURES {
                    top.insert(at, (idx, score));
                    top.truncate(NUM_TOP_FEATURES);
                }
            }
            top
        })
        .reduce(Vec::new, |mut a, b| {
            a.extend(b);
            a
        });
    candidates.sort_unstable_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

    // phase B re-scores candidates on the whole pool with true weights
    let mut best: Option<SelectedFeature> = None;
    for &(idx, _) in &candidates {
        let feature = &bank[idx];
        let variants = RungVariants::new(feature, &scales);
        let Some((pos, neg, min_val, max_val)) = histogram(
            &variants,
            pool,
            |_, ex| ex.weight,
        ) else {
            continue;
        };
        let split = find_thresholds(&pos, &neg, n_cuts);
        if best.as_ref().map_or(true, |b| split.score < b.split.score) {
            best = Some(SelectedFeature {
                feature: feature.clone(),
                split,
                pos_hist: pos,
                neg_hist: neg,
                min_val,
                max_val,
            });
        }
    }
    best.expect("no feature separates the pool at all")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureBank;
    use crate::geometry::Rect;
    use crate::image::{GrayImage, NormIntegral};

    /// Positives have a bright left half, negatives a bright right half.
    fn split_pool() -> Vec<TrainExample> {
        let mut pool = Vec::new();
        for i in 0..40 {
            let label: i8 = if i % 2 == 0 { 1 } else { -1 };
            let mut img = GrayImage::filled(8, 8, 20);
            let (x0, x1) = if label > 0 { (0, 4) } else { (4, 8) };
            for y in 0..8 {
                for x in x0..x1 {
                    // mild per-example variation keeps features non-constant
                    img.set(x, y, 200 + (i % 8) as u8);
                }
            }
            let src = NormIntegral::from_image(&img);
            pool.push(TrainExample::from_window(
                &src,
                &Rect::new(0, 0, 8, 8),
                0,
                1.0,
                8,
                8,
                label,
                i,
                0.0,
            ));
        }
        pool
    }

    #[test]
    fn picks_a_feature_that_separates_the_classes() {
        let bank = FeatureBank::init(8, 8).min_size(2, 2).build();
        let pool = split_pool();
        let counts = vec![1u32; pool.len()];
        let selected = select_feature(&bank, &pool, &counts, 3);

        // the winner must separate perfectly: the pool is linearly split
        // by any left-vs-right contrast feature
        assert!(
            selected.split.score < 1e-9,
            "expected a clean split, got score {}",
            selected.split.score,
        );
        assert!(selected.max_val > selected.min_val);
        let pos_mass: f64 = selected.pos_hist.iter().sum();
        let neg_mass: f64 = selected.neg_hist.iter().sum();
        assert!((pos_mass - 10.0).abs() < 1e-9, "20 positives at weight 0.5");
        assert!((neg_mass - 10.0).abs() < 1e-9, "20 negatives at weight 0.5");
    }
}
