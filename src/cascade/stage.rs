//! One weak classifier of the cascade.

use serde::{Deserialize, Serialize};

use crate::feature::Feature;
use crate::image::RectSum;

/// A quantized weak classifier: a feature, `n` thresholds stored in
/// strictly descending order, `n + 1` delta-scores, and the minimum
/// cumulative score below which the cascade may reject early.
///
/// Lookup walks the thresholds from the top: the first threshold the
/// feature value exceeds selects its bucket; a value below every
/// threshold lands in the last bucket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub feature: Feature,
    pub thresholds: Vec<f32>,
    pub delta_scores: Vec<f32>,
    pub min_pos_score_th: f32,
}

impl Stage {
    pub fn new(
        feature: Feature,
        thresholds: Vec<f32>,
        delta_scores: Vec<f32>,
        min_pos_score_th: f32,
    ) -> Self {
        let stage = Self { feature, thresholds, delta_scores, min_pos_score_th };
        stage.check_invariants();
        stage
    }

    /// Panic if the threshold table is malformed. Violations here are
    /// programming errors, not input errors.
    pub fn check_invariants(&self) {
        assert_eq!(
            self.delta_scores.len(),
            self.thresholds.len() + 1,
            "expected {} delta scores, got {}",
            self.thresholds.len() + 1,
            self.delta_scores.len(),
        );
        for pair in self.thresholds.windows(2) {
            assert!(
                pair[0] > pair[1],
                "thresholds must be strictly descending, got {} then {}",
                pair[0],
                pair[1],
            );
        }
    }

    /// Delta-score contributed by a feature value.
    #[inline(always)]
    pub fn response(&self, value: f32) -> f32 {
        for (th, ds) in self.thresholds.iter().zip(&self.delta_scores) {
            if value > *th {
                return *ds;
            }
        }
        *self.delta_scores.last().unwrap()
    }

    /// Evaluate the stage's feature and return its delta-score.
    #[inline(always)]
    pub fn score<I: RectSum>(&self, image: &I, x: i32, y: i32, inv_norm: f32) -> f32 {
        self.response(self.feature.eval(image, x, y, inv_norm))
    }

    /// The stage with its feature geometry rescaled.
    pub fn rescaled(&self, scale: f32) -> Self {
        Self {
            feature: self.feature.rescaled(scale),
            thresholds: self.thresholds.clone(),
            delta_scores: self.delta_scores.clone(),
            min_pos_score_th: self.min_pos_score_th,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(thresholds: Vec<f32>, delta_scores: Vec<f32>) -> Stage {
        Stage::new(Feature::Norm, thresholds, delta_scores, -1.0)
    }

    #[test]
    fn response_picks_first_exceeded_threshold() {
        let s = stage(vec![10.0, 5.0, 1.0], vec![3.0, 2.0, 1.0, -1.0]);
        assert_eq!(s.response(20.0), 3.0);
        assert_eq!(s.response(7.0), 2.0);
        assert_eq!(s.response(2.0), 1.0);
        assert_eq!(s.response(0.5), -1.0);
        // boundary: equal to a threshold falls through to the next bucket
        assert_eq!(s.response(10.0), 2.0);
    }

    #[test]
    #[should_panic(expected = "strictly descending")]
    fn unsorted_thresholds_are_rejected() {
        stage(vec![1.0, 5.0], vec![1.0, 0.0, -1.0]);
    }

    #[test]
    #[should_panic(expected = "delta scores")]
    fn wrong_score_count_is_rejected() {
        stage(vec![1.0], vec![1.0]);
    }
}
