//! Weighted importance sampling over the example pool.

use rand::Rng;

/// Draw `k` examples with probability proportional to weight, with
/// replacement, in one pass.
///
/// `k` sorted uniform deviates over the total weight are walked against
/// the running prefix sum, so the cost is `O(k log k + n)` regardless of
/// how skewed the weights are. Returns one count per example; counts
/// always sum to `k`. Zero-weight examples are never drawn unless every
/// weight is zero, in which case the draw degenerates to the last
/// example.
pub fn importance_sample<R: Rng>(weights: &[f64], k: usize, rng: &mut R) -> Vec<u32> {
    let mut counts = vec![0u32; weights.len()];
    if weights.is_empty() || k == 0 {
        return counts;
    }
    let total: f64 = weights.iter().sum();

    let mut targets: Vec<f64> = (0..k).map(|_| rng.gen::<f64>() * total).collect();
    targets.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap());

    let mut prefix = 0.0;
    let mut idx = 0;
    for target in targets {
        while idx + 1 < weights.len() && prefix + weights[idx] <= target {
            prefix += weights[idx];
            idx += 1;
        }
        counts[idx] += 1;
    }
    counts
}
