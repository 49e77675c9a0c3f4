//! Union-find clustering of overlapping detection rectangles.

use crate::constants::{MAX_MERGE_RECTS, REQUIRED_OVERLAP};
use crate::geometry::{Overlap, Rect};

/// Cluster mutually overlapping rectangles and average each cluster.
///
/// Returns the merged rectangles and, for every input index, the index
/// of the merged rectangle it contributed to. Rectangles are scanned in
/// left-edge order; once a pair fails even horizontal overlap, no
/// rectangle further right can overlap either, so the inner scan stops.
/// Two rectangles join a group when
/// `2 * intersection / (areaA + areaB) > REQUIRED_OVERLAP`.
///
/// A pathological input (more than [`MAX_MERGE_RECTS`] rectangles)
/// short-circuits: the input comes back unmerged with the identity map.
pub fn merge_rects(rects: &[Rect]) -> (Vec<Rect>, Vec<usize>) {
    let n = rects.len();
    if n == 0 {
        return (Vec::new(), Vec::new());
    }
    if n > MAX_MERGE_RECTS {
        return (rects.to_vec(), (0..n).collect());
    }

    // sort indices by left edge; group ids live in sorted space
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| rects[i].x_min);

    let mut group: Vec<usize> = (0..n).collect();

    for si in 0..n {
        let a = &rects[order[si]];
        for sj in (si + 1)..n {
            let b = &rects[order[sj]];
            match a.intersect(b) {
                (Overlap::None, _) => break,
                (Overlap::Horizontal, _) => continue,
                (Overlap::Full, Some(is)) => {
                    let ratio = 2.0 * is.area() / (a.area() + b.area());
                    if ratio > REQUIRED_OVERLAP {
                        let ra = find(&mut group, si);
                        let rb = find(&mut group, sj);
                        if ra != rb {
                            group[rb.max(ra)] = rb.min(ra);
                        }
                    }
                },
                (Overlap::Full, None) => unreachable!(),
            }
        }
    }

    // number groups in order of first appearance and average members
    let mut group_index = vec![usize::MAX; n];
    let mut sums: Vec<(f64, f64, f64, f64, usize)> = Vec::new();
    let mut src_to_dst = vec![0usize; n];
    for si in 0..n {
        let root = find(&mut group, si);
        if group_index[root] == usize::MAX {
            group_index[root] = sums.len();
            sums.push((0.0, 0.0, 0.0, 0.0, 0));
        }
        let gi = group_index[root];
        let r = &rects[order[si]];
        let s = &mut sums[gi];
        s.0 += r.x_min as f64;
        s.1 += r.y_min as f64;
        s.2 += r.x_max as f64;
        s.3 += r.y_max as f64;
        s.4 += 1;
        src_to_dst[order[si]] = gi;
    }

    let merged = sums.into_iter()
        .map(|(x0, y0, x1, y1, count)| {
            let c = count as f64;
            Rect {
                x_min: (x0 / c + 0.5) as i32,
                y_min: (y0 / c + 0.5) as i32,
                x_max: (x1 / c + 0.5) as i32,
                y_max: (y1 / c + 0.5) as i32,
            }
        })
        .collect();

    (merged, src_to_dst)
}

fn find(group: &mut [usize], mut i: usize) -> usize {
    while group[i] != i {
        group[i] = group[group[i]];
        i = group[i];
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_gives_empty_output() {
        let (merged, map) = merge_rects(&[]);
        assert!(merged.is_empty());
        assert!(map.is_empty());
    }

    #[test]
    fn overlapping_pair_averages_and_far_rect_stays() {
        let rects = [
            Rect::new(0, 0, 10, 10),
            Rect { x_min: 1, y_min: 1, x_max: 11, y_max: 11 },
            Rect::new(50, 50, 10, 10),
        ];
        // overlap ratio of the first two: 2*81/(100+100) = 0.81 > 0.4
        let (merged, map) = merge_rects(&rects);
        assert_eq!(merged.len(), 2, "expected 2 groups, got {}", merged.len());
        assert_eq!(map[0], map[1]);
        assert_ne!(map[0], map[2]);

        let avg = merged[map[0]];
        // means are (0.5, 0.5, 10.5, 10.5), rounded up
        assert_eq!(avg, Rect { x_min: 1, y_min: 1, x_max: 11, y_max: 11 });
        assert_eq!(merged[map[2]], rects[2]);
    }

    #[test]
    fn merging_a_merged_set_is_identity() {
        let rects = [
            Rect::new(0, 0, 10, 10),
            Rect::new(30, 0, 10, 10),
            Rect::new(0, 30, 10, 10),
        ];
        let (merged, map) = merge_rects(&rects);
        assert_eq!(merged.len(), rects.len());
        let (again, _) = merge_rects(&merged);
        assert_eq!(again, merged);
        for (i, &g) in map.iter().enumerate() {
            assert_eq!(merged[g], rects[i]);
        }
    }

    #[test]
    fn touching_but_low_overlap_does_not_merge() {
        // overlap ratio 2*25/(100+100) = 0.25 < 0.4
        let rects = [
            Rect::new(0, 0, 10, 10),
            Rect::new(5, 5, 10, 10),
        ];
        let (merged, _) = merge_rects(&rects);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn transitive_chains_collapse_into_one_group() {
        // a overlaps b, b overlaps c, a barely overlaps c:
        // all three must share one group through the union
        let rects = [
            Rect::new(0, 0, 10, 10),
            Rect::new(2, 0, 10, 10),
            Rect::new(4, 0, 10, 10),
        ];
        let (merged, map) = merge_rects(&rects);
        assert_eq!(merged.len(), 1);
        assert!(map.iter().all(|&g| g == 0));
        assert_eq!(merged[0], Rect::new(2, 0, 10, 10));
    }

    #[test]
    fn oversized_input_short_circuits() {
        let rects: Vec<Rect> = (0..MAX_MERGE_RECTS as i32 + 1)
            .map(|i| Rect::new(i, 0, 10, 10))
            .collect();
        let (merged, map) = merge_rects(&rects);
        assert_eq!(merged.len(), rects.len());
        assert_eq!(map, (0..rects.len()).collect::<Vec<_>>());
    }
}
