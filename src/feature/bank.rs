//! Exhaustive enumeration of the rectangle-feature bank for a fixed
//! base detection window.
//!
//! Cell sizes start at the configured minimum and grow geometrically
//! (at least one pixel per step); placements step by a fraction of the
//! cell size. Six split patterns are enumerated, plus an optional batch
//! of random two-rectangle features.

use rand::prelude::*;
use rand::rngs::StdRng;

use crate::constants::DEFAULT_STEP_FRACTION;
use crate::geometry::Rect;
use super::rect_feature::{RectFeature, WeightedRect};

/// Builder for the complete feature bank of a
/// `window_width x window_height` detection window.
pub struct FeatureBank {
    window_width: i32,
    window_height: i32,
    min_width: i32,
    min_height: i32,
    step_fraction: f32,
    scale_step: f32,
    n_random: usize,
    seed: Option<u64>,
}

impl FeatureBank {
    /// Start a bank for the given base window.
    pub fn init(window_width: usize, window_height: usize) -> Self {
        Self {
            window_width: window_width as i32,
            window_height: window_height as i32,
            min_width: 2,
            min_height: 2,
            step_fraction: DEFAULT_STEP_FRACTION,
            scale_step: 1.25,
            n_random: 0,
            seed: None,
        }
    }

    /// Set the smallest cell size enumerated.
    #[inline(always)]
    pub fn min_size(mut self, width: usize, height: usize) -> Self {
        assert!(width > 0 && height > 0);
        self.min_width = width as i32;
        self.min_height = height as i32;
        self
    }

    /// Set the placement step as a fraction of the cell size.
    #[inline(always)]
    pub fn step_fraction(mut self, fraction: f32) -> Self {
        assert!(fraction > 0.0, "step fraction must be positive");
        self.step_fraction = fraction;
        self
    }

    /// Set the geometric growth factor for cell sizes.
    #[inline(always)]
    pub fn scale_step(mut self, step: f32) -> Self {
        assert!(step > 1.0, "scale step must exceed 1");
        self.scale_step = step;
        self
    }

    /// Append `n` random two-rectangle features after the
    /// deterministic patterns.
    #[inline(always)]
    pub fn random_pairs(mut self, n: usize) -> Self {
        self.n_random = n;
        self
    }

    /// Seed the random-pair generator. Without a seed the generator is
    /// seeded from entropy and the random tail is not reproducible.
    #[inline(always)]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Enumerate the bank.
    pub fn build(&self) -> Vec<RectFeature> {
        let mut features = Vec::new();

        // (2,1): bright/dark side by side
        self.for_each_cell(2, 1, |x, y, w, h| {
            features.push(RectFeature::pair(
                1.0, Rect::new(x, y, w, h),
                -1.0, Rect::new(x + w, y, w, h),
            ));
        });
        // (1,2): bright over dark
        self.for_each_cell(1, 2, |x, y, w, h| {
            features.push(RectFeature::pair(
                1.0, Rect::new(x, y, w, h),
                -1.0, Rect::new(x, y + h, w, h),
            ));
        });
        // (3,1): center stripe against the whole, and outer cells
        self.for_each_cell(3, 1, |x, y, w, h| {
            features.push(RectFeature::pair(
                -1.0, Rect::new(x, y, 3 * w, h),
                3.0, Rect::new(x + w, y, w, h),
            ));
            features.push(RectFeature::pair(
                -1.0, Rect::new(x, y, w, h),
                1.0, Rect::new(x + 2 * w, y, w, h),
            ));
        });
        // (1,3)
        self.for_each_cell(1, 3, |x, y, w, h| {
            features.push(RectFeature::pair(
                -1.0, Rect::new(x, y, w, 3 * h),
                3.0, Rect::new(x, y + h, w, h),
            ));
            features.push(RectFeature::pair(
                -1.0, Rect::new(x, y, w, h),
                1.0, Rect::new(x, y + 2 * h, w, h),
            ));
        });
        // (2,2): diagonals, corner-vs-whole, checkerboard
        self.for_each_cell(2, 2, |x, y, w, h| {
            features.push(RectFeature::pair(
                1.0, Rect::new(x, y, w, h),
                -1.0, Rect::new(x + w, y + h, w, h),
            ));
            features.push(RectFeature::pair(
                1.0, Rect::new(x + w, y, w, h),
                -1.0, Rect::new(x, y + h, w, h),
            ));
            let whole = Rect::new(x, y, 2 * w, 2 * h);
            for corner in [
                Rect::new(x, y, w, h),
                Rect::new(x + w, y, w, h),
                Rect::new(x, y + h, w, h),
                Rect::new(x + w, y + h, w, h),
            ] {
                features.push(RectFeature::pair(4.0, corner, -1.0, whole));
            }
            features.push(RectFeature::new(vec![
                WeightedRect { weight: 1.0, rect: Rect::new(x, y, w, h) },
                WeightedRect { weight: -1.0, rect: Rect::new(x + w, y, w, h) },
                WeightedRect { weight: -1.0, rect: Rect::new(x, y + h, w, h) },
                WeightedRect { weight: 1.0, rect: Rect::new(x + w, y + h, w, h) },
            ]));
        });
        // (3,3): center against the whole, and middle row vs. column
        self.for_each_cell(3, 3, |x, y, w, h| {
            features.push(RectFeature::pair(
                -1.0, Rect::new(x, y, 3 * w, 3 * h),
                9.0, Rect::new(x + w, y + h, w, h),
            ));
            features.push(RectFeature::pair(
                -1.0, Rect::new(x, y + h, 3 * w, h),
                1.0, Rect::new(x + w, y, w, 3 * h),
            ));
        });

        if self.n_random > 0 {
            self.append_random(&mut features);
        }
        features
    }

    /// Visit every cell placement for an `(nx, ny)` split: cell sizes
    /// grow geometrically from the minimum while `nx*w`/`ny*h` still fit,
    /// positions step by `max(1, round(cell * step_fraction))`.
    fn for_each_cell<F>(&self, nx: i32, ny: i32, mut emit: F)
        where F: FnMut(i32, i32, i32, i32),
    {
        let mut w = self.min_width;
        while nx * w <= self.window_width {
            let mut h = self.min_height;
            while ny * h <= self.window_height {
                let xstep = ((w as f32 * self.step_fraction + 0.5) as i32).max(1);
                let ystep = ((h as f32 * self.step_fraction + 0.5) as i32).max(1);
                let mut x = 0;
                while x + nx * w <= self.window_width {
                    let mut y = 0;
                    while y + ny * h <= self.window_height {
                        emit(x, y, w, h);
                        y += ystep;
                    }
                    x += xstep;
                }
                h = ((h as f32 * self.scale_step + 0.5) as i32).max(h + 1);
            }
            w = ((w as f32 * self.scale_step + 0.5) as i32).max(w + 1);
        }
    }

    fn append_random(&self, features: &mut Vec<RectFeature>) {
        // candidate pool: every single-cell placement
        let mut pool = Vec::new();
        self.for_each_cell(1, 1, |x, y, w, h| {
            pool.push(Rect::new(x, y, w, h));
        });
        assert!(pool.len() >= 2, "window too small for random features");

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        for _ in 0..self.n_random {
            let a = rng.gen_range(0..pool.len());
            let mut b = rng.gen_range(0..pool.len());
            while b == a {
                b = rng.gen_range(0..pool.len());
            }
            features.push(RectFeature::pair(
                (1.0 / pool[a].area()) as f32, pool[a],
                -(1.0 / pool[b].area()) as f32, pool[b],
            ));
        }
    }
}
