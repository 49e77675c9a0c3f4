//! Numeric constants shared across the crate.

/// Number of bins for feature-value and score histograms.
pub const NUM_HIST_BIN: usize = 256;
/// Candidates each ranking worker keeps during phase-A feature selection.
pub const NUM_TOP_FEATURES: usize = 10;
/// Upper bound on quantization thresholds per stage.
pub const MAX_NUM_FEATURE_TH: usize = 31;
/// Coordinate-descent passes when refining threshold positions.
pub const MAX_REFINE_ITER: usize = 5;
/// Cumulative scores are clamped to `[MIN_SCORE, MAX_SCORE]` for
/// the rejection histogram; a rejected window is pinned at `MIN_SCORE`.
pub const MIN_SCORE: f32 = -30.0;
pub const MAX_SCORE: f32 = 30.0;

/// Additive-smoothing floor for delta-score log ratios.
pub const SMOOTHING_FLOOR: f64 = 1e-10;
/// Margin subtracted from calibrated stage thresholds.
pub const CALIBRATION_EPS: f32 = 1e-6;

/// Largest scale-ladder length a detector will precompute.
pub const MAX_NUM_SCALE: usize = 32;
/// Merging short-circuits above this many raw rectangles.
pub const MAX_MERGE_RECTS: usize = 1_000;
/// Two rectangles join a group when `2*overlap/(areaA+areaB)` exceeds this.
pub const REQUIRED_OVERLAP: f64 = 0.4;

pub const DEFAULT_STEP_SIZE: f32 = 0.1;
pub const DEFAULT_STEP_SCALE: f32 = 1.25;
pub const DEFAULT_MAX_RAW_DET: usize = 1_000;
pub const DEFAULT_STEP_FRACTION: f32 = 0.25;
