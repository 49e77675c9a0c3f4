//! Trainer configuration.

use serde::Deserialize;

use crate::constants::{
    DEFAULT_STEP_FRACTION,
    DEFAULT_STEP_SCALE,
    DEFAULT_STEP_SIZE,
    MAX_NUM_FEATURE_TH,
};
use crate::errors::{Error, Result};

use std::path::PathBuf;

fn default_step_size() -> f32 { DEFAULT_STEP_SIZE }
fn default_step_scale() -> f32 { DEFAULT_STEP_SCALE }
fn default_step_fraction() -> f32 { DEFAULT_STEP_FRACTION }
fn default_feature_scale_step() -> f32 { 1.25 }
fn default_min_feature_size() -> usize { 2 }
fn default_page_size() -> usize { 1 << 20 }
fn default_max_remask_interval() -> usize { 64 }

/// Everything one training run needs. Deserializable so runs can be
/// described by a JSON file.
#[derive(Clone, Debug, Deserialize)]
pub struct TrainConfig {
    /// Folders holding images plus a `label.txt` each.
    pub label_dirs: Vec<PathBuf>,
    /// Path prefix for the disk-paged score buffer. The trainer needs
    /// exclusive access to this prefix for the whole run.
    pub score_file_prefix: PathBuf,
    /// Where the cascade is written after every round.
    pub cascade_path: PathBuf,

    pub base_width: usize,
    pub base_height: usize,
    /// Quantization thresholds per stage.
    pub n_thresholds: usize,
    /// Training rounds; each appends one stage.
    pub n_rounds: usize,

    /// Memory budget for the retained example pool.
    pub max_examples: usize,
    /// Importance-sample size for phase-A feature ranking.
    pub n_sampled: usize,

    /// Scan geometry, shared with the detector.
    #[serde(default = "default_step_size")]
    pub step_size: f32,
    #[serde(default = "default_step_scale")]
    pub step_scale: f32,

    /// Feature-bank geometry.
    #[serde(default = "default_min_feature_size")]
    pub min_feature_size: usize,
    #[serde(default = "default_step_fraction")]
    pub feature_step_fraction: f32,
    #[serde(default = "default_feature_scale_step")]
    pub feature_scale_step: f32,
    #[serde(default)]
    pub n_random_features: usize,

    /// Floats per score-buffer page.
    #[serde(default = "default_page_size")]
    pub score_page_size: usize,
    /// The remask interval starts at 2 and doubles up to this cap.
    #[serde(default = "default_max_remask_interval")]
    pub max_remask_interval: usize,
    /// Share of surviving negative weight dropped outright (lowest
    /// scores first) at each remask, before the uniform subsample.
    #[serde(default)]
    pub neg_rej_fraction: f32,

    /// RNG seed. `None` seeds from entropy and makes the run
    /// non-reproducible.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl TrainConfig {
    pub fn check(&self) -> Result<()> {
        if self.base_width == 0 || self.base_height == 0 {
            return Err(Error::InvalidConfig("zero base window".into()));
        }
        if self.n_thresholds == 0 || self.n_thresholds > MAX_NUM_FEATURE_TH {
            return Err(Error::InvalidConfig(format!(
                "n_thresholds must be in 1..={MAX_NUM_FEATURE_TH}",
            )));
        }
        if self.max_examples == 0 || self.n_sampled == 0 {
            return Err(Error::InvalidConfig(
                "example pool and sample size must be positive".into(),
            ));
        }
        if self.n_rounds == 0 {
            return Err(Error::InvalidConfig("n_rounds must be positive".into()));
        }
        if self.score_page_size == 0 {
            return Err(Error::InvalidConfig("zero score page size".into()));
        }
        if !(0.0..=1.0).contains(&self.neg_rej_fraction) {
            return Err(Error::InvalidConfig(format!(
                "neg_rej_fraction must be in [0, 1], got {}",
                self.neg_rej_fraction,
            )));
        }
        Ok(())
    }
}
