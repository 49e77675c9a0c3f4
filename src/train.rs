//! The boosting trainer: out-of-core example management, importance
//! sampling, two-phase feature selection, and threshold search.

mod config;
mod example;
mod pager;
mod sampling;
mod selection;
mod thresholds;
mod trainer;
mod windows;

pub use config::TrainConfig;
pub use example::{ImageSource, MemoryImageSource, TrainExample, logit_weight};
pub use pager::ScorePager;
pub use sampling::importance_sample;
pub use selection::select_feature;
pub use thresholds::{build_stage_table, find_thresholds, ThresholdSplit};
pub use trainer::Trainer;
pub use windows::{label_windows, scan_windows, ScanWindow};
