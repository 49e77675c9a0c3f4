//!
//! A cascaded boosted detector for visual objects,
//! built on rectangle features over integral images.
//!
//! The crate covers the full life cycle of such a detector.
//!
//! - Training
//!     [`Trainer`](train::Trainer) boosts a soft cascade over every
//!     window a detector would scan across a labeled image set,
//!     keeping the window population out-of-core: cumulative scores in
//!     a disk-paged buffer, membership labels as run-length streams,
//!     and a bounded example pool in memory that is periodically
//!     refilled with the hard negatives surviving the cascade so far.
//!
//! - Detection
//!     [`Detector`](detect::Detector) scans an image over a geometric
//!     scale ladder, classifies each window with the soft cascade
//!     (rejecting early once the cumulative score falls below a
//!     stage's threshold), and merges overlapping detections with a
//!     union-find grouping.
//!
//! - Calibration and evaluation
//!     [`Calibrator`](calibrate::Calibrator) tightens the per-stage
//!     rejection thresholds on a validation set under a configurable
//!     pruning policy, and [`evaluate_roc`](eval::evaluate_roc) sweeps
//!     final-score thresholds into an ROC curve.
//!
//! Image file decoding stays outside the crate: everything consumes
//! 8-bit grayscale pixel buffers through
//! [`GrayImage`](image::GrayImage) and the
//! [`ImageSource`](train::ImageSource) seam.

pub mod constants;
pub mod errors;
pub mod geometry;
pub mod image;
pub mod feature;
pub mod cascade;
pub mod detect;
pub mod labels;
pub mod codec;
pub mod train;
pub mod calibrate;
pub mod eval;

pub mod prelude;

pub use errors::{Error, Result};

pub use cascade::{Cascade, Stage};
pub use detect::{Detections, Detector};
pub use train::Trainer;
pub use calibrate::{Calibrator, PrunePolicy};
