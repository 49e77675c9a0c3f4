//! Multiscale sliding-window inference and detection merging.

mod detector;
mod merge;

pub use detector::{Detections, Detector};
pub use merge::merge_rects;
