//! Rectangle features and the exhaustively enumerated feature bank.

mod bank;
mod rect_feature;

pub use bank::FeatureBank;
pub use rect_feature::{Feature, RectFeature, WeightedRect};
